//! Request/reply correlation over a message transport.
//!
//! Envelopes issued before a transport is attached are buffered and flushed
//! in issue order right after the `ready` envelope. Replies are matched by
//! id; messages without an id are notifications.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::rc::{Rc, Weak};

use futures::channel::oneshot;
use log::{debug, error, warn};
use serde_json::{json, Value as JsonValue};

use crate::envelope::{Envelope, Notification, READY_ACTION};
use crate::traits::{InboundMessage, Transport};
use crate::{Error, Result};

pub type ReplyCallback = Box<dyn FnOnce(Result<JsonValue>)>;
pub type NotificationHandler = Rc<dyn Fn(Notification)>;

struct ChannelState {
    next_id: u64,
    pending: Vec<JsonValue>,
    in_flight: HashMap<u64, ReplyCallback>,
    transport: Option<Rc<dyn Transport>>,
    handler: Option<NotificationHandler>,
    closed: bool,
}

impl ChannelState {
    fn take_in_flight(&mut self) -> Vec<(u64, ReplyCallback)> {
        let mut callbacks: Vec<_> = self.in_flight.drain().collect();
        callbacks.sort_by_key(|(id, _)| *id);
        callbacks
    }
}

impl Drop for ChannelState {
    fn drop(&mut self) {
        for (_, callback) in self.take_in_flight() {
            callback(Err(Error::ChannelClosed));
        }
    }
}

#[derive(Clone)]
pub struct Channel {
    target_origin: Rc<str>,
    state: Rc<RefCell<ChannelState>>,
}

impl Channel {
    pub fn new(target_origin: &str) -> Self {
        Self {
            target_origin: Rc::from(target_origin),
            state: Rc::new(RefCell::new(ChannelState {
                next_id: 1,
                pending: Vec::new(),
                in_flight: HashMap::new(),
                transport: None,
                handler: None,
                closed: false,
            })),
        }
    }

    pub fn target_origin(&self) -> &str {
        &self.target_origin
    }

    pub fn is_attached(&self) -> bool {
        self.state.borrow().transport.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    pub fn pending_len(&self) -> usize {
        self.state.borrow().pending.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.state.borrow().in_flight.len()
    }

    /// Id the next outbound envelope will carry.
    pub fn next_id(&self) -> u64 {
        self.state.borrow().next_id
    }

    /// Replaces the notification handler.
    pub fn on_notification(&self, handler: NotificationHandler) {
        self.state.borrow_mut().handler = Some(handler);
    }

    /// Fire-and-forget send. Returns the id assigned to the envelope.
    pub fn send(&self, action: &str, params: JsonValue) -> Result<u64> {
        self.dispatch(action, params, None)
    }

    /// Send and invoke `on_reply` once with the matching reply.
    pub fn send_with_reply<F>(&self, action: &str, params: JsonValue, on_reply: F) -> Result<u64>
    where
        F: FnOnce(Result<JsonValue>) + 'static,
    {
        self.dispatch(action, params, Some(Box::new(on_reply)))
    }

    /// Sends immediately (or buffers) and resolves with the reply.
    pub fn request(
        &self,
        action: &str,
        params: JsonValue,
    ) -> impl Future<Output = Result<JsonValue>> + 'static {
        let (tx, rx) = oneshot::channel();
        let sent = self.send_with_reply(action, params, move |outcome| {
            let _ = tx.send(outcome);
        });
        async move {
            sent?;
            rx.await.map_err(|_| Error::ChannelClosed)?
        }
    }

    fn dispatch(&self, action: &str, params: JsonValue, on_reply: Option<ReplyCallback>) -> Result<u64> {
        let (id, envelope, transport) = {
            let mut state = self.state.borrow_mut();
            if state.closed {
                return Err(Error::ChannelClosed);
            }
            let id = state.next_id;
            let envelope = Envelope::request(action, id, params).to_value()?;
            state.next_id += 1;
            if let Some(callback) = on_reply {
                state.in_flight.insert(id, callback);
            }
            match state.transport.clone() {
                Some(transport) => (id, envelope, transport),
                None => {
                    debug!("queueing {} ({}) until the channel is attached", action, id);
                    state.pending.push(envelope);
                    return Ok(id);
                }
            }
        };
        if let Err(err) = transport.post_message(&envelope, &self.target_origin) {
            self.state.borrow_mut().in_flight.remove(&id);
            return Err(err);
        }
        Ok(id)
    }

    /// Binds the transport: posts `ready`, flushes the buffered envelopes and
    /// starts listening for replies.
    ///
    /// Nothing is committed until `ready` has been posted, so a failed attach
    /// leaves the buffer intact and can be retried with another transport.
    pub fn attach(&self, transport: Rc<dyn Transport>, title: Option<String>) -> Result<()> {
        let ready = {
            let mut state = self.state.borrow_mut();
            if state.closed {
                return Err(Error::ChannelClosed);
            }
            if state.transport.is_some() {
                return Err(Error::AlreadyAttached);
            }
            let mut params = json!({});
            if let Some(title) = title {
                params["title"] = JsonValue::String(title);
            }
            let ready = Envelope::request(READY_ACTION, state.next_id, params).to_value()?;
            state.next_id += 1;
            ready
        };

        let weak: Weak<RefCell<ChannelState>> = Rc::downgrade(&self.state);
        transport.set_listener(Rc::new(move |message: InboundMessage| {
            if let Some(state) = weak.upgrade() {
                handle_inbound(&state, message);
            }
        }));

        if let Err(err) = transport.post_message(&ready, &self.target_origin) {
            warn!("failed to announce ready: {}", err);
            return Err(err);
        }

        let pending = {
            let mut state = self.state.borrow_mut();
            if state.closed {
                return Err(Error::ChannelClosed);
            }
            state.transport = Some(transport.clone());
            std::mem::take(&mut state.pending)
        };
        for envelope in pending {
            if let Err(err) = transport.post_message(&envelope, &self.target_origin) {
                error!("failed to flush queued envelope: {}", err);
                let id = envelope.get("id").and_then(JsonValue::as_u64);
                let callback = id.and_then(|id| self.state.borrow_mut().in_flight.remove(&id));
                if let Some(callback) = callback {
                    callback(Err(err));
                }
            }
        }
        Ok(())
    }

    /// Fails every in-flight request with `ChannelClosed` and refuses new sends.
    pub fn teardown(&self) {
        let callbacks = {
            let mut state = self.state.borrow_mut();
            state.closed = true;
            state.pending.clear();
            state.handler = None;
            state.take_in_flight()
        };
        if !callbacks.is_empty() {
            debug!("channel torn down with {} request(s) in flight", callbacks.len());
        }
        for (_, callback) in callbacks {
            callback(Err(Error::ChannelClosed));
        }
    }
}

// The sender origin is not compared against the target origin.
fn handle_inbound(state: &Rc<RefCell<ChannelState>>, message: InboundMessage) {
    let envelope = match Envelope::from_inbound(&message.data) {
        None => return,
        Some(Err(err)) => {
            warn!("dropping malformed envelope from {}: {}", message.origin, err);
            return;
        }
        Some(Ok(envelope)) => envelope,
    };

    match envelope.id {
        Some(id) if id != 0 => {
            let callback = state.borrow_mut().in_flight.remove(&id);
            match callback {
                Some(callback) => callback(envelope.outcome()),
                None => debug!("no request in flight for reply {}", id),
            }
        }
        _ => {
            let handler = state.borrow().handler.clone();
            match Notification::from_envelope(&envelope) {
                Ok(notification) => {
                    if let Some(handler) = handler {
                        handler(notification);
                    }
                }
                Err(err) => error!("{}", err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::PROTOCOL_TAG;
    use crate::testing::MemoryTransport;
    use std::cell::Cell;

    fn recorder() -> (Rc<RefCell<Vec<Result<JsonValue>>>>, impl Fn() -> ReplyCallback) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let make = move || -> ReplyCallback {
            let sink = sink.clone();
            Box::new(move |outcome| sink.borrow_mut().push(outcome))
        };
        (seen, make)
    }

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let channel = Channel::new("*");
        assert_eq!(channel.send("a", json!({})).unwrap(), 1);
        assert_eq!(channel.send("b", json!({})).unwrap(), 2);
        assert_eq!(channel.next_id(), 3);
        assert_eq!(channel.pending_len(), 2);
    }

    #[test]
    fn test_attach_posts_ready_then_flushes_in_order() {
        let channel = Channel::new("*");
        channel.send("getNetwork", json!({})).unwrap();
        channel.send("getAccount", json!({})).unwrap();

        let transport = MemoryTransport::new();
        channel.attach(transport.clone(), Some("Demo".to_string())).unwrap();

        assert_eq!(transport.posted_actions(), vec!["ready", "getNetwork", "getAccount"]);
        let posted = transport.posted();
        assert_eq!(posted[0]["params"], json!({ "title": "Demo" }));
        assert_eq!(posted[0]["ethers"], json!(PROTOCOL_TAG));
        assert_eq!(channel.pending_len(), 0);
        assert!(transport.has_listener());

        channel.send("getBalance", json!({})).unwrap();
        assert_eq!(transport.posted_actions().last().unwrap(), "getBalance");
    }

    #[test]
    fn test_attach_twice_fails() {
        let channel = Channel::new("*");
        channel.attach(MemoryTransport::new(), None).unwrap();
        assert_eq!(
            channel.attach(MemoryTransport::new(), None).unwrap_err(),
            Error::AlreadyAttached
        );
    }

    #[test]
    fn test_failed_attach_keeps_buffer_for_retry() {
        let channel = Channel::new("*");
        let (seen, make) = recorder();
        channel.dispatch("getAccount", json!({}), Some(make())).unwrap();

        let broken = MemoryTransport::new();
        broken.fail_posts(1);
        assert!(matches!(
            channel.attach(broken.clone(), None),
            Err(Error::Transport(_))
        ));
        assert!(!channel.is_attached());
        assert_eq!(channel.pending_len(), 1);
        assert_eq!(channel.in_flight_len(), 1);
        assert!(broken.posted().is_empty());
        assert!(seen.borrow().is_empty());

        let transport = MemoryTransport::new();
        channel.attach(transport.clone(), None).unwrap();
        assert_eq!(transport.posted_actions(), vec!["ready", "getAccount"]);
        transport.reply(1, json!("0xabc"));
        assert_eq!(*seen.borrow(), vec![Ok(json!("0xabc"))]);
    }

    #[test]
    fn test_reply_routing() {
        let channel = Channel::new("*");
        let transport = MemoryTransport::new();
        channel.attach(transport.clone(), None).unwrap();
        let (seen, make) = recorder();

        let first = channel.dispatch("getAccount", json!({}), Some(make())).unwrap();
        let second = channel.dispatch("signMessage", json!({ "message": "hi" }), Some(make())).unwrap();

        transport.reply_error(second, "user rejected");
        transport.reply(first, json!("0xabc"));
        // duplicate and unknown replies are dropped
        transport.reply(first, json!("0xdef"));
        transport.reply(999, json!(null));

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], Err(Error::Remote("user rejected".to_string())));
        assert_eq!(seen[1], Ok(json!("0xabc")));
        assert_eq!(channel.in_flight_len(), 0);
    }

    #[test]
    fn test_notifications_reach_handler() {
        let channel = Channel::new("*");
        let transport = MemoryTransport::new();
        channel.attach(transport.clone(), None).unwrap();
        let accounts = Rc::new(RefCell::new(Vec::new()));
        let sink = accounts.clone();
        channel.on_notification(Rc::new(move |n: Notification| {
            sink.borrow_mut().push(n.account().map(str::to_string))
        }));

        transport.notify("accountChanged", Some("0x01"));
        transport.deliver(json!({ "ethers": PROTOCOL_TAG, "id": 0, "action": "ready", "params": { "account": "0x02" } }));
        transport.notify("somethingElse", None);
        transport.deliver(json!({ "action": "accountChanged", "account": "0x03" }));

        assert_eq!(
            *accounts.borrow(),
            vec![Some("0x01".to_string()), Some("0x02".to_string())]
        );
    }

    #[test]
    fn test_teardown_fails_in_flight_once() {
        let channel = Channel::new("*");
        let transport = MemoryTransport::new();
        channel.attach(transport.clone(), None).unwrap();
        let (seen, make) = recorder();
        let id = channel.dispatch("getAccount", json!({}), Some(make())).unwrap();

        channel.teardown();
        transport.reply(id, json!("late"));

        assert_eq!(*seen.borrow(), vec![Err(Error::ChannelClosed)]);
        assert_eq!(channel.send("x", json!({})).unwrap_err(), Error::ChannelClosed);
    }

    #[test]
    fn test_drop_fails_in_flight() {
        let failed = Rc::new(Cell::new(false));
        let flag = failed.clone();
        let channel = Channel::new("*");
        channel
            .send_with_reply("getNetwork", json!({}), move |outcome| {
                flag.set(outcome == Err(Error::ChannelClosed))
            })
            .unwrap();
        drop(channel);
        assert!(failed.get());
    }

    #[tokio::test]
    async fn test_request_future() {
        let channel = Channel::new("*");
        let transport = MemoryTransport::new();
        let reply = channel.request("getNetwork", json!({}));
        channel.attach(transport.clone(), None).unwrap();
        transport.reply(1, json!("homestead"));
        assert_eq!(reply.await.unwrap(), json!("homestead"));
    }
}
