//! In-process fakes for the environment traits, used by unit and
//! integration tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::envelope::Envelope;
use crate::traits::{HostPage, InboundListener, InboundMessage, InjectedProvider, JsonRpcProvider, Transport};
use crate::{Error, Result};

pub const CONTAINER_ORIGIN: &str = "https://container.test";

type Responder = Rc<dyn Fn(&Envelope) -> Option<Result<JsonValue>>>;

/// Transport that records outbound messages and delivers inbound ones
/// synchronously to the installed listener.
#[derive(Default)]
pub struct MemoryTransport {
    posted: RefCell<Vec<(JsonValue, String)>>,
    listener: RefCell<Option<InboundListener>>,
    responder: RefCell<Option<Responder>>,
    failing: Cell<usize>,
}

impl MemoryTransport {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Answer requests as they are posted. `None` leaves a request unanswered.
    pub fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&Envelope) -> Option<Result<JsonValue>> + 'static,
    {
        *self.responder.borrow_mut() = Some(Rc::new(responder));
    }

    /// Reject the next `count` posts with a transport error.
    pub fn fail_posts(&self, count: usize) {
        self.failing.set(count);
    }

    pub fn posted(&self) -> Vec<JsonValue> {
        self.posted.borrow().iter().map(|(message, _)| message.clone()).collect()
    }

    pub fn target_origins(&self) -> Vec<String> {
        self.posted.borrow().iter().map(|(_, origin)| origin.clone()).collect()
    }

    pub fn posted_actions(&self) -> Vec<String> {
        self.posted
            .borrow()
            .iter()
            .filter_map(|(message, _)| message.get("action").and_then(JsonValue::as_str))
            .map(str::to_string)
            .collect()
    }

    pub fn has_listener(&self) -> bool {
        self.listener.borrow().is_some()
    }

    /// Hands `data` to the listener. Returns false if none is installed.
    pub fn deliver(&self, data: JsonValue) -> bool {
        let listener = self.listener.borrow().clone();
        match listener {
            Some(listener) => {
                listener(InboundMessage {
                    origin: CONTAINER_ORIGIN.to_string(),
                    data,
                });
                true
            }
            None => false,
        }
    }

    fn deliver_envelope(&self, envelope: Envelope) -> bool {
        match envelope.to_value() {
            Ok(value) => self.deliver(value),
            Err(_) => false,
        }
    }

    pub fn reply(&self, id: u64, result: JsonValue) -> bool {
        self.deliver_envelope(Envelope::reply(id, result))
    }

    pub fn reply_error(&self, id: u64, message: &str) -> bool {
        self.deliver_envelope(Envelope::error_reply(id, message))
    }

    pub fn notify(&self, action: &str, account: Option<&str>) -> bool {
        self.deliver_envelope(Envelope::notification(action, account))
    }
}

impl Transport for MemoryTransport {
    fn post_message(&self, message: &JsonValue, target_origin: &str) -> Result<()> {
        if self.failing.get() > 0 {
            self.failing.set(self.failing.get() - 1);
            return Err(Error::Transport("post rejected".to_string()));
        }
        self.posted
            .borrow_mut()
            .push((message.clone(), target_origin.to_string()));

        let responder = self.responder.borrow().clone();
        let envelope = match Envelope::from_inbound(message) {
            Some(Ok(envelope)) => envelope,
            _ => return Ok(()),
        };
        if let (Some(responder), Some(id)) = (responder, envelope.id) {
            match responder(&envelope) {
                Some(Ok(result)) => {
                    self.reply(id, result);
                }
                Some(Err(err)) => {
                    self.reply_error(id, &err.to_string());
                }
                None => {}
            }
        }
        Ok(())
    }

    fn set_listener(&self, listener: InboundListener) {
        *self.listener.borrow_mut() = Some(listener);
    }
}

/// Configurable [`HostPage`].
pub struct MockPage {
    embedded: bool,
    skip: bool,
    dom_ready: bool,
    title: Option<String>,
    network: Option<String>,
    transport: Rc<MemoryTransport>,
    injected: Option<Rc<dyn InjectedProvider>>,
}

impl MockPage {
    fn with_embedding(transport: Rc<MemoryTransport>, embedded: bool) -> Self {
        Self {
            embedded,
            skip: false,
            dom_ready: true,
            title: None,
            network: None,
            transport,
            injected: None,
        }
    }

    /// A page loaded inside a frame whose parent is reached through `transport`.
    pub fn embedded(transport: Rc<MemoryTransport>) -> Self {
        Self::with_embedding(transport, true)
    }

    pub fn top_level(transport: Rc<MemoryTransport>) -> Self {
        Self::with_embedding(transport, false)
    }

    pub fn opted_out(mut self) -> Self {
        self.skip = true;
        self
    }

    /// The document never finishes loading.
    pub fn never_ready(mut self) -> Self {
        self.dom_ready = false;
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn with_network(mut self, network: &str) -> Self {
        self.network = Some(network.to_string());
        self
    }

    pub fn with_injected(mut self, injected: Rc<dyn InjectedProvider>) -> Self {
        self.injected = Some(injected);
        self
    }
}

#[async_trait(?Send)]
impl HostPage for MockPage {
    fn is_embedded(&self) -> bool {
        self.embedded
    }

    fn skip_container(&self) -> bool {
        self.skip
    }

    fn title(&self) -> Option<String> {
        self.title.clone()
    }

    fn network_override(&self) -> Option<String> {
        self.network.clone()
    }

    async fn structural_ready(&self) {
        if !self.dom_ready {
            futures::future::pending::<()>().await;
        }
    }

    fn container_transport(&self) -> Result<Rc<dyn Transport>> {
        Ok(self.transport.clone())
    }

    fn injected(&self) -> Option<Rc<dyn InjectedProvider>> {
        self.injected.clone()
    }
}

#[derive(Default)]
struct Canned {
    responses: HashMap<String, Vec<JsonValue>>,
}

impl Canned {
    fn insert(&mut self, method: &str, values: Vec<JsonValue>) {
        self.responses.insert(method.to_string(), values);
    }

    /// Next queued answer; the last one repeats.
    fn next(&mut self, method: &str) -> Result<JsonValue> {
        let values = self
            .responses
            .get_mut(method)
            .ok_or_else(|| Error::JsonRpc(format!("No mock response for method: {method}")))?;
        match values.len() {
            0 => Ok(JsonValue::Null),
            1 => Ok(values[0].clone()),
            _ => Ok(values.remove(0)),
        }
    }
}

/// JSON-RPC backend answering from a method -> response table.
#[derive(Default)]
pub struct MockJsonRpc {
    canned: RefCell<Canned>,
    calls: RefCell<Vec<(String, JsonValue, u64)>>,
}

impl MockJsonRpc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, method: &str, response: JsonValue) -> Self {
        self.canned.borrow_mut().insert(method, vec![response]);
        self
    }

    pub fn with_sequence(self, method: &str, responses: Vec<JsonValue>) -> Self {
        self.canned.borrow_mut().insert(method, responses);
        self
    }

    /// `(method, params, id)` in call order.
    pub fn calls(&self) -> Vec<(String, JsonValue, u64)> {
        self.calls.borrow().clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|call| call.0.clone()).collect()
    }
}

#[async_trait(?Send)]
impl JsonRpcProvider for MockJsonRpc {
    async fn call(&self, _url: &str, method: &str, params: JsonValue, id: u64) -> Result<JsonValue> {
        self.calls
            .borrow_mut()
            .push((method.to_string(), params, id));
        self.canned.borrow_mut().next(method)
    }
}

/// Injected provider object answering from a method -> response table.
#[derive(Default)]
pub struct MockInjected {
    canned: RefCell<Canned>,
    requests: RefCell<Vec<(String, JsonValue)>>,
}

impl MockInjected {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, method: &str, response: JsonValue) -> Self {
        self.canned.borrow_mut().insert(method, vec![response]);
        self
    }

    pub fn requests(&self) -> Vec<(String, JsonValue)> {
        self.requests.borrow().clone()
    }
}

#[async_trait(?Send)]
impl InjectedProvider for MockInjected {
    async fn request(&self, method: &str, params: JsonValue) -> Result<JsonValue> {
        self.requests
            .borrow_mut()
            .push((method.to_string(), params));
        self.canned.borrow_mut().next(method)
    }
}
