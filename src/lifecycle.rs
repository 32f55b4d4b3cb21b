//! Page-level signals: the one-shot `ready` and repeatable account changes.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use log::{debug, info, warn};

use crate::{Error, Result};

pub type AccountListener = Rc<dyn Fn(Option<&str>)>;

pub struct Lifecycle {
    fired: Cell<bool>,
    waiters: RefCell<Vec<Box<dyn FnOnce()>>>,
    signal: RefCell<Option<oneshot::Sender<()>>>,
    ready: Shared<oneshot::Receiver<()>>,
    account_listeners: RefCell<Vec<AccountListener>>,
    account: RefCell<Option<String>>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            fired: Cell::new(false),
            waiters: RefCell::new(Vec::new()),
            signal: RefCell::new(Some(tx)),
            ready: rx.shared(),
            account_listeners: RefCell::new(Vec::new()),
            account: RefCell::new(None),
        }
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.fired.get()
    }

    /// Subscribe to `ready`. Subscribers arriving after it fired run at once.
    pub fn on_ready<F>(&self, callback: F)
    where
        F: FnOnce() + 'static,
    {
        if self.fired.get() {
            callback();
        } else {
            self.waiters.borrow_mut().push(Box::new(callback));
        }
    }

    pub fn ready(&self) -> impl Future<Output = Result<()>> + 'static {
        let ready = self.ready.clone();
        async move { ready.await.map_err(|_| Error::Disconnected) }
    }

    /// Fires `ready`. Only the first call has an effect.
    pub fn fire_ready(&self) -> bool {
        if self.fired.replace(true) {
            return false;
        }
        info!("ready");
        let waiters = std::mem::take(&mut *self.waiters.borrow_mut());
        for waiter in waiters {
            waiter();
        }
        if let Some(signal) = self.signal.borrow_mut().take() {
            let _ = signal.send(());
        }
        true
    }

    /// Abandons `ready` without firing it. Current and later `ready()`
    /// waiters resolve with [`Error::Disconnected`]; `on_ready` callbacks are
    /// dropped.
    pub fn fail(&self) {
        if self.fired.get() {
            return;
        }
        let signal = self.signal.borrow_mut().take();
        if signal.is_some() {
            warn!("negotiation ended without binding a backend");
        }
        drop(signal);
        let waiters = std::mem::take(&mut *self.waiters.borrow_mut());
        drop(waiters);
    }

    pub fn on_account(&self, listener: AccountListener) {
        self.account_listeners.borrow_mut().push(listener);
    }

    /// Last account reported by the container.
    pub fn account(&self) -> Option<String> {
        self.account.borrow().clone()
    }

    pub fn account_changed(&self, account: Option<String>) {
        debug!("account changed: {:?}", account);
        *self.account.borrow_mut() = account.clone();
        let listeners = self.account_listeners.borrow().clone();
        for listener in listeners {
            listener(account.as_deref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_fires_once_and_late_subscribers_run() {
        let lifecycle = Lifecycle::new();
        let hits = Rc::new(Cell::new(0));

        let early = hits.clone();
        lifecycle.on_ready(move || early.set(early.get() + 1));
        assert!(lifecycle.fire_ready());
        assert!(!lifecycle.fire_ready());
        assert_eq!(hits.get(), 1);

        let late = hits.clone();
        lifecycle.on_ready(move || late.set(late.get() + 10));
        assert_eq!(hits.get(), 11);
    }

    #[tokio::test]
    async fn test_ready_future() {
        let lifecycle = Lifecycle::new();
        let waiting = lifecycle.ready();
        lifecycle.fire_ready();
        waiting.await.unwrap();
        lifecycle.ready().await.unwrap();
    }

    #[tokio::test]
    async fn test_fail_disconnects_waiters() {
        let lifecycle = Lifecycle::new();
        let hits = Rc::new(Cell::new(0));
        let early = hits.clone();
        lifecycle.on_ready(move || early.set(early.get() + 1));
        let waiting = lifecycle.ready();

        lifecycle.fail();
        assert_eq!(waiting.await.unwrap_err(), Error::Disconnected);
        assert_eq!(lifecycle.ready().await.unwrap_err(), Error::Disconnected);
        assert!(!lifecycle.is_ready());
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn test_account_listeners() {
        let lifecycle = Lifecycle::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        lifecycle.on_account(Rc::new(move |account: Option<&str>| {
            sink.borrow_mut().push(account.map(str::to_string))
        }));
        lifecycle.account_changed(Some("0x01".to_string()));
        lifecycle.account_changed(None);
        assert_eq!(*seen.borrow(), vec![Some("0x01".to_string()), None]);
        assert_eq!(lifecycle.account(), None);
    }
}
