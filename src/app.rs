//! The handle application code holds for the lifetime of the page.

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

use log::debug;
use serde_json::{json, Value as JsonValue};

use crate::channel::Channel;
use crate::config::Config;
use crate::envelope::Notification;
use crate::facade::{ProviderFacade, SignerFacade};
use crate::fallback::{Decision, Negotiation};
use crate::handshake::Handshake;
use crate::lifecycle::Lifecycle;
use crate::traits::{HostPage, ProviderFactory};
use crate::{Error, Result};

pub const LOAD_APPLICATION_ACTION: &str = "loadApplication";

#[derive(Default)]
pub(crate) struct AppState {
    decision: RefCell<Option<Decision>>,
    channel: RefCell<Option<Channel>>,
}

impl AppState {
    pub(crate) fn set_decision(&self, decision: Decision) {
        *self.decision.borrow_mut() = Some(decision);
    }

    pub(crate) fn set_channel(&self, channel: Channel) {
        *self.channel.borrow_mut() = Some(channel);
    }
}

#[derive(Clone)]
pub struct App {
    provider: Rc<ProviderFacade>,
    signer: Rc<SignerFacade>,
    lifecycle: Rc<Lifecycle>,
    state: Rc<AppState>,
}

/// Build the facades and the negotiation that will bind them.
///
/// The facades are usable immediately; calls made before the returned
/// [`Negotiation`] completes are forwarded once it does.
pub fn connect(
    page: Rc<dyn HostPage>,
    factory: Rc<dyn ProviderFactory>,
    config: Config,
) -> Result<(App, Negotiation)> {
    let (provider, provider_resolver) = ProviderFacade::new()?;
    let (signer, signer_resolver) = SignerFacade::new(provider.clone())?;
    let lifecycle = Rc::new(Lifecycle::new());
    let state = Rc::new(AppState::default());

    let channel = Channel::new(&config.target_origin);
    let listeners = Rc::downgrade(&lifecycle);
    // `ready` and `accountChanged` both report the container's account.
    channel.on_notification(Rc::new(move |notification: Notification| {
        if let Some(lifecycle) = listeners.upgrade() {
            lifecycle.account_changed(notification.account().map(str::to_string));
        }
    }));

    let negotiation = Negotiation {
        page,
        factory,
        handshake: Handshake::new(channel, config.handshake_timeout()),
        config,
        provider: provider_resolver,
        signer: signer_resolver,
        lifecycle: lifecycle.clone(),
        state: state.clone(),
    };
    let app = App {
        provider,
        signer,
        lifecycle,
        state,
    };
    Ok((app, negotiation))
}

impl App {
    pub fn provider(&self) -> Rc<ProviderFacade> {
        self.provider.clone()
    }

    pub fn signer(&self) -> Rc<SignerFacade> {
        self.signer.clone()
    }

    /// Backend chosen by negotiation, once it has finished.
    pub fn decision(&self) -> Option<Decision> {
        self.state.decision.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle.is_ready()
    }

    pub fn ready(&self) -> impl Future<Output = Result<()>> + 'static {
        self.lifecycle.ready()
    }

    pub fn on_ready<F>(&self, callback: F)
    where
        F: FnOnce() + 'static,
    {
        self.lifecycle.on_ready(callback)
    }

    pub fn on_account<F>(&self, listener: F)
    where
        F: Fn(Option<&str>) + 'static,
    {
        self.lifecycle.on_account(Rc::new(listener))
    }

    /// Last account announced by the container.
    pub fn account(&self) -> Option<String> {
        self.lifecycle.account()
    }

    pub fn get_account(&self) -> impl Future<Output = Result<String>> + 'static {
        self.signer.get_address()
    }

    pub fn get_network(&self) -> impl Future<Output = Result<String>> + 'static {
        let provider = self.provider.clone();
        async move {
            provider.ready().await?;
            provider.name()
        }
    }

    pub fn send_transaction(&self, transaction: &JsonValue) -> impl Future<Output = Result<JsonValue>> + 'static {
        self.signer.send_transaction(transaction)
    }

    pub fn send(&self, to: &str, amount_wei: JsonValue) -> impl Future<Output = Result<JsonValue>> + 'static {
        self.signer
            .send_transaction(&json!({ "to": to, "value": amount_wei }))
    }

    /// Ask the container to navigate to another application.
    pub fn load_application(&self, url: &str) -> impl Future<Output = Result<()>> + 'static {
        let ready = self.lifecycle.ready();
        let state = self.state.clone();
        let url = url.to_string();
        async move {
            ready.await?;
            let channel = state.channel.borrow().clone();
            match channel {
                Some(channel) => {
                    channel
                        .request(LOAD_APPLICATION_ACTION, json!({ "url": url }))
                        .await?;
                    Ok(())
                }
                None => Err(Error::NotSupported(LOAD_APPLICATION_ACTION.to_string())),
            }
        }
    }

    /// Page unload: closes the container channel, failing anything in flight.
    pub fn shutdown(&self) {
        if let Some(channel) = self.state.channel.borrow_mut().take() {
            debug!("shutting down container channel");
            channel.teardown();
        }
    }
}
