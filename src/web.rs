//! Browser bindings: the parent-frame transport, the host page and fetch
//! based JSON-RPC.

use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use futures::channel::oneshot;
use js_sys::{Function, Object, Promise, Reflect};
use log::{error, info, warn};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{window, Headers, MessageEvent, Request, RequestInit, RequestMode, Response, Window};

use crate::app::{connect, App};
use crate::config::Config;
use crate::rpc::{decode_response, DefaultProviderFactory, RpcRequest};
use crate::traits::{HostPage, InboundListener, InboundMessage, InjectedProvider, JsonRpcProvider, Transport};
use crate::{logging, Error, Result};

fn to_js(value: &JsonValue) -> Result<JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| Error::Serialization(e.to_string()))
}

fn from_js(value: JsValue) -> Result<JsonValue> {
    if value.is_undefined() {
        return Ok(JsonValue::Null);
    }
    serde_wasm_bindgen::from_value(value).map_err(|e| Error::Serialization(e.to_string()))
}

fn current_window() -> Result<Window> {
    window().ok_or_else(|| Error::Transport("No window object available".to_string()))
}

/// Posts to the parent frame and listens for `message` events on our window.
pub struct WindowTransport {
    window: Window,
    parent: Window,
    callback: RefCell<Option<Closure<dyn FnMut(MessageEvent)>>>,
}

impl WindowTransport {
    pub fn new(window: Window, parent: Window) -> Self {
        Self {
            window,
            parent,
            callback: RefCell::new(None),
        }
    }

    fn detach(&self) {
        if let Some(callback) = self.callback.borrow_mut().take() {
            let _ = self
                .window
                .remove_event_listener_with_callback("message", callback.as_ref().unchecked_ref());
        }
    }
}

impl Transport for WindowTransport {
    fn post_message(&self, message: &JsonValue, target_origin: &str) -> Result<()> {
        self.parent.post_message(&to_js(message)?, target_origin)?;
        Ok(())
    }

    fn set_listener(&self, listener: InboundListener) {
        self.detach();
        let callback = Closure::wrap(Box::new(move |event: MessageEvent| {
            // Non-JSON payloads belong to someone else.
            if let Ok(data) = serde_wasm_bindgen::from_value::<JsonValue>(event.data()) {
                listener(InboundMessage {
                    origin: event.origin(),
                    data,
                });
            }
        }) as Box<dyn FnMut(MessageEvent)>);
        if let Err(err) = self
            .window
            .add_event_listener_with_callback("message", callback.as_ref().unchecked_ref())
        {
            error!("failed to listen for messages: {:?}", err);
            return;
        }
        *self.callback.borrow_mut() = Some(callback);
    }
}

impl Drop for WindowTransport {
    fn drop(&mut self) {
        self.detach();
    }
}

/// `window.ethereum`, driven through its `request` method.
pub struct WindowEthereum {
    object: JsValue,
}

impl WindowEthereum {
    pub fn new(object: JsValue) -> Self {
        Self { object }
    }
}

#[async_trait(?Send)]
impl InjectedProvider for WindowEthereum {
    async fn request(&self, method: &str, params: JsonValue) -> Result<JsonValue> {
        let request = Reflect::get(&self.object, &JsValue::from_str("request"))?;
        let request: Function = request
            .dyn_into()
            .map_err(|_| Error::NotSupported("injected provider has no request method".to_string()))?;
        let args = to_js(&json!({ "method": method, "params": params }))?;
        let result = request.call1(&self.object, &args)?;
        let result = match result.dyn_into::<Promise>() {
            Ok(promise) => JsFuture::from(promise)
                .await
                .map_err(|e| Error::Remote(format!("{e:?}")))?,
            Err(value) => value,
        };
        from_js(result)
    }
}

pub struct BrowserPage {
    window: Window,
}

impl BrowserPage {
    pub fn new() -> Result<Self> {
        Ok(Self {
            window: current_window()?,
        })
    }

    fn global(&self, name: &str) -> JsValue {
        Reflect::get(&self.window, &JsValue::from_str(name)).unwrap_or(JsValue::UNDEFINED)
    }

    fn parent(&self) -> Option<Window> {
        self.window.parent().ok().flatten()
    }
}

#[async_trait(?Send)]
impl HostPage for BrowserPage {
    fn is_embedded(&self) -> bool {
        match self.parent() {
            Some(parent) => !Object::is(&parent, &self.window),
            None => false,
        }
    }

    fn skip_container(&self) -> bool {
        self.global("ethersSkip").is_truthy()
    }

    fn title(&self) -> Option<String> {
        self.window
            .document()
            .map(|document| document.title())
            .filter(|title| !title.is_empty())
    }

    fn network_override(&self) -> Option<String> {
        self.global("ethersNetwork").as_string()
    }

    async fn structural_ready(&self) {
        let Some(document) = self.window.document() else {
            return;
        };
        if document.ready_state() != "loading" {
            return;
        }
        let (tx, rx) = oneshot::channel::<()>();
        let on_loaded = Closure::once_into_js(move || {
            let _ = tx.send(());
        });
        if document
            .add_event_listener_with_callback("DOMContentLoaded", on_loaded.unchecked_ref())
            .is_err()
        {
            warn!("could not wait for DOMContentLoaded");
            return;
        }
        let _ = rx.await;
    }

    fn container_transport(&self) -> Result<Rc<dyn Transport>> {
        let parent = self
            .parent()
            .ok_or_else(|| Error::Transport("no parent window".to_string()))?;
        Ok(Rc::new(WindowTransport::new(self.window.clone(), parent)))
    }

    fn injected(&self) -> Option<Rc<dyn InjectedProvider>> {
        let ethereum = self.global("ethereum");
        if ethereum.is_object() {
            Some(Rc::new(WindowEthereum::new(ethereum)))
        } else {
            None
        }
    }
}

/// JSON-RPC over the browser fetch API.
#[derive(Clone, Default)]
pub struct FetchJsonRpc;

impl FetchJsonRpc {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait(?Send)]
impl JsonRpcProvider for FetchJsonRpc {
    async fn call(&self, url: &str, method: &str, params: JsonValue, id: u64) -> Result<JsonValue> {
        let window = current_window()?;
        let body = serde_json::to_string(&RpcRequest::new(method, params, id))?;

        let opts = RequestInit::new();
        opts.set_method("POST");
        opts.set_mode(RequestMode::Cors);
        let headers = Headers::new()
            .map_err(|e| Error::Network(format!("Failed to create headers: {e:?}")))?;
        headers
            .set("Content-Type", "application/json")
            .map_err(|e| Error::Network(format!("Failed to set Content-Type: {e:?}")))?;
        opts.set_headers(&headers);
        opts.set_body(&JsValue::from_str(&body));

        let request = Request::new_with_str_and_init(url, &opts)
            .map_err(|e| Error::Network(format!("Failed to create request: {e:?}")))?;
        let response: Response = JsFuture::from(window.fetch_with_request(&request))
            .await
            .map_err(|e| Error::Network(format!("Fetch failed: {e:?}")))?
            .dyn_into()
            .map_err(|e| Error::Network(format!("Failed to cast response: {e:?}")))?;
        if !response.ok() {
            return Err(Error::Network(format!(
                "HTTP error: {} {}",
                response.status(),
                response.status_text()
            )));
        }
        let text = JsFuture::from(
            response
                .text()
                .map_err(|e| Error::Network(format!("Failed to read body: {e:?}")))?,
        )
        .await
        .map_err(|e| Error::Network(format!("Failed to read body: {e:?}")))?;
        decode_response(&text.as_string().unwrap_or_default())
    }
}

/// Connect the current page and run negotiation in the background.
pub fn inject(config: Config) -> Result<App> {
    logging::init();
    let page = Rc::new(BrowserPage::new()?);
    let factory = Rc::new(DefaultProviderFactory::new(
        config.clone(),
        Rc::new(FetchJsonRpc::new()),
    ));
    let (app, negotiation) = connect(page, factory, config)?;
    wasm_bindgen_futures::spawn_local(async move {
        match negotiation.run().await {
            Ok(decision) => info!("connected: {}", decision),
            Err(err) => error!("negotiation failed: {}", err),
        }
    });
    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::PROTOCOL_TAG;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_envelopes_cross_the_js_boundary() {
        let envelope = json!({ "ethers": PROTOCOL_TAG, "action": "getNetwork", "id": 1, "params": {} });
        let value = to_js(&envelope).unwrap();
        assert!(value.is_object());
        assert_eq!(from_js(value).unwrap(), envelope);
        assert_eq!(from_js(JsValue::UNDEFINED).unwrap(), JsonValue::Null);
    }

    #[wasm_bindgen_test]
    fn test_page_globals() {
        let page = BrowserPage::new().unwrap();
        assert!(!page.skip_container());
        assert!(page.network_override().is_none());
    }
}
