//! Trait abstractions for the capabilities the connector negotiates.
//
// Provider and Signer are the two facade kinds handed to application code.
// Everything the connector consumes from its environment (the host page, the
// cross-frame transport, provider construction, JSON-RPC) is a trait as well,
// so tests can run the whole fallback chain against in-process fakes.

use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::network::NetworkId;
use crate::Result;

/// Event callback registered through `on` / `once`.
pub type Listener = Rc<dyn Fn(&JsonValue)>;

/// Read access to a chain.
#[async_trait(?Send)]
pub trait Provider {
    async fn get_block_number(&self) -> Result<u64>;
    async fn get_gas_price(&self) -> Result<String>;
    async fn get_balance(&self, address: &str, block_tag: Option<&str>) -> Result<String>;
    async fn get_transaction_count(&self, address: &str, block_tag: Option<&str>) -> Result<u64>;
    async fn get_code(&self, address: &str, block_tag: Option<&str>) -> Result<String>;
    async fn get_storage_at(
        &self,
        address: &str,
        position: &str,
        block_tag: Option<&str>,
    ) -> Result<String>;
    async fn call(&self, transaction: &JsonValue, block_tag: Option<&str>) -> Result<String>;
    async fn estimate_gas(&self, transaction: &JsonValue) -> Result<String>;
    /// `block` is a tag, a hex block number or a block hash.
    async fn get_block(&self, block: &str) -> Result<JsonValue>;
    async fn get_transaction(&self, hash: &str) -> Result<JsonValue>;
    async fn get_transaction_receipt(&self, hash: &str) -> Result<JsonValue>;
    async fn get_logs(&self, filter: &JsonValue) -> Result<JsonValue>;
    async fn resolve_name(&self, name: &str) -> Result<Option<String>>;
    async fn wait_for_transaction(&self, hash: &str, timeout: Option<Duration>) -> Result<JsonValue>;

    fn on(&self, event: &str, listener: Listener);
    fn once(&self, event: &str, listener: Listener);
    fn remove_all_listeners(&self, event: Option<&str>);
    fn remove_listener(&self, event: &str, listener: &Listener);

    fn listener_count(&self, event: Option<&str>) -> usize;
    fn listeners(&self, event: &str) -> Vec<Listener>;
    fn chain_id(&self) -> u64;
    fn ens_address(&self) -> Option<String>;
    fn name(&self) -> String;
}

/// Signing access bound to one account.
#[async_trait(?Send)]
pub trait Signer {
    async fn get_address(&self) -> Result<String>;
    async fn get_balance(&self, block_tag: Option<&str>) -> Result<String>;
    async fn send_transaction(&self, transaction: &JsonValue) -> Result<JsonValue>;
    async fn sign_message(&self, message: &str) -> Result<String>;
}

/// A message received from the other side of a [`Transport`].
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Origin reported by the host for the sender.
    pub origin: String,
    pub data: JsonValue,
}

pub type InboundListener = Rc<dyn Fn(InboundMessage)>;

/// Duplex message transport between two execution contexts.
pub trait Transport {
    fn post_message(&self, message: &JsonValue, target_origin: &str) -> Result<()>;

    /// Install the inbound listener. Replaces any previous listener.
    fn set_listener(&self, listener: InboundListener);
}

/// An already-injected, request-style provider object (`window.ethereum`).
#[async_trait(?Send)]
pub trait InjectedProvider {
    async fn request(&self, method: &str, params: JsonValue) -> Result<JsonValue>;
}

/// The page the connector runs in.
#[async_trait(?Send)]
pub trait HostPage {
    /// True when the page is loaded inside another frame.
    fn is_embedded(&self) -> bool;

    /// Explicit opt-out marker: never probe for a container.
    fn skip_container(&self) -> bool;

    fn title(&self) -> Option<String>;

    /// Network requested by the page for the injected and default branches.
    fn network_override(&self) -> Option<String>;

    /// Resolves once the document structure is available.
    async fn structural_ready(&self);

    /// Endpoint towards the embedding frame.
    fn container_transport(&self) -> Result<Rc<dyn Transport>>;

    fn injected(&self) -> Option<Rc<dyn InjectedProvider>>;
}

/// Constructs the concrete backends the facades get bound to.
pub trait ProviderFactory {
    /// Read-only provider for a named network or a custom endpoint.
    fn network_provider(&self, network: &NetworkId) -> Result<Rc<dyn Provider>>;

    /// Provider and signer backed by an injected object.
    fn injected_backend(
        &self,
        injected: Rc<dyn InjectedProvider>,
        network: &NetworkId,
    ) -> Result<(Rc<dyn Provider>, Rc<dyn Signer>)>;
}

/// Trait for making JSON-RPC calls
#[async_trait(?Send)]
pub trait JsonRpcProvider {
    /// Make a JSON-RPC call to the specified URL
    async fn call(&self, url: &str, method: &str, params: JsonValue, id: u64) -> Result<JsonValue>;

    /// Check if the provider supports a specific URL scheme
    fn supports_url(&self, url: &str) -> bool {
        url.starts_with("http://") || url.starts_with("https://")
    }
}
