//! JSON-RPC backed provider and the default provider factory.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::config::Config;
use crate::events::ListenerRegistry;
use crate::injected::{InjectedJsonRpc, InjectedSigner, INJECTED_URL};
use crate::network::NetworkId;
use crate::traits::{InjectedProvider, JsonRpcProvider, Listener, Provider, ProviderFactory, Signer};
use crate::utils::{expect_string, is_hex_string, parse_quantity};
use crate::{runtime, Error, Result};

const DEFAULT_BLOCK_TAG: &str = "latest";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: JsonValue,
    pub id: u64,
}

impl RpcRequest {
    pub fn new(method: &str, params: JsonValue, id: u64) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id,
        }
    }
}

/// Extracts the `result` of a JSON-RPC response body, or its error.
pub fn decode_response(body: &str) -> Result<JsonValue> {
    let value: JsonValue = serde_json::from_str(body)
        .map_err(|e| Error::Network(format!("Failed to decode RPC response: {e}: {body}")))?;
    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(JsonValue::as_i64).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(JsonValue::as_str)
            .unwrap_or("Unknown RPC error");
        return Err(Error::JsonRpc(format!("Code {code}: {message}")));
    }
    match value.get("result") {
        Some(result) => Ok(result.clone()),
        None => Err(Error::JsonRpc(format!("response without result: {body}"))),
    }
}

/// JSON-RPC over HTTP.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Clone, Default)]
pub struct HttpJsonRpc {
    client: reqwest::Client,
}

#[cfg(not(target_arch = "wasm32"))]
impl HttpJsonRpc {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[async_trait(?Send)]
impl JsonRpcProvider for HttpJsonRpc {
    async fn call(&self, url: &str, method: &str, params: JsonValue, id: u64) -> Result<JsonValue> {
        let url = url::Url::parse(url)?;
        let request = RpcRequest::new(method, params, id);
        debug!("-> {} {} ({})", url, method, id);
        let response = self.client.post(url).json(&request).send().await?;
        let body = response.text().await?;
        debug!("<- {}", body);
        decode_response(&body)
    }
}

/// [`Provider`] that maps each member onto an `eth_*` JSON-RPC method.
pub struct RpcProvider {
    client: Rc<dyn JsonRpcProvider>,
    url: String,
    network: NetworkId,
    poll_interval: Duration,
    next_id: Cell<u64>,
    events: ListenerRegistry,
}

impl RpcProvider {
    pub fn new(client: Rc<dyn JsonRpcProvider>, url: impl Into<String>, network: NetworkId) -> Self {
        Self {
            client,
            url: url.into(),
            network,
            poll_interval: Config::default().receipt_poll_interval(),
            next_id: Cell::new(1),
            events: ListenerRegistry::new(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn network(&self) -> &NetworkId {
        &self.network
    }

    /// Deliver an event to the listeners registered through `on` / `once`.
    pub fn emit(&self, event: &str, payload: &JsonValue) -> bool {
        self.events.emit(event, payload)
    }

    async fn rpc(&self, method: &str, params: JsonValue) -> Result<JsonValue> {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        debug!("{} -> {} ({})", self.network, method, id);
        self.client.call(&self.url, method, params, id).await
    }

    async fn rpc_string(&self, method: &str, params: JsonValue) -> Result<String> {
        expect_string(self.rpc(method, params).await?, method)
    }

    async fn poll_receipt(&self, hash: &str) -> Result<JsonValue> {
        loop {
            let receipt = self.get_transaction_receipt(hash).await?;
            if !receipt.is_null() {
                self.events.emit(hash, &receipt);
                return Ok(receipt);
            }
            runtime::sleep(self.poll_interval).await;
        }
    }
}

fn tag(block_tag: Option<&str>) -> &str {
    block_tag.unwrap_or(DEFAULT_BLOCK_TAG)
}

fn is_block_hash(block: &str) -> bool {
    block.len() == 66 && is_hex_string(block)
}

#[async_trait(?Send)]
impl Provider for RpcProvider {
    async fn get_block_number(&self) -> Result<u64> {
        parse_quantity(&self.rpc("eth_blockNumber", json!([])).await?)
    }

    async fn get_gas_price(&self) -> Result<String> {
        self.rpc_string("eth_gasPrice", json!([])).await
    }

    async fn get_balance(&self, address: &str, block_tag: Option<&str>) -> Result<String> {
        self.rpc_string("eth_getBalance", json!([address, tag(block_tag)]))
            .await
    }

    async fn get_transaction_count(&self, address: &str, block_tag: Option<&str>) -> Result<u64> {
        let count = self
            .rpc("eth_getTransactionCount", json!([address, tag(block_tag)]))
            .await?;
        parse_quantity(&count)
    }

    async fn get_code(&self, address: &str, block_tag: Option<&str>) -> Result<String> {
        self.rpc_string("eth_getCode", json!([address, tag(block_tag)]))
            .await
    }

    async fn get_storage_at(
        &self,
        address: &str,
        position: &str,
        block_tag: Option<&str>,
    ) -> Result<String> {
        self.rpc_string("eth_getStorageAt", json!([address, position, tag(block_tag)]))
            .await
    }

    async fn call(&self, transaction: &JsonValue, block_tag: Option<&str>) -> Result<String> {
        self.rpc_string("eth_call", json!([transaction, tag(block_tag)]))
            .await
    }

    async fn estimate_gas(&self, transaction: &JsonValue) -> Result<String> {
        self.rpc_string("eth_estimateGas", json!([transaction])).await
    }

    async fn get_block(&self, block: &str) -> Result<JsonValue> {
        if is_block_hash(block) {
            self.rpc("eth_getBlockByHash", json!([block, false])).await
        } else {
            self.rpc("eth_getBlockByNumber", json!([block, false])).await
        }
    }

    async fn get_transaction(&self, hash: &str) -> Result<JsonValue> {
        self.rpc("eth_getTransactionByHash", json!([hash])).await
    }

    async fn get_transaction_receipt(&self, hash: &str) -> Result<JsonValue> {
        self.rpc("eth_getTransactionReceipt", json!([hash])).await
    }

    async fn get_logs(&self, filter: &JsonValue) -> Result<JsonValue> {
        self.rpc("eth_getLogs", json!([filter])).await
    }

    async fn resolve_name(&self, name: &str) -> Result<Option<String>> {
        if name.len() == 42 && is_hex_string(name) {
            return Ok(Some(name.to_string()));
        }
        Err(Error::NotSupported(format!("name resolution for {name}")))
    }

    async fn wait_for_transaction(&self, hash: &str, timeout: Option<Duration>) -> Result<JsonValue> {
        match timeout {
            Some(limit) => runtime::timeout(limit, self.poll_receipt(hash))
                .await
                .ok_or_else(|| Error::Timeout(format!("transaction {hash} not mined")))?,
            None => self.poll_receipt(hash).await,
        }
    }

    fn on(&self, event: &str, listener: Listener) {
        self.events.on(event, listener)
    }

    fn once(&self, event: &str, listener: Listener) {
        self.events.once(event, listener)
    }

    fn remove_all_listeners(&self, event: Option<&str>) {
        self.events.remove_all(event)
    }

    fn remove_listener(&self, event: &str, listener: &Listener) {
        self.events.remove(event, listener)
    }

    fn listener_count(&self, event: Option<&str>) -> usize {
        self.events.count(event)
    }

    fn listeners(&self, event: &str) -> Vec<Listener> {
        self.events.listeners(event)
    }

    fn chain_id(&self) -> u64 {
        self.network.chain_id().unwrap_or_default()
    }

    fn ens_address(&self) -> Option<String> {
        self.network.ens_address().map(str::to_string)
    }

    fn name(&self) -> String {
        self.network.name().to_string()
    }
}

/// Builds [`RpcProvider`]s from the endpoint table in [`Config`].
pub struct DefaultProviderFactory {
    config: Config,
    client: Rc<dyn JsonRpcProvider>,
}

impl DefaultProviderFactory {
    pub fn new(config: Config, client: Rc<dyn JsonRpcProvider>) -> Self {
        Self { config, client }
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn http(config: Config) -> Self {
        Self::new(config, Rc::new(HttpJsonRpc::new()))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn endpoint(&self, network: &NetworkId) -> Result<String> {
        match network {
            NetworkId::Custom(url) => Ok(url.to_string()),
            NetworkId::Named(name) => self
                .config
                .endpoint(name)
                .map(str::to_string)
                .ok_or_else(|| Error::Configuration(format!("no endpoint for network {name}"))),
        }
    }
}

impl ProviderFactory for DefaultProviderFactory {
    fn network_provider(&self, network: &NetworkId) -> Result<Rc<dyn Provider>> {
        let url = self.endpoint(network)?;
        if !self.client.supports_url(&url) {
            return Err(Error::InvalidUrl(url));
        }
        info!("using JSON-RPC endpoint {} for {}", url, network);
        Ok(Rc::new(
            RpcProvider::new(self.client.clone(), url, network.clone())
                .with_poll_interval(self.config.receipt_poll_interval()),
        ))
    }

    fn injected_backend(
        &self,
        injected: Rc<dyn InjectedProvider>,
        network: &NetworkId,
    ) -> Result<(Rc<dyn Provider>, Rc<dyn Signer>)> {
        let client = Rc::new(InjectedJsonRpc::new(injected.clone()));
        let provider: Rc<dyn Provider> = Rc::new(
            RpcProvider::new(client, INJECTED_URL, network.clone())
                .with_poll_interval(self.config.receipt_poll_interval()),
        );
        let signer = Rc::new(InjectedSigner::new(injected, provider.clone()));
        Ok((provider, signer))
    }
}
