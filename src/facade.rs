//! Provider and signer facades handed to application code.
//!
//! Both are thin typed skins over [`DeferredProxy`]: the member names below
//! classify each operation once, and every method goes through the proxy so
//! calls issued before negotiation finishes are queued rather than lost.

use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use serde_json::Value as JsonValue;

use crate::proxy::{DeferredProxy, MemberTable, Resolver};
use crate::traits::{Listener, Provider, Signer};
use crate::Result;

pub const PROVIDER_DEFERRED: &[&str] = &[
    "getBlockNumber",
    "getGasPrice",
    "getBalance",
    "getTransactionCount",
    "getCode",
    "getStorageAt",
    "call",
    "estimateGas",
    "getBlock",
    "getTransaction",
    "getTransactionReceipt",
    "getLogs",
    "resolveName",
    "waitForTransaction",
];

pub const PROVIDER_CHAINED: &[&str] = &["on", "once", "removeAllListeners", "removeListener"];

pub const PROVIDER_SYNCHRONOUS: &[&str] = &["listenerCount", "listeners", "chainId", "ensAddress", "name"];

pub const SIGNER_DEFERRED: &[&str] = &["getAddress", "getBalance", "sendTransaction", "signMessage"];

pub struct ProviderFacade {
    proxy: DeferredProxy<dyn Provider>,
}

impl ProviderFacade {
    pub fn new() -> Result<(Rc<Self>, Resolver<dyn Provider>)> {
        let table = MemberTable::new(PROVIDER_DEFERRED, PROVIDER_CHAINED, PROVIDER_SYNCHRONOUS)?;
        let (proxy, resolver) = DeferredProxy::new(table);
        Ok((Rc::new(Self { proxy }), resolver))
    }

    pub fn is_connected(&self) -> bool {
        self.proxy.is_resolved()
    }

    /// Resolves once a backing provider is bound.
    pub fn ready(&self) -> impl Future<Output = Result<()>> + 'static {
        self.proxy.ready()
    }

    pub fn get_block_number(&self) -> impl Future<Output = Result<u64>> + 'static {
        self.proxy
            .defer("getBlockNumber", |p| async move { p.get_block_number().await })
    }

    pub fn get_gas_price(&self) -> impl Future<Output = Result<String>> + 'static {
        self.proxy
            .defer("getGasPrice", |p| async move { p.get_gas_price().await })
    }

    pub fn get_balance(
        &self,
        address: &str,
        block_tag: Option<&str>,
    ) -> impl Future<Output = Result<String>> + 'static {
        let address = address.to_string();
        let block_tag = block_tag.map(str::to_string);
        self.proxy.defer("getBalance", move |p| async move {
            p.get_balance(&address, block_tag.as_deref()).await
        })
    }

    pub fn get_transaction_count(
        &self,
        address: &str,
        block_tag: Option<&str>,
    ) -> impl Future<Output = Result<u64>> + 'static {
        let address = address.to_string();
        let block_tag = block_tag.map(str::to_string);
        self.proxy.defer("getTransactionCount", move |p| async move {
            p.get_transaction_count(&address, block_tag.as_deref()).await
        })
    }

    pub fn get_code(
        &self,
        address: &str,
        block_tag: Option<&str>,
    ) -> impl Future<Output = Result<String>> + 'static {
        let address = address.to_string();
        let block_tag = block_tag.map(str::to_string);
        self.proxy.defer("getCode", move |p| async move {
            p.get_code(&address, block_tag.as_deref()).await
        })
    }

    pub fn get_storage_at(
        &self,
        address: &str,
        position: &str,
        block_tag: Option<&str>,
    ) -> impl Future<Output = Result<String>> + 'static {
        let address = address.to_string();
        let position = position.to_string();
        let block_tag = block_tag.map(str::to_string);
        self.proxy.defer("getStorageAt", move |p| async move {
            p.get_storage_at(&address, &position, block_tag.as_deref()).await
        })
    }

    pub fn call(
        &self,
        transaction: &JsonValue,
        block_tag: Option<&str>,
    ) -> impl Future<Output = Result<String>> + 'static {
        let transaction = transaction.clone();
        let block_tag = block_tag.map(str::to_string);
        self.proxy.defer("call", move |p| async move {
            p.call(&transaction, block_tag.as_deref()).await
        })
    }

    pub fn estimate_gas(&self, transaction: &JsonValue) -> impl Future<Output = Result<String>> + 'static {
        let transaction = transaction.clone();
        self.proxy
            .defer("estimateGas", move |p| async move { p.estimate_gas(&transaction).await })
    }

    pub fn get_block(&self, block: &str) -> impl Future<Output = Result<JsonValue>> + 'static {
        let block = block.to_string();
        self.proxy
            .defer("getBlock", move |p| async move { p.get_block(&block).await })
    }

    pub fn get_transaction(&self, hash: &str) -> impl Future<Output = Result<JsonValue>> + 'static {
        let hash = hash.to_string();
        self.proxy
            .defer("getTransaction", move |p| async move { p.get_transaction(&hash).await })
    }

    pub fn get_transaction_receipt(&self, hash: &str) -> impl Future<Output = Result<JsonValue>> + 'static {
        let hash = hash.to_string();
        self.proxy.defer("getTransactionReceipt", move |p| async move {
            p.get_transaction_receipt(&hash).await
        })
    }

    pub fn get_logs(&self, filter: &JsonValue) -> impl Future<Output = Result<JsonValue>> + 'static {
        let filter = filter.clone();
        self.proxy
            .defer("getLogs", move |p| async move { p.get_logs(&filter).await })
    }

    pub fn resolve_name(&self, name: &str) -> impl Future<Output = Result<Option<String>>> + 'static {
        let name = name.to_string();
        self.proxy
            .defer("resolveName", move |p| async move { p.resolve_name(&name).await })
    }

    pub fn wait_for_transaction(
        &self,
        hash: &str,
        timeout: Option<Duration>,
    ) -> impl Future<Output = Result<JsonValue>> + 'static {
        let hash = hash.to_string();
        self.proxy.defer("waitForTransaction", move |p| async move {
            p.wait_for_transaction(&hash, timeout).await
        })
    }

    pub fn on(&self, event: &str, listener: Listener) -> Result<&Self> {
        let event = event.to_string();
        self.proxy.chain("on", move |p| p.on(&event, listener))?;
        Ok(self)
    }

    pub fn once(&self, event: &str, listener: Listener) -> Result<&Self> {
        let event = event.to_string();
        self.proxy.chain("once", move |p| p.once(&event, listener))?;
        Ok(self)
    }

    pub fn remove_all_listeners(&self, event: Option<&str>) -> Result<&Self> {
        let event = event.map(str::to_string);
        self.proxy
            .chain("removeAllListeners", move |p| p.remove_all_listeners(event.as_deref()))?;
        Ok(self)
    }

    pub fn remove_listener(&self, event: &str, listener: &Listener) -> Result<&Self> {
        let event = event.to_string();
        let listener = listener.clone();
        self.proxy
            .chain("removeListener", move |p| p.remove_listener(&event, &listener))?;
        Ok(self)
    }

    pub fn listener_count(&self, event: Option<&str>) -> Result<usize> {
        self.proxy.read("listenerCount", |p| p.listener_count(event))
    }

    pub fn listeners(&self, event: &str) -> Result<Vec<Listener>> {
        self.proxy.read("listeners", |p| p.listeners(event))
    }

    pub fn chain_id(&self) -> Result<u64> {
        self.proxy.read("chainId", |p| p.chain_id())
    }

    pub fn ens_address(&self) -> Result<Option<String>> {
        self.proxy.read("ensAddress", |p| p.ens_address())
    }

    pub fn name(&self) -> Result<String> {
        self.proxy.read("name", |p| p.name())
    }
}

pub struct SignerFacade {
    proxy: DeferredProxy<dyn Signer>,
    provider: Rc<ProviderFacade>,
}

impl SignerFacade {
    pub fn new(provider: Rc<ProviderFacade>) -> Result<(Rc<Self>, Resolver<dyn Signer>)> {
        let table = MemberTable::new(SIGNER_DEFERRED, &[], &[])?;
        let (proxy, resolver) = DeferredProxy::new(table);
        Ok((Rc::new(Self { proxy, provider }), resolver))
    }

    /// The provider facade this signer was created alongside.
    pub fn provider(&self) -> &Rc<ProviderFacade> {
        &self.provider
    }

    pub fn is_connected(&self) -> bool {
        self.proxy.is_resolved()
    }

    pub fn ready(&self) -> impl Future<Output = Result<()>> + 'static {
        self.proxy.ready()
    }

    pub fn get_address(&self) -> impl Future<Output = Result<String>> + 'static {
        self.proxy
            .defer("getAddress", |s| async move { s.get_address().await })
    }

    pub fn get_balance(&self, block_tag: Option<&str>) -> impl Future<Output = Result<String>> + 'static {
        let block_tag = block_tag.map(str::to_string);
        self.proxy.defer("getBalance", move |s| async move {
            s.get_balance(block_tag.as_deref()).await
        })
    }

    pub fn send_transaction(&self, transaction: &JsonValue) -> impl Future<Output = Result<JsonValue>> + 'static {
        let transaction = transaction.clone();
        self.proxy.defer("sendTransaction", move |s| async move {
            s.send_transaction(&transaction).await
        })
    }

    pub fn sign_message(&self, message: &str) -> impl Future<Output = Result<String>> + 'static {
        let message = message.to_string();
        self.proxy
            .defer("signMessage", move |s| async move { s.sign_message(&message).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkId;
    use crate::rpc::RpcProvider;
    use crate::testing::MockJsonRpc;
    use crate::Error;
    use serde_json::json;
    use std::cell::Cell;

    fn mock_provider(client: Rc<MockJsonRpc>) -> Rc<dyn Provider> {
        Rc::new(RpcProvider::new(client, "http://mock", NetworkId::default()))
    }

    #[test]
    fn test_member_tables_are_disjoint() {
        assert!(ProviderFacade::new().is_ok());
        let (provider, _resolver) = ProviderFacade::new().unwrap();
        assert!(SignerFacade::new(provider).is_ok());
    }

    #[tokio::test]
    async fn test_calls_before_connection_are_forwarded() {
        let client = Rc::new(
            MockJsonRpc::new()
                .with("eth_blockNumber", json!("0x10"))
                .with("eth_getBalance", json!("0x2a")),
        );
        let (facade, resolver) = ProviderFacade::new().unwrap();

        let block = facade.get_block_number();
        let balance = facade.get_balance("0xabc", None);
        assert!(!facade.is_connected());

        resolver.resolve(mock_provider(client.clone())).unwrap();

        assert_eq!(block.await.unwrap(), 16);
        assert_eq!(balance.await.unwrap(), "0x2a");
        assert_eq!(client.methods(), vec!["eth_blockNumber", "eth_getBalance"]);
        assert_eq!(client.calls()[1].1, json!(["0xabc", "latest"]));
    }

    #[test]
    fn test_chained_and_synchronous_members() {
        let (facade, resolver) = ProviderFacade::new().unwrap();
        assert_eq!(facade.name().unwrap_err(), Error::NotConnected("name".to_string()));

        let hits = Rc::new(Cell::new(0));
        let sink = hits.clone();
        let listener: Listener = Rc::new(move |_: &JsonValue| sink.set(sink.get() + 1));
        facade
            .on("block", listener.clone())
            .unwrap()
            .once("block", listener.clone())
            .unwrap();

        resolver
            .resolve(mock_provider(Rc::new(MockJsonRpc::new())))
            .unwrap();

        assert_eq!(facade.listener_count(Some("block")).unwrap(), 2);
        facade.remove_listener("block", &listener).unwrap();
        assert_eq!(facade.listener_count(None).unwrap(), 1);
        assert_eq!(facade.name().unwrap(), "homestead");
        assert_eq!(facade.chain_id().unwrap(), 1);
        assert!(facade.ens_address().unwrap().is_some());
    }
}
