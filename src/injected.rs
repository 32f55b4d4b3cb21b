//! Adapters over an already-injected provider object.

use std::rc::Rc;

use async_trait::async_trait;
use log::debug;
use serde_json::{json, Value as JsonValue};

use crate::traits::{InjectedProvider, JsonRpcProvider, Provider, Signer};
use crate::utils::{expect_string, hexlify_bytes, normalize_transaction};
use crate::{Error, Result};

/// Placeholder endpoint for providers whose transport is the injected object.
pub const INJECTED_URL: &str = "injected://";

/// Routes JSON-RPC calls through the injected object's `request`.
pub struct InjectedJsonRpc {
    injected: Rc<dyn InjectedProvider>,
}

impl InjectedJsonRpc {
    pub fn new(injected: Rc<dyn InjectedProvider>) -> Self {
        Self { injected }
    }
}

#[async_trait(?Send)]
impl JsonRpcProvider for InjectedJsonRpc {
    async fn call(&self, _url: &str, method: &str, params: JsonValue, id: u64) -> Result<JsonValue> {
        debug!("injected -> {} ({})", method, id);
        self.injected.request(method, params).await
    }

    fn supports_url(&self, url: &str) -> bool {
        url == INJECTED_URL
    }
}

/// Signer backed by the accounts the injected object exposes.
pub struct InjectedSigner {
    injected: Rc<dyn InjectedProvider>,
    provider: Rc<dyn Provider>,
}

impl InjectedSigner {
    pub fn new(injected: Rc<dyn InjectedProvider>, provider: Rc<dyn Provider>) -> Self {
        Self { injected, provider }
    }
}

#[async_trait(?Send)]
impl Signer for InjectedSigner {
    async fn get_address(&self) -> Result<String> {
        let accounts = self.injected.request("eth_accounts", json!([])).await?;
        accounts
            .as_array()
            .and_then(|accounts| accounts.first())
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .ok_or(Error::NoAccount)
    }

    async fn get_balance(&self, block_tag: Option<&str>) -> Result<String> {
        let address = self.get_address().await?;
        self.provider.get_balance(&address, block_tag).await
    }

    async fn send_transaction(&self, transaction: &JsonValue) -> Result<JsonValue> {
        let mut transaction = normalize_transaction(transaction)?;
        if transaction.get("from").is_none() {
            transaction["from"] = JsonValue::String(self.get_address().await?);
        }
        self.injected
            .request("eth_sendTransaction", json!([transaction]))
            .await
    }

    async fn sign_message(&self, message: &str) -> Result<String> {
        let address = self.get_address().await?;
        let signature = self
            .injected
            .request("personal_sign", json!([hexlify_bytes(message.as_bytes()), address]))
            .await?;
        expect_string(signature, "signature")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkId;
    use crate::rpc::RpcProvider;
    use crate::testing::MockInjected;

    fn signer(injected: &Rc<MockInjected>) -> InjectedSigner {
        let client = Rc::new(InjectedJsonRpc::new(injected.clone()));
        let provider = Rc::new(RpcProvider::new(client, INJECTED_URL, NetworkId::default()));
        InjectedSigner::new(injected.clone(), provider)
    }

    #[tokio::test]
    async fn test_signer_requests() {
        let injected = Rc::new(
            MockInjected::new()
                .with("eth_accounts", json!(["0xaaaa"]))
                .with("eth_getBalance", json!("0x64"))
                .with("eth_sendTransaction", json!("0xhash"))
                .with("personal_sign", json!("0xsig")),
        );
        let signer = signer(&injected);

        assert_eq!(signer.get_address().await.unwrap(), "0xaaaa");
        assert_eq!(signer.get_balance(None).await.unwrap(), "0x64");
        assert_eq!(
            signer
                .send_transaction(&json!({ "to": "0xBB", "value": 16, "nonce": null }))
                .await
                .unwrap(),
            json!("0xhash")
        );
        assert_eq!(signer.sign_message("hi").await.unwrap(), "0xsig");

        let requests = injected.requests();
        let sent = requests
            .iter()
            .find(|(method, _)| method == "eth_sendTransaction")
            .unwrap();
        assert_eq!(sent.1, json!([{ "to": "0xbb", "value": "0x10", "from": "0xaaaa" }]));
        let signed = requests.iter().find(|(method, _)| method == "personal_sign").unwrap();
        assert_eq!(signed.1, json!(["0x6869", "0xaaaa"]));
    }

    #[tokio::test]
    async fn test_no_accounts() {
        let injected = Rc::new(MockInjected::new().with("eth_accounts", json!([])));
        assert_eq!(signer(&injected).get_address().await.unwrap_err(), Error::NoAccount);
    }
}
