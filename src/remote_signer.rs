//! Signer whose operations are round trips to the wallet container.

use std::rc::Rc;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

use crate::channel::Channel;
use crate::traits::{Provider, Signer};
use crate::utils::{expect_string, normalize_transaction};
use crate::{Error, Result};

pub struct RemoteSigner {
    channel: Channel,
    provider: Rc<dyn Provider>,
}

impl RemoteSigner {
    /// `provider` serves balance lookups for the container's account.
    pub fn new(channel: Channel, provider: Rc<dyn Provider>) -> Self {
        Self { channel, provider }
    }
}

#[async_trait(?Send)]
impl Signer for RemoteSigner {
    async fn get_address(&self) -> Result<String> {
        match self.channel.request("getAccount", json!({})).await {
            Ok(JsonValue::String(address)) => Ok(address),
            _ => Err(Error::NoAccount),
        }
    }

    async fn get_balance(&self, block_tag: Option<&str>) -> Result<String> {
        let address = self.get_address().await?;
        self.provider.get_balance(&address, block_tag).await
    }

    async fn send_transaction(&self, transaction: &JsonValue) -> Result<JsonValue> {
        let transaction = normalize_transaction(transaction)?;
        self.channel
            .request("sendTransaction", json!({ "transaction": transaction }))
            .await
    }

    async fn sign_message(&self, message: &str) -> Result<String> {
        let signature = self
            .channel
            .request("signMessage", json!({ "message": message }))
            .await?;
        expect_string(signature, "signature")
    }
}
