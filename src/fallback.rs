//! Picks the backend the facades get bound to: the container behind the
//! channel, an injected provider, or a public default with no signer.

use std::fmt;
use std::rc::Rc;

use async_trait::async_trait;
use log::info;
use serde_json::Value as JsonValue;

use crate::app::AppState;
use crate::config::Config;
use crate::handshake::{Handshake, HandshakeState};
use crate::lifecycle::Lifecycle;
use crate::network::NetworkId;
use crate::proxy::Resolver;
use crate::remote_signer::RemoteSigner;
use crate::traits::{HostPage, Provider, ProviderFactory, Signer};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Channel(NetworkId),
    Injected(NetworkId),
    Default(NetworkId),
}

impl Decision {
    pub fn network(&self) -> &NetworkId {
        match self {
            Decision::Channel(network) | Decision::Injected(network) | Decision::Default(network) => {
                network
            }
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Channel(network) => write!(f, "wallet container on {network}"),
            Decision::Injected(network) => write!(f, "injected provider on {network}"),
            Decision::Default(network) => write!(f, "default provider on {network}"),
        }
    }
}

/// Signer for pages with nothing to sign with.
pub struct NoSigner;

#[async_trait(?Send)]
impl Signer for NoSigner {
    async fn get_address(&self) -> Result<String> {
        Err(Error::NoSigner)
    }

    async fn get_balance(&self, _block_tag: Option<&str>) -> Result<String> {
        Err(Error::NoSigner)
    }

    async fn send_transaction(&self, _transaction: &JsonValue) -> Result<JsonValue> {
        Err(Error::NoSigner)
    }

    async fn sign_message(&self, _message: &str) -> Result<String> {
        Err(Error::NoSigner)
    }
}

/// Drives negotiation to a [`Decision`]. Created by [`crate::connect`];
/// the caller awaits or spawns [`Negotiation::run`].
pub struct Negotiation {
    pub(crate) page: Rc<dyn HostPage>,
    pub(crate) factory: Rc<dyn ProviderFactory>,
    pub(crate) config: Config,
    pub(crate) handshake: Handshake,
    pub(crate) provider: Resolver<dyn Provider>,
    pub(crate) signer: Resolver<dyn Signer>,
    pub(crate) lifecycle: Rc<Lifecycle>,
    pub(crate) state: Rc<AppState>,
}

impl Negotiation {
    pub async fn run(self) -> Result<Decision> {
        let decision = match self.handshake.run(self.page.as_ref()).await {
            HandshakeState::Present(network) => {
                info!("Connected to Ethers Wallet Container: network={}", network);
                let channel = self.handshake.channel().clone();
                let provider = self.factory.network_provider(&network)?;
                let signer = Rc::new(RemoteSigner::new(channel.clone(), provider.clone()));
                self.bind(provider, signer)?;
                self.state.set_channel(channel);
                Decision::Channel(network)
            }
            _ => {
                self.handshake.channel().teardown();
                let declared = self
                    .page
                    .network_override()
                    .unwrap_or_else(|| self.config.network.clone());
                let network = NetworkId::parse(&declared)?;
                match self.page.injected() {
                    Some(injected) => {
                        info!("Connected Injected Web3: network={}", network);
                        let (provider, signer) = self.factory.injected_backend(injected, &network)?;
                        self.bind(provider, signer)?;
                        Decision::Injected(network)
                    }
                    None => {
                        info!("Connected Default Provider: network={}", network);
                        let provider = self.factory.network_provider(&network)?;
                        self.bind(provider, Rc::new(NoSigner))?;
                        Decision::Default(network)
                    }
                }
            }
        };
        self.state.set_decision(decision.clone());
        self.lifecycle.fire_ready();
        Ok(decision)
    }

    fn bind(&self, provider: Rc<dyn Provider>, signer: Rc<dyn Signer>) -> Result<()> {
        self.provider.resolve(provider)?;
        self.signer.resolve(signer)
    }
}

// Runs when `run` returns an error or the negotiation is dropped unrun. The
// resolvers drop right after, failing pending facade calls with `Disconnected`.
impl Drop for Negotiation {
    fn drop(&mut self) {
        if self.lifecycle.is_ready() {
            return;
        }
        self.handshake.channel().teardown();
        self.lifecycle.fail();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_signer_rejects_everything() {
        let signer = NoSigner;
        assert_eq!(signer.get_address().await.unwrap_err(), Error::NoSigner);
        assert_eq!(signer.get_balance(None).await.unwrap_err(), Error::NoSigner);
        assert_eq!(
            signer.send_transaction(&JsonValue::Null).await.unwrap_err(),
            Error::NoSigner
        );
        assert_eq!(signer.sign_message("hi").await.unwrap_err(), Error::NoSigner);
    }

    #[test]
    fn test_decision_network() {
        let decision = Decision::Injected(NetworkId::default());
        assert_eq!(decision.network().name(), "homestead");
        assert_eq!(decision.to_string(), "injected provider on homestead");
    }
}
