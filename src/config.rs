use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::network::DEFAULT_NETWORK;

/// Handshake window before the container is declared absent.
pub const HANDSHAKE_TIMEOUT_MS: u64 = 2000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Origin passed along with every outbound envelope. Advisory only.
    pub target_origin: String,
    pub handshake_timeout_ms: u64,
    /// Network used by the injected and default branches.
    pub network: String,
    /// Named network -> JSON-RPC endpoint used by the synthesized default provider.
    pub endpoints: BTreeMap<String, String>,
    pub receipt_poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let mut endpoints = BTreeMap::new();
        endpoints.insert("homestead".to_string(), "https://cloudflare-eth.com".to_string());
        endpoints.insert("ropsten".to_string(), "https://ropsten.infura.io/".to_string());
        endpoints.insert("rinkeby".to_string(), "https://rinkeby.infura.io/".to_string());
        endpoints.insert("kovan".to_string(), "https://kovan.infura.io/".to_string());
        endpoints.insert("goerli".to_string(), "https://goerli.infura.io/".to_string());
        Self {
            target_origin: "*".to_string(),
            handshake_timeout_ms: HANDSHAKE_TIMEOUT_MS,
            network: DEFAULT_NETWORK.to_string(),
            endpoints,
            receipt_poll_interval_ms: 4000,
        }
    }
}

impl Config {
    /// Defaults overridden by `FRAME_CONNECT_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mut endpoints = defaults.endpoints;
        if let Ok(url) = env::var("FRAME_CONNECT_RPC_URL") {
            let network = env::var("FRAME_CONNECT_NETWORK").unwrap_or_else(|_| defaults.network.clone());
            endpoints.insert(network, url);
        }
        Self {
            target_origin: env::var("FRAME_CONNECT_TARGET_ORIGIN")
                .unwrap_or(defaults.target_origin),
            handshake_timeout_ms: env::var("FRAME_CONNECT_HANDSHAKE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.handshake_timeout_ms),
            network: env::var("FRAME_CONNECT_NETWORK").unwrap_or(defaults.network),
            endpoints,
            receipt_poll_interval_ms: env::var("FRAME_CONNECT_RECEIPT_POLL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.receipt_poll_interval_ms),
        }
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    pub fn with_endpoint(mut self, network: impl Into<String>, url: impl Into<String>) -> Self {
        self.endpoints.insert(network.into(), url.into());
        self
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }

    pub fn endpoint(&self, network: &str) -> Option<&str> {
        self.endpoints.get(network).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.target_origin, "*");
        assert_eq!(config.handshake_timeout(), Duration::from_millis(2000));
        assert_eq!(config.network, "homestead");
        assert!(config.endpoint("homestead").is_some());
        assert!(config.endpoint("nowhere").is_none());
    }

    #[test]
    fn test_builders() {
        let config = Config::default()
            .with_network("ropsten")
            .with_endpoint("ropsten", "http://localhost:8545");
        assert_eq!(config.network, "ropsten");
        assert_eq!(config.endpoint("ropsten"), Some("http://localhost:8545"));
    }
}
