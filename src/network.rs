//! Network identifiers as declared by a wallet container.
//!
//! A container answers the `getNetwork` probe with a free-form string. Two
//! public-facing aliases map onto the canonical names the providers use, and
//! anything that looks like an HTTP(S) URL designates a custom JSON-RPC
//! endpoint instead of a named network.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

pub const DEFAULT_NETWORK: &str = "homestead";

/// Name and chain id reported by providers bound to a custom endpoint.
pub const CUSTOM_NETWORK_NAME: &str = "test";
pub const CUSTOM_CHAIN_ID: u64 = 43;

const ALIASES: &[(&str, &str)] = &[("mainnet", "homestead"), ("testnet", "ropsten")];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkId {
    Named(String),
    Custom(Url),
}

impl NetworkId {
    /// Normalize a declared identifier through the alias table.
    pub fn parse(declared: &str) -> Result<Self> {
        let declared = declared.trim();
        if declared.is_empty() {
            return Err(Error::MalformedReply("empty network identifier".to_string()));
        }
        if is_url_shaped(declared) {
            return Ok(NetworkId::Custom(Url::parse(declared)?));
        }
        let canonical = ALIASES
            .iter()
            .find(|(alias, _)| *alias == declared)
            .map(|(_, canonical)| *canonical)
            .unwrap_or(declared);
        Ok(NetworkId::Named(canonical.to_string()))
    }

    /// Name a provider bound to this network reports.
    pub fn name(&self) -> &str {
        match self {
            NetworkId::Named(name) => name,
            NetworkId::Custom(_) => CUSTOM_NETWORK_NAME,
        }
    }

    pub fn chain_id(&self) -> Option<u64> {
        match self {
            NetworkId::Named(name) => chain_id_for(name),
            NetworkId::Custom(_) => Some(CUSTOM_CHAIN_ID),
        }
    }

    /// ENS registry for the network, where one is deployed.
    pub fn ens_address(&self) -> Option<&'static str> {
        match self.name() {
            "homestead" => Some("0x314159265dd8dbb310642f98f50c066173c1259b"),
            "ropsten" => Some("0x112234455c3a32fd11230c42e7bccd4a84e02010"),
            _ => None,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, NetworkId::Custom(_))
    }
}

impl Default for NetworkId {
    fn default() -> Self {
        NetworkId::Named(DEFAULT_NETWORK.to_string())
    }
}

impl FromStr for NetworkId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        NetworkId::parse(s)
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkId::Named(name) => write!(f, "{name}"),
            NetworkId::Custom(url) => write!(f, "{url}"),
        }
    }
}

fn is_url_shaped(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    lower.starts_with("http:") || lower.starts_with("https:")
}

fn chain_id_for(name: &str) -> Option<u64> {
    match name {
        "homestead" => Some(1),
        "ropsten" => Some(3),
        "rinkeby" => Some(4),
        "goerli" => Some(5),
        "kovan" => Some(42),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases() {
        assert_eq!(NetworkId::parse("mainnet").unwrap(), NetworkId::Named("homestead".into()));
        assert_eq!(NetworkId::parse("testnet").unwrap(), NetworkId::Named("ropsten".into()));
        assert_eq!(NetworkId::parse("rinkeby").unwrap(), NetworkId::Named("rinkeby".into()));
    }

    #[test]
    fn test_custom_endpoint() {
        let network = NetworkId::parse("https://x").unwrap();
        assert!(network.is_custom());
        assert_eq!(network.name(), "test");
        assert_eq!(network.chain_id(), Some(43));

        let local: NetworkId = "http://localhost:8545".parse().unwrap();
        assert_eq!(local, NetworkId::Custom(Url::parse("http://localhost:8545").unwrap()));
    }

    #[test]
    fn test_empty_is_malformed() {
        assert!(matches!(NetworkId::parse("  "), Err(Error::MalformedReply(_))));
    }

    #[test]
    fn test_metadata() {
        let homestead = NetworkId::default();
        assert_eq!(homestead.chain_id(), Some(1));
        assert!(homestead.ens_address().is_some());
        assert_eq!(NetworkId::Named("devnet".into()).chain_id(), None);
    }
}
