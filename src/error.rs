//! Error type shared by every layer of the connector.

use serde::{Deserialize, Serialize};

/// Everything that can go wrong between a caller and the backing provider.
///
/// The enum is `Clone` because a single failure (for instance a torn-down
/// channel) is handed to several waiting futures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum Error {
    #[error("proxy target already resolved")]
    AlreadyResolved,
    #[error("channel already has a window")]
    AlreadyAttached,
    #[error("cannot access property before connection: {0}")]
    NotConnected(String),
    #[error("facade was dropped before a target was connected")]
    Disconnected,
    #[error("unknown member: {0}")]
    UnknownMember(String),
    #[error("member {member} is not {expected}")]
    MemberPolicy { member: String, expected: String },
    #[error("member {0} is classified more than once")]
    DuplicateMember(String),
    #[error("channel closed")]
    ChannelClosed,
    #[error("Unknown Action: {0}")]
    UnknownAction(String),
    #[error("{0}")]
    Remote(String),
    #[error("no signer")]
    NoSigner,
    #[error("no account")]
    NoAccount,
    #[error("not supported: {0}")]
    NotSupported(String),
    #[error("Ethers container took too long to reply. Not setting up.")]
    HandshakeTimeout,
    #[error("malformed handshake reply: {0}")]
    MalformedReply(String),
    #[error("JSON-RPC error: {0}")]
    JsonRpc(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("invalid hexlify value: {0}")]
    Hex(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("timeout: {0}")]
    Timeout(String),
}

pub type Result<T> = core::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(format!("{err}"))
    }
}

impl From<hex::FromHexError> for Error {
    fn from(err: hex::FromHexError) -> Self {
        Error::Hex(format!("{err:?}"))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidUrl(format!("{err}"))
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(format!("{err:?}"))
    }
}

#[cfg(target_arch = "wasm32")]
impl From<wasm_bindgen::JsValue> for Error {
    fn from(err: wasm_bindgen::JsValue) -> Self {
        Error::Transport(format!("{err:?}"))
    }
}
