//! Provider and signer handles for dapps that may be running inside a wallet
//! container frame.
//!
//! [`connect`] returns an [`App`] whose facades accept calls immediately and a
//! [`Negotiation`] that decides what backs them: the container reached over
//! `postMessage`, an injected provider object, or a public JSON-RPC endpoint
//! with no signer.

pub mod app;
pub mod channel;
pub mod config;
pub mod envelope;
pub mod error;
pub mod events;
pub mod facade;
pub mod fallback;
pub mod handshake;
pub mod injected;
pub mod lifecycle;
pub mod logging;
pub mod network;
pub mod proxy;
pub mod remote_signer;
pub mod rpc;
pub mod runtime;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod traits;
pub mod utils;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use app::{connect, App};
pub use config::Config;
pub use error::{Error, Result};
pub use facade::{ProviderFacade, SignerFacade};
pub use fallback::{Decision, Negotiation, NoSigner};
pub use network::NetworkId;
pub use traits::{
    HostPage, InjectedProvider, JsonRpcProvider, Listener, Provider, ProviderFactory, Signer,
    Transport,
};
