//! DistriShare: hybrid P2P file sharing.
//!
//! Peers discover each other two ways at once: a centralized bootstrap
//! registry seeds the set of ever-registered peers, and a multicast
//! heartbeat protocol tracks who is alive right now. Discovered peers
//! query and move file bytes directly over a one-shot TCP protocol with
//! a pre-shared secret.

pub mod core;
pub mod network;
pub mod storage;
pub mod transfer;
pub mod utils;

pub use crate::core::{Config, Peer, PeerAddress};
pub use crate::network::BootstrapServer;
pub use crate::storage::FileStore;
pub use crate::utils::{P2pError, Result, setup_logging};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
