pub mod bootstrap;
pub mod multicast;

pub use bootstrap::{BootstrapServer, register_with_bootstrap};
pub use multicast::MulticastDiscovery;
