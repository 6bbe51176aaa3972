pub mod config;
pub mod peer;
pub mod peer_state;
pub mod protocol;

pub use config::Config;
pub use peer::Peer;
pub use peer_state::PeerState;
pub use protocol::{Heartbeat, PeerAddress, RegisterReply, Request};
