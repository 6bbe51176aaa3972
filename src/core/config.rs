use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::PeerAddress;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Address the transfer server listens on and that other peers use
    /// to reach this one. No resolution is performed on it.
    pub ip: String,
    pub port: u16,

    pub bootstrap_host: String,
    pub bootstrap_port: u16,

    pub shared_dir: PathBuf,
    pub download_dir: PathBuf,

    /// Pre-shared value embedded in every transfer request. Stops
    /// accidental cross-talk between unrelated swarms, nothing more.
    pub shared_secret: String,

    pub multicast_group: Ipv4Addr,
    pub multicast_port: u16,
    pub multicast_ttl: u32,
    /// Seconds between HELLO announcements.
    pub heartbeat_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".to_string(),
            port: 9000,
            bootstrap_host: "127.0.0.1".to_string(),
            bootstrap_port: 8000,
            shared_dir: PathBuf::from("./shared_files"),
            download_dir: PathBuf::from("./downloads"),
            shared_secret: "distrishare_2025".to_string(),
            multicast_group: Ipv4Addr::new(224, 1, 1, 1),
            multicast_port: 10_000,
            multicast_ttl: 1,
            heartbeat_secs: 5,
        }
    }
}

impl Config {
    pub fn local_addr(&self) -> PeerAddress {
        PeerAddress::new(self.ip.clone(), self.port)
    }

    pub fn bootstrap_addr(&self) -> PeerAddress {
        PeerAddress::new(self.bootstrap_host.clone(), self.bootstrap_port)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}
