//! The peer facade: the operations front ends call into.
//!
//! A `Peer` owns the transfer server, the peer state and, while
//! discovery is active, the multicast agent. Front ends (CLI, web) only
//! call these methods and display results.

use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::Config;
use crate::core::peer_state::PeerState;
use crate::core::protocol::PeerAddress;
use crate::network::bootstrap::register_with_bootstrap;
use crate::network::multicast::MulticastDiscovery;
use crate::storage::FileStore;
use crate::transfer::{client, TransferServer};
use crate::utils::{P2pError, Result};

pub struct Peer {
    config: Config,
    state: Arc<PeerState>,
    store: Arc<FileStore>,
    discovery: Option<MulticastDiscovery>,
}

impl Peer {
    /// Create the peer: share/download directories, transfer server,
    /// empty peer state. Discovery starts separately.
    pub async fn new(config: Config) -> Result<Self> {
        let store = Arc::new(
            FileStore::new(config.shared_dir.clone(), config.download_dir.clone()).await?,
        );
        let state = Arc::new(PeerState::new(config.local_addr()));

        let server = TransferServer::bind(
            &config.ip,
            config.port,
            store.clone(),
            config.shared_secret.clone(),
        )
        .await?;
        server.spawn();

        info!("Peer initialized at {}", state.local());
        Ok(Self {
            config,
            state,
            store,
            discovery: None,
        })
    }

    pub fn local_addr(&self) -> &PeerAddress {
        self.state.local()
    }

    /// Register with the bootstrap registry and merge the returned
    /// addresses into the known set (availability untouched).
    pub async fn connect_to_bootstrap(&self) -> Result<Vec<PeerAddress>> {
        let nodes =
            register_with_bootstrap(&self.config.bootstrap_addr(), self.state.local()).await?;
        self.state.merge_bootstrap(nodes.clone());
        Ok(nodes)
    }

    pub fn list_known_nodes(&self) -> Vec<PeerAddress> {
        self.state.known()
    }

    pub fn list_available_nodes(&self) -> Vec<PeerAddress> {
        self.state.available()
    }

    pub fn list_bootstrap_nodes(&self) -> Vec<PeerAddress> {
        self.state.bootstrap_nodes()
    }

    /// Activate multicast discovery. A no-op if already active.
    pub async fn start_multicast(&mut self) -> Result<()> {
        if self.discovery.is_some() {
            warn!("Multicast discovery already active");
            return Ok(());
        }
        let discovery = MulticastDiscovery::start(
            self.config.multicast_group,
            self.config.multicast_port,
            self.config.multicast_ttl,
            self.config.heartbeat_interval(),
            self.config.local_addr(),
            self.state.clone(),
        )
        .await?;
        self.discovery = Some(discovery);
        Ok(())
    }

    /// Announce departure and deactivate discovery. The agent can be
    /// started again afterwards.
    pub async fn stop_multicast(&mut self) -> Result<()> {
        match self.discovery.take() {
            Some(discovery) => discovery.close().await,
            None => Err(P2pError::Inactive),
        }
    }

    pub fn multicast_active(&self) -> bool {
        self.discovery.is_some()
    }

    /// Ask every known node whether it shares `filename` and collect
    /// the ones that answered FOUND. Nodes are attempted regardless of
    /// available-set membership; unreachable ones simply answer "no".
    /// An empty known set short-circuits without any network call.
    pub async fn search_file(&self, filename: &str) -> Vec<PeerAddress> {
        let known = self.state.known();
        if known.is_empty() {
            warn!("No known nodes; connect to bootstrap or wait for multicast");
            return Vec::new();
        }

        info!("Searching '{}' across {} nodes", filename, known.len());
        let mut found = Vec::new();
        for addr in known {
            if addr == *self.state.local() {
                continue;
            }
            if client::remote_file_exists(&addr, filename, &self.config.shared_secret).await {
                found.push(addr);
            }
        }
        found
    }

    /// Download `filename` from the given peer into the download
    /// directory.
    pub async fn download_file(&self, ip: &str, port: u16, filename: &str) -> Result<PathBuf> {
        let addr = PeerAddress::new(ip, port);
        client::download_file(&addr, filename, &self.config.shared_secret, &self.store).await
    }

    /// Best-effort reachability probe for display; never mutates state.
    pub async fn is_node_alive(&self, addr: &PeerAddress) -> bool {
        client::is_node_alive(addr).await
    }

    pub async fn share_file(&self, path: &Path) -> Result<String> {
        self.store.share_file(path).await
    }

    pub async fn list_local_files(&self) -> Result<Vec<String>> {
        self.store.list_shared().await
    }

    pub async fn list_downloaded_files(&self) -> Result<Vec<String>> {
        self.store.list_downloads().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn test_peer(dir: &tempfile::TempDir) -> Peer {
        let config = Config {
            ip: "127.0.0.1".to_string(),
            // Port 0 gives an ephemeral transfer port; the advertised
            // address does not matter for these tests.
            port: 0,
            shared_dir: dir.path().join("shared"),
            download_dir: dir.path().join("downloads"),
            ..Config::default()
        };
        Peer::new(config).await.unwrap()
    }

    #[tokio::test]
    async fn test_search_with_no_known_nodes_returns_empty() {
        let dir = tempdir().unwrap();
        let peer = test_peer(&dir).await;

        assert!(peer.list_known_nodes().is_empty());
        assert!(peer.search_file("anything.txt").await.is_empty());
    }

    #[tokio::test]
    async fn test_stop_multicast_when_inactive_is_an_error() {
        let dir = tempdir().unwrap();
        let mut peer = test_peer(&dir).await;

        assert!(!peer.multicast_active());
        assert!(matches!(peer.stop_multicast().await, Err(P2pError::Inactive)));
    }

    #[tokio::test]
    async fn test_share_and_list_pass_through() {
        let dir = tempdir().unwrap();
        let peer = test_peer(&dir).await;

        let src = dir.path().join("notes.txt");
        tokio::fs::write(&src, b"hi").await.unwrap();
        peer.share_file(&src).await.unwrap();

        assert_eq!(peer.list_local_files().await.unwrap(), vec!["notes.txt"]);
        assert!(peer.list_downloaded_files().await.unwrap().is_empty());
    }
}
