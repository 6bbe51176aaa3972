//! Bootstrap registry: the single trusted process peers register with.
//!
//! One connection carries one registration and one reply. The registry
//! is append-only for the process lifetime; a peer that disconnects
//! stays listed.

use log::{debug, error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::time::{Duration, sleep, timeout};

use crate::core::protocol::{PeerAddress, RegisterReply, Request};
use crate::utils::{P2pError, Result};

const REQUEST_BUF_SIZE: usize = 4096;
const CLIENT_TIMEOUT: Duration = Duration::from_secs(3);

type Registry = Arc<Mutex<Vec<PeerAddress>>>;

pub struct BootstrapServer {
    listener: TcpListener,
    registry: Registry,
}

impl BootstrapServer {
    /// Bind the registry listener. A bind failure is fatal for this
    /// server only; the caller decides what to do with the error.
    pub async fn bind(host: &str, port: u16) -> Result<Self> {
        let addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| P2pError::Io(format!("Failed to bind bootstrap to {}: {}", addr, e)))?;

        info!("Bootstrap registry listening on {}", addr);
        Ok(Self {
            listener,
            registry: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Accept loop. Handler failures are logged per connection and
    /// never terminate the loop.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("Bootstrap connection from {}", addr);
                    let registry = self.registry.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_registration(stream, registry).await {
                            error!("Bootstrap handler for {} failed: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Bootstrap accept failed: {}", e);
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

/// Process one registration: append if absent and snapshot the full
/// list under a single lock acquisition, then reply and close.
async fn handle_registration(mut stream: TcpStream, registry: Registry) -> Result<()> {
    let mut buf = vec![0u8; REQUEST_BUF_SIZE];
    let n = stream.read(&mut buf).await?;

    let request: Request = serde_json::from_slice(&buf[..n])?;
    let Request::Register { ip, port } = request else {
        return Err(P2pError::Protocol(
            "Bootstrap only accepts register requests".to_string(),
        ));
    };

    let peer = PeerAddress::new(ip, port);
    let reply = {
        let mut nodes = registry.lock().await;
        if !nodes.contains(&peer) {
            info!("Registered peer {}", peer);
            nodes.push(peer);
        } else {
            debug!("Peer {} already registered", peer);
        }
        RegisterReply {
            nodes: nodes.clone(),
        }
    };

    let payload = serde_json::to_vec(&reply)?;
    stream.write_all(&payload).await?;
    stream.flush().await?;
    Ok(())
}

/// Register with the bootstrap registry and return the full node list,
/// requester included.
pub async fn register_with_bootstrap(
    bootstrap: &PeerAddress,
    me: &PeerAddress,
) -> Result<Vec<PeerAddress>> {
    let mut stream = timeout(CLIENT_TIMEOUT, TcpStream::connect(bootstrap.to_string()))
        .await
        .map_err(|_| P2pError::Timeout(format!("Connecting to bootstrap {}", bootstrap)))?
        .map_err(|e| P2pError::Connection(format!("Bootstrap {}: {}", bootstrap, e)))?;

    let request = Request::Register {
        ip: me.host.clone(),
        port: me.port,
    };
    stream.write_all(&serde_json::to_vec(&request)?).await?;

    // The server replies once and closes, so read to EOF.
    let mut payload = Vec::new();
    timeout(CLIENT_TIMEOUT, stream.read_to_end(&mut payload))
        .await
        .map_err(|_| P2pError::Timeout(format!("Waiting for bootstrap {}", bootstrap)))??;

    let reply: RegisterReply = serde_json::from_slice(&payload)?;
    info!("Bootstrap returned {} registered nodes", reply.nodes.len());
    Ok(reply.nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn spawn_server() -> PeerAddress {
        let server = BootstrapServer::bind("127.0.0.1", 0).await.unwrap();
        let addr = server.local_addr().unwrap();
        server.spawn();
        PeerAddress::new("127.0.0.1", addr.port())
    }

    #[tokio::test]
    async fn test_registry_lists_every_distinct_peer() {
        let bootstrap = spawn_server().await;

        let a = PeerAddress::new("127.0.0.1", 9001);
        let b = PeerAddress::new("127.0.0.1", 9002);
        let c = PeerAddress::new("127.0.0.1", 9003);

        let nodes = register_with_bootstrap(&bootstrap, &a).await.unwrap();
        assert_eq!(nodes, vec![a.clone()]);

        let nodes = register_with_bootstrap(&bootstrap, &b).await.unwrap();
        assert_eq!(nodes, vec![a.clone(), b.clone()]);

        let nodes = register_with_bootstrap(&bootstrap, &c).await.unwrap();
        assert_eq!(nodes.len(), 3);
        assert!(nodes.contains(&a) && nodes.contains(&b) && nodes.contains(&c));
    }

    #[tokio::test]
    async fn test_repeat_registration_adds_no_duplicate() {
        let bootstrap = spawn_server().await;
        let a = PeerAddress::new("127.0.0.1", 9001);

        register_with_bootstrap(&bootstrap, &a).await.unwrap();
        let nodes = register_with_bootstrap(&bootstrap, &a).await.unwrap();
        assert_eq!(nodes, vec![a]);
    }

    #[tokio::test]
    async fn test_malformed_request_leaves_registry_untouched() {
        let bootstrap = spawn_server().await;

        // Garbage connection: the handler logs and closes, the accept
        // loop keeps serving.
        let mut stream = TcpStream::connect(bootstrap.to_string()).await.unwrap();
        stream.write_all(b"this is not json").await.unwrap();
        let mut reply = Vec::new();
        let _ = stream.read_to_end(&mut reply).await;
        assert!(reply.is_empty());

        let a = PeerAddress::new("127.0.0.1", 9001);
        let nodes = register_with_bootstrap(&bootstrap, &a).await.unwrap();
        assert_eq!(nodes, vec![a]);
    }
}
