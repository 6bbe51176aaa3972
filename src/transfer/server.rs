//! Transfer server: answers search and download requests from other
//! peers, one request per connection.

use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Duration, sleep};

use crate::core::protocol::{
    CHUNK_SIZE, ERROR_AUTH_FAILED, ERROR_FILE_NOT_FOUND, ERROR_UNKNOWN_REQUEST, FOUND, NOT_FOUND,
    Request,
};
use crate::storage::FileStore;
use crate::utils::{P2pError, Result};

const REQUEST_BUF_SIZE: usize = 4096;

pub struct TransferServer {
    listener: TcpListener,
    store: Arc<FileStore>,
    secret: String,
}

impl TransferServer {
    pub async fn bind(host: &str, port: u16, store: Arc<FileStore>, secret: String) -> Result<Self> {
        let addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| P2pError::Io(format!("Failed to bind transfer server to {}: {}", addr, e)))?;

        info!("Transfer server listening on {}", addr);
        Ok(Self {
            listener,
            store,
            secret,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Accept loop: one spawned handler per connection. Handlers share
    /// nothing but the read-only share directory, so a failing one
    /// never affects another, and the loop itself never exits.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("Transfer connection from {}", addr);
                    let store = self.store.clone();
                    let secret = self.secret.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_request(stream, addr, store, secret).await {
                            warn!("Transfer handler for {} failed: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Transfer accept failed: {}", e);
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

/// Parse one request, produce exactly one response, close.
async fn handle_request(
    mut stream: TcpStream,
    addr: SocketAddr,
    store: Arc<FileStore>,
    secret: String,
) -> Result<()> {
    let mut buf = vec![0u8; REQUEST_BUF_SIZE];
    let n = stream.read(&mut buf).await?;
    let request: Request = match serde_json::from_slice(&buf[..n]) {
        Ok(request) => request,
        Err(e) => {
            warn!("Malformed transfer request from {}: {}", addr, e);
            stream.write_all(ERROR_UNKNOWN_REQUEST.as_bytes()).await?;
            return Ok(());
        }
    };

    match request {
        Request::Search {
            filename,
            secret: presented,
        } => {
            if presented != secret {
                warn!("Rejected search from {}: bad secret", addr);
                stream.write_all(ERROR_AUTH_FAILED.as_bytes()).await?;
                return Ok(());
            }
            let reply = if store.has_shared(&filename).await {
                FOUND
            } else {
                NOT_FOUND
            };
            debug!("Search '{}' from {} -> {}", filename, addr, reply);
            stream.write_all(reply.as_bytes()).await?;
        }
        Request::Download {
            filename,
            secret: presented,
        } => {
            if presented != secret {
                warn!("Rejected download from {}: bad secret", addr);
                stream.write_all(ERROR_AUTH_FAILED.as_bytes()).await?;
                return Ok(());
            }
            if !store.has_shared(&filename).await {
                stream.write_all(ERROR_FILE_NOT_FOUND.as_bytes()).await?;
                return Ok(());
            }
            send_file(&mut stream, &store, &filename).await?;
            info!("Sent '{}' to {}", filename, addr);
        }
        Request::Register { .. } => {
            warn!("Unexpected register request on transfer port from {}", addr);
            stream.write_all(ERROR_UNKNOWN_REQUEST.as_bytes()).await?;
        }
    }

    stream.flush().await?;
    Ok(())
}

/// Stream the file's bytes verbatim in fixed-size chunks until EOF.
async fn send_file(stream: &mut TcpStream, store: &FileStore, filename: &str) -> Result<()> {
    let mut file = tokio::fs::File::open(store.shared_path(filename))
        .await
        .map_err(|e| P2pError::Io(format!("Failed to open '{}': {}", filename, e)))?;

    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        stream.write_all(&chunk[..n]).await?;
    }
    Ok(())
}
