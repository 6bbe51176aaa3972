//! Client side of the transfer protocol: one fresh connection per call,
//! short timeouts so an unresponsive peer cannot block the caller.

use log::{debug, error, info};
use std::path::{Path, PathBuf};
use tokio::fs as async_fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Duration, timeout};

use crate::core::protocol::{CHUNK_SIZE, ERROR_PREFIX, FOUND, PeerAddress, Request};
use crate::storage::FileStore;
use crate::utils::{P2pError, Result};

const SEARCH_TIMEOUT: Duration = Duration::from_secs(2);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(5);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Ask `addr` whether it shares `filename`. Any failure (refusal,
/// timeout, bad secret, malformed reply) counts as "no".
pub async fn remote_file_exists(addr: &PeerAddress, filename: &str, secret: &str) -> bool {
    match search(addr, filename, secret).await {
        Ok(found) => found,
        Err(e) => {
            debug!("Search at {} failed: {}", addr, e);
            false
        }
    }
}

async fn search(addr: &PeerAddress, filename: &str, secret: &str) -> Result<bool> {
    let mut stream = connect(addr, SEARCH_TIMEOUT).await?;

    let request = Request::Search {
        filename: filename.to_string(),
        secret: secret.to_string(),
    };
    stream.write_all(&serde_json::to_vec(&request)?).await?;

    let mut buf = [0u8; 256];
    let n = timeout(SEARCH_TIMEOUT, stream.read(&mut buf))
        .await
        .map_err(|_| P2pError::Timeout(format!("Waiting for search reply from {}", addr)))??;

    let reply = std::str::from_utf8(&buf[..n])
        .map_err(|_| P2pError::Protocol("Non-UTF8 search reply".to_string()))?;
    debug!("Search '{}' at {} -> {}", filename, addr, reply);
    Ok(reply == FOUND)
}

/// Download `filename` from `addr` into the download directory. On any
/// failure the partially written destination is removed; a truncated
/// file with a plausible name is never left behind.
pub async fn download_file(
    addr: &PeerAddress,
    filename: &str,
    secret: &str,
    store: &FileStore,
) -> Result<PathBuf> {
    let dest = store.download_path(filename);

    match fetch(addr, filename, secret, &dest).await {
        Ok(()) => {
            info!("Downloaded '{}' from {} to {:?}", filename, addr, dest);
            Ok(dest)
        }
        Err(e) => {
            error!("Download of '{}' from {} failed: {}", filename, addr, e);
            if async_fs::metadata(&dest).await.is_ok() {
                let _ = async_fs::remove_file(&dest).await;
            }
            Err(e)
        }
    }
}

async fn fetch(addr: &PeerAddress, filename: &str, secret: &str, dest: &Path) -> Result<()> {
    let mut stream = connect(addr, DOWNLOAD_TIMEOUT).await?;

    let request = Request::Download {
        filename: filename.to_string(),
        secret: secret.to_string(),
    };
    stream.write_all(&serde_json::to_vec(&request)?).await?;

    // The destination is only created once a data chunk has arrived,
    // so a rejected request leaves no file at all.
    let mut file = None;
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        let n = timeout(DOWNLOAD_TIMEOUT, stream.read(&mut chunk))
            .await
            .map_err(|_| P2pError::Timeout(format!("Waiting for file bytes from {}", addr)))??;
        if n == 0 {
            break;
        }
        if chunk[..n].starts_with(ERROR_PREFIX.as_bytes()) {
            let message = String::from_utf8_lossy(&chunk[..n]).to_string();
            return Err(P2pError::Remote(message));
        }
        if file.is_none() {
            file = Some(async_fs::File::create(dest).await?);
        }
        if let Some(f) = file.as_mut() {
            f.write_all(&chunk[..n]).await?;
        }
    }

    match file {
        Some(mut f) => f.flush().await?,
        // Zero-byte file: the stream ended before any data chunk.
        None => {
            async_fs::File::create(dest).await?;
        }
    }
    Ok(())
}

/// Best-effort liveness probe: connect and close. Used only for
/// display/filtering, never to prune peer state.
pub async fn is_node_alive(addr: &PeerAddress) -> bool {
    matches!(
        timeout(PROBE_TIMEOUT, TcpStream::connect(addr.to_string())).await,
        Ok(Ok(_))
    )
}

async fn connect(addr: &PeerAddress, limit: Duration) -> Result<TcpStream> {
    timeout(limit, TcpStream::connect(addr.to_string()))
        .await
        .map_err(|_| P2pError::Timeout(format!("Connecting to {}", addr)))?
        .map_err(|e| P2pError::Connection(format!("{}: {}", addr, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::TransferServer;
    use std::sync::Arc;
    use tempfile::tempdir;

    const SECRET: &str = "test_secret";

    async fn serve_with(files: &[(&str, &[u8])]) -> (PeerAddress, Arc<FileStore>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = Arc::new(
            FileStore::new(dir.path().join("shared"), dir.path().join("downloads"))
                .await
                .unwrap(),
        );
        for (name, content) in files {
            async_fs::write(store.shared_path(name), content).await.unwrap();
        }

        let server = TransferServer::bind("127.0.0.1", 0, store.clone(), SECRET.to_string())
            .await
            .unwrap();
        let addr = PeerAddress::new("127.0.0.1", server.local_addr().unwrap().port());
        server.spawn();
        (addr, store, dir)
    }

    #[tokio::test]
    async fn test_remote_file_exists() {
        let (addr, _store, _dir) = serve_with(&[("present.txt", b"data")]).await;

        assert!(remote_file_exists(&addr, "present.txt", SECRET).await);
        assert!(!remote_file_exists(&addr, "absent.txt", SECRET).await);
    }

    #[tokio::test]
    async fn test_search_with_wrong_secret_is_rejected() {
        let (addr, _store, _dir) = serve_with(&[("present.txt", b"data")]).await;

        assert!(!remote_file_exists(&addr, "present.txt", "wrong").await);
    }

    #[tokio::test]
    async fn test_download_round_trip_is_byte_identical() {
        let content: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let (addr, _store, dir) = serve_with(&[("blob.bin", &content)]).await;

        let local = Arc::new(
            FileStore::new(dir.path().join("s2"), dir.path().join("d2"))
                .await
                .unwrap(),
        );
        let dest = download_file(&addr, "blob.bin", SECRET, &local).await.unwrap();
        assert_eq!(async_fs::read(&dest).await.unwrap(), content);
    }

    #[tokio::test]
    async fn test_download_of_empty_file() {
        let (addr, _store, dir) = serve_with(&[("empty.bin", b"")]).await;

        let local = Arc::new(
            FileStore::new(dir.path().join("s2"), dir.path().join("d2"))
                .await
                .unwrap(),
        );
        let dest = download_file(&addr, "empty.bin", SECRET, &local).await.unwrap();
        assert_eq!(async_fs::read(&dest).await.unwrap(), b"");
    }

    #[tokio::test]
    async fn test_download_missing_file_leaves_no_partial() {
        let (addr, _store, dir) = serve_with(&[]).await;

        let local = Arc::new(
            FileStore::new(dir.path().join("s2"), dir.path().join("d2"))
                .await
                .unwrap(),
        );
        let err = download_file(&addr, "ghost.bin", SECRET, &local).await.unwrap_err();
        assert!(matches!(err, P2pError::Remote(_)));
        assert!(async_fs::metadata(local.download_path("ghost.bin")).await.is_err());
    }

    #[tokio::test]
    async fn test_download_with_wrong_secret_creates_no_file() {
        let (addr, _store, dir) = serve_with(&[("loot.bin", b"secret bytes")]).await;

        let local = Arc::new(
            FileStore::new(dir.path().join("s2"), dir.path().join("d2"))
                .await
                .unwrap(),
        );
        let err = download_file(&addr, "loot.bin", "wrong", &local).await.unwrap_err();
        assert!(matches!(err, P2pError::Remote(_)));
        assert!(async_fs::metadata(local.download_path("loot.bin")).await.is_err());
    }

    #[tokio::test]
    async fn test_malformed_request_gets_error_reply() {
        let (addr, _store, _dir) = serve_with(&[]).await;

        let mut stream = TcpStream::connect(addr.to_string()).await.unwrap();
        stream.write_all(b"this is not json").await.unwrap();
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        assert!(reply.starts_with(ERROR_PREFIX.as_bytes()));
    }

    #[tokio::test]
    async fn test_interrupted_download_removes_partial_file() {
        // A hand-rolled server that streams some bytes and then an
        // error marker mid-stream.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = PeerAddress::new("127.0.0.1", listener.local_addr().unwrap().port());

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await.unwrap();
            stream.write_all(&[7u8; 1000]).await.unwrap();
            stream.flush().await.unwrap();
            // Let the first chunk arrive on its own before failing.
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = stream.write_all(b"ERROR: interrupted").await;
        });

        let dir = tempdir().unwrap();
        let local = FileStore::new(dir.path().join("s"), dir.path().join("d"))
            .await
            .unwrap();

        let err = download_file(&addr, "half.bin", SECRET, &local).await.unwrap_err();
        assert!(matches!(err, P2pError::Remote(_)));
        // The partially written destination must be gone.
        assert!(async_fs::metadata(local.download_path("half.bin")).await.is_err());
    }

    #[tokio::test]
    async fn test_liveness_probe() {
        let (addr, _store, _dir) = serve_with(&[]).await;
        assert!(is_node_alive(&addr).await);

        // A listener bound then dropped gives a port nothing accepts on.
        let closed = {
            let l = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            PeerAddress::new("127.0.0.1", l.local_addr().unwrap().port())
        };
        assert!(!is_node_alive(&closed).await);
    }
}
