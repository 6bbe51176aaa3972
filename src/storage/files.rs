use log::{debug, info};
use std::path::{Path, PathBuf};
use tokio::fs as async_fs;

use crate::utils::{P2pError, Result};

/// The two plain directories a peer persists: files it shares and files
/// it has downloaded. Entries are named exactly as shared/downloaded;
/// there is no manifest and no metadata.
pub struct FileStore {
    shared_dir: PathBuf,
    download_dir: PathBuf,
}

impl FileStore {
    pub async fn new(shared_dir: PathBuf, download_dir: PathBuf) -> Result<Self> {
        async_fs::create_dir_all(&shared_dir)
            .await
            .map_err(|e| P2pError::Io(format!("Failed to create {:?}: {}", shared_dir, e)))?;
        async_fs::create_dir_all(&download_dir)
            .await
            .map_err(|e| P2pError::Io(format!("Failed to create {:?}: {}", download_dir, e)))?;

        Ok(Self {
            shared_dir,
            download_dir,
        })
    }

    pub fn shared_path(&self, name: &str) -> PathBuf {
        self.shared_dir.join(name)
    }

    pub fn download_path(&self, name: &str) -> PathBuf {
        self.download_dir.join(name)
    }

    /// True if `name` is a plain file in the share directory. Names
    /// that would escape the directory are never present.
    pub async fn has_shared(&self, name: &str) -> bool {
        if name.is_empty() || name.contains('/') || name.contains('\\') {
            return false;
        }
        match async_fs::metadata(self.shared_path(name)).await {
            Ok(meta) => meta.is_file(),
            Err(_) => false,
        }
    }

    /// Copy the file at `path` into the share directory under its
    /// basename. Returns the shared name.
    pub async fn share_file(&self, path: &Path) -> Result<String> {
        let meta = async_fs::metadata(path)
            .await
            .map_err(|_| P2pError::FileNotFound(path.display().to_string()))?;
        if !meta.is_file() {
            return Err(P2pError::FileNotFound(path.display().to_string()));
        }

        let name = path
            .file_name()
            .ok_or_else(|| P2pError::FileNotFound(path.display().to_string()))?
            .to_string_lossy()
            .to_string();

        let dest = self.shared_path(&name);
        async_fs::copy(path, &dest)
            .await
            .map_err(|e| P2pError::Io(format!("Failed to copy {:?} to {:?}: {}", path, dest, e)))?;

        info!("Added '{}' to shared files", name);
        Ok(name)
    }

    pub async fn list_shared(&self) -> Result<Vec<String>> {
        Self::list_dir(&self.shared_dir).await
    }

    pub async fn list_downloads(&self) -> Result<Vec<String>> {
        Self::list_dir(&self.download_dir).await
    }

    async fn list_dir(dir: &Path) -> Result<Vec<String>> {
        let mut entries = async_fs::read_dir(dir)
            .await
            .map_err(|e| P2pError::Io(format!("Failed to read {:?}: {}", dir, e)))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| P2pError::Io(format!("Failed to read entry in {:?}: {}", dir, e)))?
        {
            if entry.path().is_file() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }

        names.sort();
        debug!("Listed {} files in {:?}", names.len(), dir);
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn store(dir: &tempfile::TempDir) -> FileStore {
        FileStore::new(dir.path().join("shared"), dir.path().join("downloads"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_share_file_copies_basename() {
        let dir = tempdir().unwrap();
        let store = store(&dir).await;

        let src = dir.path().join("subdir");
        async_fs::create_dir_all(&src).await.unwrap();
        let src = src.join("report.txt");
        async_fs::write(&src, b"hello").await.unwrap();

        let name = store.share_file(&src).await.unwrap();
        assert_eq!(name, "report.txt");
        assert!(store.has_shared("report.txt").await);
        assert_eq!(
            async_fs::read(store.shared_path("report.txt")).await.unwrap(),
            b"hello"
        );
    }

    #[tokio::test]
    async fn test_share_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let store = store(&dir).await;

        let err = store
            .share_file(Path::new("/no/such/file.bin"))
            .await
            .unwrap_err();
        assert!(matches!(err, P2pError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_listing_is_sorted() {
        let dir = tempdir().unwrap();
        let store = store(&dir).await;

        for name in ["b.txt", "a.txt", "c.txt"] {
            async_fs::write(store.shared_path(name), b"x").await.unwrap();
        }

        assert_eq!(store.list_shared().await.unwrap(), vec!["a.txt", "b.txt", "c.txt"]);
        assert!(store.list_downloads().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_path_escapes_are_never_shared() {
        let dir = tempdir().unwrap();
        let store = store(&dir).await;

        assert!(!store.has_shared("../secret").await);
        assert!(!store.has_shared("a/b").await);
        assert!(!store.has_shared("").await);
    }
}
