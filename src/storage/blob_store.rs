//! `BlobStore`: the key → blob persistence used for session strings, the session
//! lock, and the chat cache. Out of scope to *implement* against a real
//! object store, but this crate owns the trait boundary and ships two concrete
//! backends: a filesystem-backed one for real use, and an in-memory one for tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("blob io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Minimum surface a blob store must expose.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn exists(&self, key: &str) -> bool;
    async fn read(&self, key: &str) -> Result<String, BlobStoreError>;
    async fn write(&self, key: &str, contents: &str) -> Result<(), BlobStoreError>;
    async fn touch(&self, key: &str) -> Result<(), BlobStoreError>;
    async fn rm(&self, key: &str) -> Result<(), BlobStoreError>;
    /// Ordered list of keys matching a glob pattern (e.g. `"*.session"`).
    async fn glob(&self, pattern: &str) -> Result<Vec<String>, BlobStoreError>;
}

/// Filesystem-backed `BlobStore`: one file per key under `base_dir`.
pub struct FileBlobStore {
    base_dir: PathBuf,
}

impl FileBlobStore {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub async fn ensure_directory(&self) -> Result<(), BlobStoreError> {
        fs::create_dir_all(&self.base_dir).await?;
        debug!("Ensured blob store directory exists: {}", self.base_dir.display());
        Ok(())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base_dir.join(key)
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn exists(&self, key: &str) -> bool {
        fs::metadata(self.path_for(key)).await.is_ok()
    }

    async fn read(&self, key: &str) -> Result<String, BlobStoreError> {
        let path = self.path_for(key);
        fs::read_to_string(&path)
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    BlobStoreError::NotFound(key.to_string())
                } else {
                    BlobStoreError::Io(e)
                }
            })
    }

    async fn write(&self, key: &str, contents: &str) -> Result<(), BlobStoreError> {
        // Write-then-rename so a crash mid-write never leaves a torn session/cache blob.
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, contents).await?;
        fs::rename(&tmp_path, &path).await?;
        debug!("Wrote blob {} ({} bytes)", key, contents.len());
        Ok(())
    }

    async fn touch(&self, key: &str) -> Result<(), BlobStoreError> {
        if self.exists(key).await {
            return Ok(());
        }
        self.write(key, "").await
    }

    async fn rm(&self, key: &str) -> Result<(), BlobStoreError> {
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BlobStoreError::Io(e)),
        }
    }

    async fn glob(&self, pattern: &str) -> Result<Vec<String>, BlobStoreError> {
        let suffix = pattern.trim_start_matches('*');
        let mut read_dir = fs::read_dir(&self.base_dir).await?;
        let mut matches = Vec::new();

        while let Some(entry) = read_dir.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if name.ends_with(suffix) {
                    matches.push(name.to_string());
                }
            }
        }

        matches.sort();
        Ok(matches)
    }
}

/// In-memory `BlobStore`, used by the pool/scanner test suites so they never touch
/// the filesystem.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn exists(&self, key: &str) -> bool {
        self.inner.read().await.contains_key(key)
    }

    async fn read(&self, key: &str) -> Result<String, BlobStoreError> {
        self.inner
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound(key.to_string()))
    }

    async fn write(&self, key: &str, contents: &str) -> Result<(), BlobStoreError> {
        self.inner.write().await.insert(key.to_string(), contents.to_string());
        Ok(())
    }

    async fn touch(&self, key: &str) -> Result<(), BlobStoreError> {
        let mut guard = self.inner.write().await;
        guard.entry(key.to_string()).or_insert_with(String::new);
        Ok(())
    }

    async fn rm(&self, key: &str) -> Result<(), BlobStoreError> {
        self.inner.write().await.remove(key);
        Ok(())
    }

    async fn glob(&self, pattern: &str) -> Result<Vec<String>, BlobStoreError> {
        let suffix = pattern.trim_start_matches('*');
        let mut matches: Vec<String> = self
            .inner
            .read()
            .await
            .keys()
            .filter(|k| k.ends_with(suffix))
            .cloned()
            .collect();
        matches.sort();
        Ok(matches)
    }
}
