use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::{debug, info};

use parley_shared::BackendError;

use crate::backend::BlobStore;

/// Resolve `key` below `base`, refusing anything that would escape it.
fn ensure_within(base: &Path, key: &str) -> Result<PathBuf, BackendError> {
    let mut resolved = base.to_path_buf();
    let mut pushed = false;
    for component in Path::new(key).components() {
        match component {
            Component::Normal(c) => {
                resolved.push(c);
                pushed = true;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(BackendError::Rejected(format!("invalid object key: {key}")));
            }
        }
    }
    if !pushed {
        return Err(BackendError::Rejected("empty object key".to_string()));
    }
    Ok(resolved)
}

/// Blob store on the local filesystem. Objects resolve to `file://` URLs.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    base_path: PathBuf,
    max_size: usize,
}

impl FsBlobStore {
    pub async fn new(base_path: PathBuf, max_size: usize) -> Result<Self, BackendError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            BackendError::Unavailable(format!(
                "Failed to create blob directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;
        let base_path = base_path.canonicalize().unwrap_or(base_path);

        info!(path = %base_path.display(), "Blob store initialized");

        Ok(Self {
            base_path,
            max_size,
        })
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put_object(&self, key: &str, data: Bytes) -> Result<(), BackendError> {
        if data.len() > self.max_size {
            return Err(BackendError::Rejected(format!(
                "object too large: {} bytes (max {})",
                data.len(),
                self.max_size
            )));
        }

        let path = ensure_within(&self.base_path, key)?;
        if path.exists() {
            return Err(BackendError::Rejected(format!("object already exists: {key}")));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                BackendError::Unavailable(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        fs::write(&path, &data)
            .await
            .map_err(|e| BackendError::Unavailable(format!("Failed to write object {key}: {e}")))?;

        debug!(key, size = data.len(), "Stored object");
        Ok(())
    }

    async fn download_url(&self, key: &str) -> Result<String, BackendError> {
        let path = ensure_within(&self.base_path, key)?;
        if !path.exists() {
            return Err(BackendError::NotFound(key.to_string()));
        }
        Ok(format!("file://{}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (FsBlobStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path().to_path_buf(), 1024).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_put_and_url() {
        let (store, _dir) = test_store().await;
        store
            .put_object("images/u1_1_cat.jpg", Bytes::from_static(b"jpeg"))
            .await
            .unwrap();

        let url = store.download_url("images/u1_1_cat.jpg").await.unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("images/u1_1_cat.jpg"));
        let stored = std::fs::read(url.trim_start_matches("file://")).unwrap();
        assert_eq!(stored, b"jpeg");
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let (store, _dir) = test_store().await;
        let result = store.put_object("../escape", Bytes::from_static(b"x")).await;
        assert!(matches!(result, Err(BackendError::Rejected(_))));
        assert!(store.put_object("/abs", Bytes::from_static(b"x")).await.is_err());
    }

    #[tokio::test]
    async fn test_too_large() {
        let (store, _dir) = test_store().await;
        let big = Bytes::from(vec![0u8; 2048]);
        assert!(store.put_object("big", big).await.is_err());
    }

    #[tokio::test]
    async fn test_no_overwrite() {
        let (store, dir) = test_store().await;
        store.put_object("k", Bytes::from_static(b"1")).await.unwrap();
        assert!(store.put_object("k", Bytes::from_static(b"2")).await.is_err());
        assert_eq!(std::fs::read(dir.path().join("k")).unwrap(), b"1");
    }

    #[tokio::test]
    async fn test_missing_url() {
        let (store, _dir) = test_store().await;
        assert!(matches!(
            store.download_url("nope").await,
            Err(BackendError::NotFound(_))
        ));
    }
}
