//! Content-addressed blob storage
//!
//! The engine only ever asks three things of storage: does a digest
//! exist, store bytes under a digest, fetch bytes by digest. Everything
//! else about persistence belongs to the surrounding service.

use crate::CaptureError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::debug;

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn exists(&self, digest: &str) -> Result<bool, CaptureError>;

    async fn put(
        &self,
        digest: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), CaptureError>;

    async fn get(&self, digest: &str) -> Result<Vec<u8>, CaptureError>;
}

/// One file per digest under a root directory
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, CaptureError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn blob_path(&self, digest: &str, content_type: &str) -> PathBuf {
        let extension = match content_type {
            "image/png" => "png",
            _ => "bin",
        };
        self.root.join(format!("{digest}.{extension}"))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn exists(&self, digest: &str) -> Result<bool, CaptureError> {
        let path = self.blob_path(digest, "image/png");
        Ok(tokio::fs::metadata(&path).await.is_ok())
    }

    async fn put(
        &self,
        digest: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), CaptureError> {
        let path = self.blob_path(digest, content_type);
        tokio::fs::write(&path, bytes).await?;
        debug!("Wrote blob {}", path.display());
        Ok(())
    }

    async fn get(&self, digest: &str) -> Result<Vec<u8>, CaptureError> {
        let path = self.blob_path(digest, "image/png");
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CaptureError::BlobNotFound(digest.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store for tests and dry runs
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn exists(&self, digest: &str) -> Result<bool, CaptureError> {
        Ok(self.objects.read().await.contains_key(digest))
    }

    async fn put(
        &self,
        digest: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<(), CaptureError> {
        self.objects
            .write()
            .await
            .insert(digest.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, digest: &str) -> Result<Vec<u8>, CaptureError> {
        self.objects
            .read()
            .await
            .get(digest)
            .cloned()
            .ok_or_else(|| CaptureError::BlobNotFound(digest.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fs_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).await.unwrap();

        assert!(!store.exists("abc123").await.unwrap());
        store.put("abc123", b"bytes", "image/png").await.unwrap();
        assert!(store.exists("abc123").await.unwrap());
        assert_eq!(store.get("abc123").await.unwrap(), b"bytes");
    }

    #[tokio::test]
    async fn test_fs_store_missing_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).await.unwrap();

        let err = store.get("deadbeef").await.unwrap_err();
        assert!(matches!(err, CaptureError::BlobNotFound(_)));
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryBlobStore::new();
        store.put("d1", b"one", "image/png").await.unwrap();
        assert!(store.exists("d1").await.unwrap());
        assert!(!store.exists("d2").await.unwrap());
        assert_eq!(store.get("d1").await.unwrap(), b"one");
        assert_eq!(store.len().await, 1);
    }
}
