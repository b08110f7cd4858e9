//! In-memory blob store implementation for testing.

use crate::{BlobError, BlobResult, BlobStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Clone)]
struct Blob {
    bytes: Vec<u8>,
    #[allow(dead_code)]
    mime: String,
}

/// In-memory blob store.
///
/// Stores everything in a process-local map; not persistent. `copy` clones
/// the stored bytes, mirroring a server-side copy.
#[derive(Default)]
pub struct MemoryBlobStore {
    data: RwLock<HashMap<(String, String), Blob>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects across all buckets.
    pub fn len(&self) -> usize {
        self.data.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, bucket: &str, key: &str) -> BlobResult<Vec<u8>> {
        let data = self
            .data
            .read()
            .map_err(|e| BlobError::LockPoisoned(e.to_string()))?;
        data.get(&(bucket.to_string(), key.to_string()))
            .map(|blob| blob.bytes.clone())
            .ok_or_else(|| BlobError::not_found(bucket, key))
    }

    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>, mime: &str) -> BlobResult<()> {
        let mut data = self
            .data
            .write()
            .map_err(|e| BlobError::LockPoisoned(e.to_string()))?;
        data.insert(
            (bucket.to_string(), key.to_string()),
            Blob {
                bytes,
                mime: mime.to_string(),
            },
        );
        Ok(())
    }

    async fn copy(&self, bucket: &str, src_key: &str, dst_key: &str) -> BlobResult<()> {
        let mut data = self
            .data
            .write()
            .map_err(|e| BlobError::LockPoisoned(e.to_string()))?;
        let blob = data
            .get(&(bucket.to_string(), src_key.to_string()))
            .cloned()
            .ok_or_else(|| BlobError::not_found(bucket, src_key))?;
        data.insert((bucket.to_string(), dst_key.to_string()), blob);
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> BlobResult<Vec<String>> {
        let data = self
            .data
            .read()
            .map_err(|e| BlobError::LockPoisoned(e.to_string()))?;
        let mut keys: Vec<String> = data
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, bucket: &str, key: &str) -> BlobResult<()> {
        let mut data = self
            .data
            .write()
            .map_err(|e| BlobError::LockPoisoned(e.to_string()))?;
        data.remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryBlobStore::new();

        store
            .put("ctx", "parts/a.json", b"[1,2]".to_vec(), "application/json")
            .await
            .unwrap();
        assert_eq!(store.get("ctx", "parts/a.json").await.unwrap(), b"[1,2]");

        store.delete("ctx", "parts/a.json").await.unwrap();
        assert!(matches!(
            store.get("ctx", "parts/a.json").await,
            Err(BlobError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_copy_is_independent() {
        let store = MemoryBlobStore::new();
        store
            .put("ctx", "src", b"original".to_vec(), "application/json")
            .await
            .unwrap();

        store.copy("ctx", "src", "dst").await.unwrap();
        assert_eq!(store.get("ctx", "dst").await.unwrap(), b"original");

        // Overwriting the source leaves the copy untouched
        store
            .put("ctx", "src", b"changed".to_vec(), "application/json")
            .await
            .unwrap();
        assert_eq!(store.get("ctx", "dst").await.unwrap(), b"original");
    }

    #[tokio::test]
    async fn test_copy_missing_source() {
        let store = MemoryBlobStore::new();
        assert!(matches!(
            store.copy("ctx", "nope", "dst").await,
            Err(BlobError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_filters_by_bucket_and_prefix() {
        let store = MemoryBlobStore::new();
        for key in ["parts/p1/a.json", "parts/p1/b.json", "parts/p2/c.json"] {
            store
                .put("ctx", key, b"{}".to_vec(), "application/json")
                .await
                .unwrap();
        }
        store
            .put("other", "parts/p1/d.json", b"{}".to_vec(), "application/json")
            .await
            .unwrap();

        let keys = store.list("ctx", "parts/p1/").await.unwrap();
        assert_eq!(keys, vec!["parts/p1/a.json", "parts/p1/b.json"]);
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let store = MemoryBlobStore::new();
        store.delete("ctx", "absent").await.unwrap();
    }
}
