//! Object-store seam for context-hub.
//!
//! The session repository only needs a narrow slice of an object store:
//! fetch a blob, write a blob, server-side copy between keys, list keys
//! under a prefix, and delete. Real deployments back this with S3; tests
//! use the in-memory implementation.

pub mod error;
pub mod memory;

pub use error::{BlobError, BlobResult};
pub use memory::MemoryBlobStore;

use async_trait::async_trait;
use uuid::Uuid;

/// Prefix under which message parts envelopes live.
pub const PARTS_PREFIX: &str = "parts";

/// Object key for a message's parts envelope:
/// `parts/<project_uuid>/<message_uuid>.json`.
pub fn parts_key(project_id: Uuid, message_id: Uuid) -> String {
    format!("{PARTS_PREFIX}/{project_id}/{message_id}.json")
}

/// Key prefix covering every parts envelope of a project.
pub fn parts_prefix(project_id: Uuid) -> String {
    format!("{PARTS_PREFIX}/{project_id}/")
}

/// A keyed binary blob store.
///
/// `copy` must be a server-side operation: the bytes never transit the
/// caller. All methods are cancel-safe; dropping the future leaves the
/// store in a consistent state (a dropped `put`/`copy` either happened or
/// didn't).
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch a blob's bytes.
    async fn get(&self, bucket: &str, key: &str) -> BlobResult<Vec<u8>>;

    /// Write a blob, overwriting any existing object at the key.
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>, mime: &str) -> BlobResult<()>;

    /// Server-side copy within a bucket.
    async fn copy(&self, bucket: &str, src_key: &str, dst_key: &str) -> BlobResult<()>;

    /// List keys under a prefix.
    async fn list(&self, bucket: &str, prefix: &str) -> BlobResult<Vec<String>>;

    /// Delete a blob. Deleting a missing key is not an error.
    async fn delete(&self, bucket: &str, key: &str) -> BlobResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_key_layout() {
        let project = Uuid::nil();
        let message = Uuid::nil();
        assert_eq!(
            parts_key(project, message),
            "parts/00000000-0000-0000-0000-000000000000/00000000-0000-0000-0000-000000000000.json"
        );
        assert!(parts_key(project, message).starts_with(&parts_prefix(project)));
    }
}
