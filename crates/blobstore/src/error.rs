//! Blob store error types.

use thiserror::Error;

/// Result type for blob store operations.
pub type BlobResult<T> = Result<T, BlobError>;

/// Errors that can occur against an object store backend.
#[derive(Debug, Error)]
pub enum BlobError {
    /// Object key does not exist in the bucket
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Backend rejected or failed the operation
    #[error("object store operation failed: {0}")]
    Backend(String),

    /// Lock was poisoned (another thread panicked while holding the lock)
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

impl BlobError {
    pub fn not_found(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}
