// crates/db/src/error.rs
// Repository error taxonomy. Each kind is raised once at the innermost site
// that can identify it and propagates unchanged to the handler boundary.

use thiserror::Error;

/// Errors surfaced by the session repository.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Referenced session/message/task does not exist or violates tenancy.
    #[error("not found")]
    NotFound,

    /// Malformed identifier, empty required field, invalid cursor.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Fork gate exceeded.
    #[error("session too large: {0}")]
    SessionTooLarge(String),

    /// Object-store call failed during fork.
    #[error("s3 operation failed: {0}")]
    S3OperationFailed(String),

    /// No message with a pending tool call in the session.
    #[error("no available tool call")]
    NoAvailable,

    /// Reserved for optimistic-concurrency failures.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Invariant violation or uncategorized storage error.
    #[error("internal: {0}")]
    Internal(String),

    /// The caller's cancellation token fired before commit.
    #[error("operation canceled")]
    Canceled,

    /// A configured deadline elapsed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias for repository results.
pub type DbResult<T> = Result<T, StoreError>;

/// Coarse classification for handler boundaries (HTTP status mapping lives
/// with the handlers, which only see kinds).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    SessionTooLarge,
    S3OperationFailed,
    NoAvailable,
    Conflict,
    Internal,
    Canceled,
    DeadlineExceeded,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound => ErrorKind::NotFound,
            StoreError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            StoreError::SessionTooLarge(_) => ErrorKind::SessionTooLarge,
            StoreError::S3OperationFailed(_) => ErrorKind::S3OperationFailed,
            StoreError::NoAvailable => ErrorKind::NoAvailable,
            StoreError::Conflict(_) => ErrorKind::Conflict,
            StoreError::Canceled => ErrorKind::Canceled,
            StoreError::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            // Raw storage/serialization failures fold into Internal at the
            // user boundary.
            StoreError::Internal(_) | StoreError::Database(_) | StoreError::Json(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<context_hub_blobstore::BlobError> for StoreError {
    fn from(err: context_hub_blobstore::BlobError) -> Self {
        StoreError::S3OperationFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_errors_fold_to_internal() {
        let err = StoreError::Database(sqlx::Error::PoolClosed);
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn taxonomy_kinds_are_stable() {
        assert_eq!(StoreError::NotFound.kind(), ErrorKind::NotFound);
        assert_eq!(StoreError::NoAvailable.kind(), ErrorKind::NoAvailable);
        assert_eq!(
            StoreError::invalid_argument("invalid cursor").kind(),
            ErrorKind::InvalidArgument
        );
    }
}
