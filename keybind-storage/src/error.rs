//! Error types for the storage layer.

use std::time::Duration;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
///
/// Every variant is a backend failure, never a statement about the key:
/// callers must treat all of them as transient.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend unreachable, locked, or failed an I/O call.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The call did not finish within the configured bound.
    #[error("storage call timed out after {0:?}")]
    Timeout(Duration),

    /// Stored data could not be decoded into a record.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Unavailable(format!("database error: {e}"))
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Unavailable(format!("IO error: {e}"))
    }
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Unavailable(format!("storage task failed: {e}"))
    }
}
