//! Error types for the storage layer
//!
//! Errors are classified by origin:
//! - Serialization: malformed persisted JSON (recovered with defaults)
//! - Local: filesystem key-value store failures
//! - Remote: document store read/write/create failures
//!
//! None of these are fatal to the application — callers log and continue,
//! leaving cache state untouched on failure.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Local store error: {0}")]
    Local(String),

    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("Remote document not found: {collection}/{id}")]
    DocumentNotFound { collection: String, id: String },
}

impl StorageError {
    /// Returns true if this error came from the remote document store.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            StorageError::Remote(_) | StorageError::DocumentNotFound { .. }
        )
    }

    /// Returns true if this error can be recovered by substituting defaults.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StorageError::Serialization(_))
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Local(err.to_string())
    }
}
