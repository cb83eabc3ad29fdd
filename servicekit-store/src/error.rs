//! Store error types.

use servicekit_fetch::CacheError;
use thiserror::Error;

/// Errors that can occur in the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stored data could not be decoded.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl StoreError {
    /// Returns true if the error means the file simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

impl From<StoreError> for CacheError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Io(e) => CacheError::Io(e),
            StoreError::Serialization(e) => CacheError::Serialization(e),
            StoreError::Config(msg) => CacheError::Denied(msg),
            StoreError::Parse(msg) => CacheError::Corrupt(msg),
        }
    }
}
