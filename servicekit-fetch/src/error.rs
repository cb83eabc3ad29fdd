//! Fetch error types.

use servicekit_core::ServiceFailure;
use thiserror::Error;

// ============================================================================
// Main Fetch Error
// ============================================================================

/// Error type for building and wiring fetch components.
///
/// Request outcomes are reported as [`ServiceFailure`]; this type covers the
/// plumbing around them.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP client could not be built.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Core error.
    #[error("Core error: {0}")]
    Core(#[from] servicekit_core::CoreError),

    /// Keychain error.
    #[error("Keychain error: {0}")]
    Keychain(#[from] KeychainError),

    /// Cache error.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Converts a reqwest failure into a transport failure.
///
/// Timeouts and connection errors are not distinguished from other
/// transport problems; the message carries the detail.
pub fn transport_failure(err: &reqwest::Error) -> ServiceFailure {
    let message = if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    };
    ServiceFailure::transport(message)
}

// ============================================================================
// Keychain Error
// ============================================================================

/// Error type for key-value store operations.
#[derive(Debug, Error)]
pub enum KeychainError {
    /// Access denied.
    #[error("Access denied to keychain")]
    AccessDenied,

    /// Keychain unavailable.
    #[error("Keychain unavailable: {0}")]
    Unavailable(String),

    /// Platform error.
    #[error("Platform error: {0}")]
    Platform(String),

    /// Generic error.
    #[error("Keychain error: {0}")]
    Other(String),
}

impl From<keyring::Error> for KeychainError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::Ambiguous(_) => {
                KeychainError::Other("Ambiguous credential entry".to_string())
            }
            keyring::Error::PlatformFailure(e) => KeychainError::Platform(e.to_string()),
            keyring::Error::NoStorageAccess(_) => KeychainError::AccessDenied,
            _ => KeychainError::Other(err.to_string()),
        }
    }
}

// ============================================================================
// Cache Error
// ============================================================================

/// Error type for cache storage operations.
///
/// The cache layer never surfaces these to callers; a failing store is
/// treated as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored entry is corrupt.
    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),

    /// Storage refused the entry.
    #[error("Cache storage denied: {0}")]
    Denied(String),
}
