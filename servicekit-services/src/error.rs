//! Registry errors.

use servicekit_core::CoreError;
use servicekit_fetch::FetchError;
use thiserror::Error;

/// Errors raised while (re)configuring a [`crate::ServiceRegistry`].
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No environment or identity could be resolved.
    #[error("Configuration error: {0}")]
    Configuration(#[from] CoreError),

    /// The HTTP transport could not be built.
    #[error("Transport error: {0}")]
    Transport(#[from] FetchError),

    /// A reload was requested before the registry was ever set.
    #[error("Registry is not configured")]
    NotConfigured,
}
