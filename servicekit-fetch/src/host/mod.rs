//! Host APIs for servicekit transports.
//!
//! - [`http`] - Production HTTP transport (reqwest)
//! - [`keychain`] - Credential key-value storage (system keychain, memory)

pub mod http;
pub mod keychain;

// Re-export key types
pub use http::HttpTransport;
pub use keychain::{KeyValueStore, MemoryStore, SystemKeychain};
