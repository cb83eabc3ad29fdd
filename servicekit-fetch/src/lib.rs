// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # servicekit Fetch
//!
//! The request execution engine: everything between a built request and a
//! decoded JSON object.
//!
//! ## Transports
//!
//! - [`transport::Transport`] - executes one HTTP exchange
//! - [`host::http::HttpTransport`] - production transport (reqwest)
//! - [`stub::StubTransport`] - rule-driven transport for tests
//! - [`cache::CachedTransport`] - cache layer wrapping any transport
//!
//! ## Pagination
//!
//! - [`pagination::Paginator`] - follows `next` links and merges `results`
//!
//! ## Credentials
//!
//! - [`host::keychain::KeyValueStore`] - string key-value storage
//! - [`token::TokenManager`] - active token and identity-scoped copies
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use servicekit_fetch::{CachedTransport, HttpTransport, Paginator, TransportRequest};
//!
//! let http = Arc::new(HttpTransport::new()?);
//! let paginator = Paginator::new(Arc::new(CachedTransport::new(http)));
//! let merged = paginator
//!     .fetch(&TransportRequest::new(HttpMethod::Get, "https://api.example.com/items"), true)
//!     .await?;
//! ```

// Core modules
pub mod cache;
pub mod encoding;
pub mod error;
pub mod host;
pub mod pagination;
pub mod settings;
pub mod stub;
pub mod token;
pub mod transport;

// Re-export key types at crate root

// Errors
pub use error::{CacheError, FetchError, KeychainError};

// Host APIs
pub use host::{
    http::HttpTransport,
    keychain::{KeyValueStore, MemoryStore, SystemKeychain},
};

// Execution
pub use cache::{
    CacheEntry, CacheStore, CachedTransport, Clock, ManualClock, MemoryCacheStore, SystemClock,
    cache_key,
};
pub use pagination::{Paginator, decode_body};
pub use settings::TransportSettings;
pub use transport::{Transport, TransportRequest, TransportResponse};

// Tokens & stubs
pub use stub::{
    RecordedRequest, StubAuth, StubOutcome, StubRequest, StubRule, StubTiming, StubTransport,
    select_rule,
};
pub use token::TokenManager;
