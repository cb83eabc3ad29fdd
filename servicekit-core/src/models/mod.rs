//! Domain models for servicekit.
//!
//! ## Submodules
//!
//! - [`request`] - Request description (method, body, headers, cache policy)
//! - [`token`] - Credentials and token schemas
//! - [`configuration`] - Resolved endpoints and app credentials
//! - [`descriptor`] - Static service descriptors

mod configuration;
mod descriptor;
mod request;
mod token;

pub use configuration::Configuration;
pub use descriptor::{ServiceDescriptor, join_segments};
pub use request::{CacheMode, CachePolicy, Headers, HttpMethod, RequestBody};
pub use token::{Token, TokenField, TokenSchema};

/// A JSON object, the normalized shape of every decoded response.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

#[cfg(test)]
mod serde_tests;
