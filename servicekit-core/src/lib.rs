// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # servicekit Core
//!
//! Core types shared by every servicekit crate. Nothing here performs I/O.
//!
//! ## Key Types
//!
//! ### Request Model
//! - [`HttpMethod`] - HTTP verbs and their parameter encoding
//! - [`RequestBody`] - Parameters, array payloads, or verbatim text
//! - [`Headers`] - Case-insensitive header map
//! - [`CachePolicy`] / [`CacheMode`] - Per-request caching directive
//!
//! ### Credentials & Configuration
//! - [`Token`] - An accepted credential
//! - [`TokenSchema`] - Fields a token response must carry
//! - [`Configuration`] - Base URLs and application credentials
//! - [`ServiceDescriptor`] - Static path/version description of a service
//!
//! ### Errors
//! - [`ServiceError`] / [`ServiceFailure`] / [`ErrorDetails`] - Request outcomes
//! - [`CoreError`] - Configuration and model errors

pub mod error;
pub mod models;

// Re-export error types
pub use error::{CoreError, ErrorDetails, ServiceError, ServiceFailure};

// Re-export all model types
pub use models::{
    // Request model
    CacheMode,
    CachePolicy,
    Headers,
    HttpMethod,
    JsonObject,
    RequestBody,
    // Credentials & configuration
    Configuration,
    ServiceDescriptor,
    Token,
    TokenField,
    TokenSchema,
    join_segments,
};
