//! Error types for `servicekit`.
//!
//! Two families live here:
//!
//! - [`CoreError`] - configuration and model errors raised while wiring a
//!   registry together (missing catalogs, malformed token responses).
//! - [`ServiceError`] / [`ServiceFailure`] - the outcome taxonomy a caller
//!   receives when a service request fails.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::JsonObject;

// ============================================================================
// Core Error
// ============================================================================

/// Core error type for configuration and model operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No environment catalog was registered before resolving a configuration.
    #[error("No environment catalog registered; cannot resolve a base URL")]
    MissingEnvironment,

    /// No identity catalog was registered, or it holds no usable credentials.
    #[error("No API credentials available for this application")]
    MissingIdentity,

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A token response was missing required fields.
    #[error("Token response is missing required field `{0}`")]
    MissingTokenField(&'static str),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ============================================================================
// Service Error
// ============================================================================

/// The reason a service request failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The backend answered 401; the current token is no longer accepted.
    #[error("Token expired (HTTP {code})")]
    TokenExpired {
        /// HTTP status code.
        code: u16,
    },

    /// The backend answered with a non-2xx status other than 401.
    #[error("Request failed with HTTP {code}")]
    BadRequest {
        /// HTTP status code.
        code: u16,
    },

    /// Status validation failed and no usable status code was available.
    #[error("Response status could not be validated")]
    BadStatusCode,

    /// Connectivity, timeout, or serialization failure.
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// A stub transport received a request no rule answers.
    #[error("No stub rule matches {method} {path}")]
    UnmatchedStub {
        /// HTTP method of the unmatched request.
        method: String,
        /// Full path of the unmatched request.
        path: String,
    },

    /// A stub rule is malformed (for example, unusable token info).
    #[error("Invalid stub configuration: {0}")]
    InvalidStub(String),
}

impl ServiceError {
    /// Maps an HTTP status code onto the taxonomy.
    ///
    /// `401` is a token expiry, `0` means no usable status was observed, and
    /// everything else is a bad request carrying its code.
    pub fn from_status(code: u16) -> Self {
        match code {
            0 => Self::BadStatusCode,
            401 => Self::TokenExpired { code },
            _ => Self::BadRequest { code },
        }
    }

    /// Returns true if this error signals an expired token.
    pub fn has_token_expired(&self) -> bool {
        matches!(self, Self::TokenExpired { .. })
    }

    /// Returns the HTTP status code, if one was observed.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::TokenExpired { code } | Self::BadRequest { code } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if this is a connectivity problem rather than a response
    /// the backend produced.
    pub fn is_network_error(&self) -> bool {
        matches!(self, Self::TransportFailure(_))
    }

    /// Returns true if this error comes from test stub configuration.
    pub fn is_stub_error(&self) -> bool {
        matches!(self, Self::UnmatchedStub { .. } | Self::InvalidStub(_))
    }
}

// ============================================================================
// Error Details
// ============================================================================

/// Structured error information extracted from a failing response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Backend error type or label.
    pub error_type: String,
    /// Human-readable message.
    pub message: String,
    /// Raw response body, if it was readable as text.
    pub raw_body: Option<String>,
    /// Full path of the request that failed.
    pub path: Option<String>,
}

impl ErrorDetails {
    /// Creates error details.
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            raw_body: None,
            path: None,
        }
    }

    /// Attaches the raw body.
    pub fn with_raw_body(mut self, raw_body: impl Into<String>) -> Self {
        self.raw_body = Some(raw_body.into());
        self
    }

    /// Attaches the request path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Extracts details from a JSON error body.
    ///
    /// Two shapes are understood:
    ///
    /// ```text
    /// {"error": {"type": "...", "message": "..."}}
    /// {"errors": [{"label": "...", "message": "..."}, ...]}
    /// ```
    ///
    /// For the list shape only the first entry is used.
    pub fn from_json(body: &JsonObject) -> Option<Self> {
        if let Some(Value::Object(error)) = body.get("error") {
            let error_type = error.get("type").and_then(Value::as_str)?;
            let message = error.get("message").and_then(Value::as_str)?;
            return Some(Self::new(error_type, message));
        }

        let first = body.get("errors")?.as_array()?.first()?.as_object()?;
        let label = first.get("label").and_then(Value::as_str)?;
        let message = first.get("message").and_then(Value::as_str)?;
        Some(Self::new(label, message))
    }

    /// Extracts details from raw response bytes, keeping the text as the raw body.
    pub fn from_bytes(body: &[u8], path: &str) -> Option<Self> {
        let text = std::str::from_utf8(body).ok()?;
        let json: JsonObject = serde_json::from_str(text).ok()?;
        Self::from_json(&json).map(|d| d.with_raw_body(text).with_path(path))
    }
}

// ============================================================================
// Service Failure
// ============================================================================

/// A failed request: the error plus any details the backend supplied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error}")]
pub struct ServiceFailure {
    /// What went wrong.
    pub error: ServiceError,
    /// Structured details from the response body, when available.
    pub details: Option<ErrorDetails>,
}

impl ServiceFailure {
    /// Creates a failure without details.
    pub fn new(error: ServiceError) -> Self {
        Self {
            error,
            details: None,
        }
    }

    /// Creates a failure with details.
    pub fn with_details(error: ServiceError, details: Option<ErrorDetails>) -> Self {
        Self { error, details }
    }

    /// Shorthand for a transport failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ServiceError::TransportFailure(message.into()))
    }

    /// Returns true if the failure signals an expired token.
    pub fn has_token_expired(&self) -> bool {
        self.error.has_token_expired()
    }
}

impl From<ServiceError> for ServiceFailure {
    fn from(error: ServiceError) -> Self {
        Self::new(error)
    }
}

// ============================================================================
// Tests
// ============================================================================
