//! The transport abstraction.
//!
//! A [`Transport`] executes exactly one HTTP exchange. Real and stubbed
//! transports are interchangeable behind this trait, and the cache layer is
//! itself a transport wrapping another one.

use async_trait::async_trait;
use servicekit_core::{CachePolicy, Headers, HttpMethod, RequestBody, ServiceFailure};

// ============================================================================
// Transport Request
// ============================================================================

/// One outgoing HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Fully resolved URL. Query parameters from `body` are appended at
    /// encoding time for query-encoded methods.
    pub url: String,
    /// Payload.
    pub body: RequestBody,
    /// Headers, already merged with defaults.
    pub headers: Headers,
    /// How the cache layer may answer this request.
    pub cache_policy: CachePolicy,
}

impl TransportRequest {
    /// Creates a request with no body, headers, or caching.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            body: RequestBody::empty(),
            headers: Headers::new(),
            cache_policy: CachePolicy::network_only(),
        }
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Sets the headers.
    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the cache policy.
    #[must_use]
    pub fn with_cache_policy(mut self, cache_policy: CachePolicy) -> Self {
        self.cache_policy = cache_policy;
        self
    }

    /// Derives the request for a follow-up page.
    ///
    /// The link is used verbatim. For query-encoded methods the link already
    /// carries the query, so the parameters are dropped; other methods keep
    /// their body.
    pub fn follow(&self, url: impl Into<String>) -> Self {
        let body = if self.method.uses_query_encoding() {
            RequestBody::empty()
        } else {
            self.body.clone()
        };
        Self {
            method: self.method,
            url: url.into(),
            body,
            headers: self.headers.clone(),
            cache_policy: self.cache_policy,
        }
    }
}

// ============================================================================
// Transport Response
// ============================================================================

/// A successful (2xx) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw body bytes.
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true if the status is in `200..=299`.
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }
}

// ============================================================================
// Transport Trait
// ============================================================================

/// Executes one HTTP exchange.
///
/// Implementations return `Ok` only for responses whose status passed
/// validation (2xx). Everything else, including non-2xx responses, comes
/// back as a [`ServiceFailure`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends the request.
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, ServiceFailure>;

    /// Short name for logging.
    fn name(&self) -> &'static str;
}
