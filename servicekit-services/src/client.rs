//! Request router.
//!
//! A [`ServiceClient`] turns a logical call (`"search/tweets.json"` with some
//! parameters) into a full URL under its service's prefix and version,
//! attaches the bearer token captured for its registry generation and sends
//! it through the cache and pagination chain.

use std::sync::Arc;

use serde_json::Value;
use servicekit_core::{
    CachePolicy, Configuration, Headers, HttpMethod, JsonObject, RequestBody, ServiceFailure,
    Token,
};
use servicekit_fetch::encoding::JSON_CONTENT_TYPE;
use servicekit_fetch::{Paginator, TokenManager, Transport, TransportRequest};
use tracing::{debug, instrument, warn};

use crate::descriptor::ServiceKind;
use crate::registry::DelegateSlot;

/// `Authorization` header name.
pub const AUTHORIZATION: &str = "Authorization";
/// `Accept` header name.
pub const ACCEPT: &str = "Accept";
/// `Content-Type` header name.
pub const CONTENT_TYPE: &str = "Content-Type";

// ============================================================================
// Service Request
// ============================================================================

/// One logical call, relative to a service.
#[derive(Debug, Clone)]
pub struct ServiceRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Path below the service's prefix and version.
    pub path: String,
    /// Payload.
    pub body: RequestBody,
    /// Caller headers. These win over the defaults.
    pub headers: Headers,
    /// Cache directive.
    pub cache: CachePolicy,
    /// Follow `next` links and merge `results`.
    pub paginated: bool,
}

impl ServiceRequest {
    /// Creates a request with no parameters.
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: RequestBody::empty(),
            headers: Headers::new(),
            cache: CachePolicy::network_only(),
            paginated: false,
        }
    }

    /// GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    /// POST request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    /// PUT request.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    /// PATCH request.
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, path)
    }

    /// DELETE request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// Sets key/value parameters.
    pub fn parameters(mut self, parameters: JsonObject) -> Self {
        self.body = RequestBody::Parameters(parameters);
        self
    }

    /// Sets a JSON array payload.
    pub fn array(mut self, items: Vec<Value>) -> Self {
        self.body = RequestBody::Array(items);
        self
    }

    /// Sets a raw text payload.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.body = RequestBody::Text(text.into());
        self
    }

    /// Adds a caller header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the cache policy.
    pub fn cache(mut self, policy: CachePolicy) -> Self {
        self.cache = policy;
        self
    }

    /// Enables pagination merging.
    pub fn paginated(mut self) -> Self {
        self.paginated = true;
        self
    }
}

// ============================================================================
// Service Client
// ============================================================================

/// Routes calls for one service.
///
/// A client is bound to one registry generation: the configuration,
/// transport and token it captured stay fixed even if the registry is
/// reloaded while a call is in flight.
#[derive(Clone)]
pub struct ServiceClient {
    kind: ServiceKind,
    configuration: Arc<Configuration>,
    token: Option<Token>,
    tokens: TokenManager,
    transport: Arc<dyn Transport>,
    delegate: DelegateSlot,
    base_url: Option<String>,
    version: Option<String>,
}

impl ServiceClient {
    /// Creates a client without a delegate.
    pub fn new(
        kind: ServiceKind,
        configuration: Arc<Configuration>,
        token: Option<Token>,
        tokens: TokenManager,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            kind,
            configuration,
            token,
            tokens,
            transport,
            delegate: DelegateSlot::default(),
            base_url: None,
            version: None,
        }
    }

    pub(crate) fn with_delegate(mut self, delegate: DelegateSlot) -> Self {
        self.delegate = delegate;
        self
    }

    /// Uses `base_url` instead of the configured one.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Uses `version` instead of the descriptor's.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Returns the service kind.
    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    /// Returns the configuration of this generation.
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Returns the token store.
    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Returns the token captured when this client was built.
    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    /// True when a token was captured for this generation.
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Builds the absolute URL for `path`.
    pub fn url_for(&self, path: &str) -> String {
        let base = self
            .base_url
            .as_deref()
            .unwrap_or(&self.configuration.base_url);
        self.kind
            .descriptor()
            .full_path(base, self.version.as_deref(), path)
    }

    /// Caller headers, then defaults and bearer auth where the caller set none.
    fn headers_for(&self, caller: &Headers) -> Headers {
        let mut headers = caller.clone();
        headers.insert_if_absent(ACCEPT, JSON_CONTENT_TYPE);
        headers.insert_if_absent(CONTENT_TYPE, JSON_CONTENT_TYPE);
        if let Some(token) = &self.token {
            headers.insert_if_absent(AUTHORIZATION, token.authorization());
        }
        headers
    }

    /// The service expects a signed-in user, but neither a captured token nor
    /// an `Authorization` header is present.
    fn lacks_required_auth(&self, headers: &Headers) -> bool {
        self.kind.descriptor().requires_auth && !headers.contains(AUTHORIZATION)
    }

    /// Executes a call and returns the decoded (possibly merged) object.
    ///
    /// An empty body on a successful status decodes to an empty object.
    /// When a token expires while this client holds one (captured, or stored
    /// by the time the failure arrives), the registry delegate is told before
    /// the failure is returned.
    #[instrument(skip(self, request), fields(service = %self.kind, method = %request.method, path = %request.path))]
    pub async fn request(&self, request: ServiceRequest) -> Result<JsonObject, ServiceFailure> {
        let url = self.url_for(&request.path);
        let headers = self.headers_for(&request.headers);
        if self.lacks_required_auth(&headers) {
            warn!(
                service = %self.kind,
                "Sending unauthenticated request to a service that requires auth"
            );
        }
        let transport_request = TransportRequest::new(request.method, url)
            .with_body(request.body)
            .with_headers(headers)
            .with_cache_policy(request.cache);

        let result = Paginator::new(Arc::clone(&self.transport))
            .fetch(&transport_request, request.paginated)
            .await;

        match &result {
            Ok(object) => debug!(keys = object.len(), "Request succeeded"),
            Err(failure) => {
                debug!(error = %failure.error, "Request failed");
                if failure.has_token_expired() && self.believes_authenticated().await {
                    self.notify_token_expired();
                }
            }
        }
        result
    }

    /// Captured a token, or the store holds one after the call's side effects.
    async fn believes_authenticated(&self) -> bool {
        self.is_authenticated() || self.tokens.is_authenticated().await
    }

    fn notify_token_expired(&self) {
        let delegate = self
            .delegate
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        warn!(service = %self.kind, "Authentication token expired");
        if let Some(delegate) = delegate {
            delegate.authentication_token_did_expire(self.kind);
        }
    }
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("version", &self.version)
            .field("authenticated", &self.is_authenticated())
            .field("transport", &self.transport.name())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
