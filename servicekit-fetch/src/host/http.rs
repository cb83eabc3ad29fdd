//! HTTP transport backed by reqwest.
//!
//! This is the production [`Transport`]:
//! - per-request timeout from [`TransportSettings`]
//! - status validation (`200..=299`)
//! - structured error details parsed from failing responses

use async_trait::async_trait;
use reqwest::{Client, Method};
use servicekit_core::{ErrorDetails, HttpMethod, ServiceError, ServiceFailure};
use tracing::{debug, instrument, warn};

use crate::encoding::encode;
use crate::error::{FetchError, transport_failure};
use crate::settings::TransportSettings;
use crate::transport::{Transport, TransportRequest, TransportResponse};

// ============================================================================
// HTTP Transport
// ============================================================================

/// Production transport executing requests with reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    inner: Client,
    settings: TransportSettings,
}

impl HttpTransport {
    /// Creates a transport with default settings.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_settings(TransportSettings::default())
    }

    /// Creates a transport with custom settings.
    pub fn with_settings(settings: TransportSettings) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .user_agent(settings.user_agent.as_str())
            .build()?;

        Ok(Self {
            inner: client,
            settings,
        })
    }

    /// Returns the settings this transport was built with.
    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Options => Method::OPTIONS,
        HttpMethod::Get => Method::GET,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Trace => Method::TRACE,
        HttpMethod::Connect => Method::CONNECT,
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, ServiceFailure> {
        let encoded = encode(request)?;
        debug!(url = %encoded.url, "Sending request");

        let mut builder = self.inner.request(method(request.method), &encoded.url);
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if !encoded.body.is_empty() {
            builder = builder.body(encoded.body);
        }

        let response = builder.send().await.map_err(|e| {
            warn!(error = %e, "Request failed");
            transport_failure(&e)
        })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_failure(&e))?
            .to_vec();
        debug!(status, bytes = body.len(), "Response received");

        if (200..=299).contains(&status) {
            return Ok(TransportResponse::new(status, body));
        }

        let details = ErrorDetails::from_bytes(&body, &encoded.url);
        warn!(status, "Response failed validation");
        Err(ServiceFailure::with_details(
            ServiceError::from_status(status),
            details,
        ))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_transport_keeps_settings() {
        let settings = TransportSettings::default().with_timeout(Duration::from_secs(2));
        let transport = HttpTransport::with_settings(settings.clone()).unwrap();
        assert_eq!(transport.settings(), &settings);
        assert_eq!(transport.name(), "http");
    }

    #[test]
    fn test_method_mapping() {
        assert_eq!(method(HttpMethod::Patch), Method::PATCH);
        assert_eq!(method(HttpMethod::Delete), Method::DELETE);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_failure() {
        let transport = HttpTransport::with_settings(
            TransportSettings::default().with_timeout(Duration::from_millis(500)),
        )
        .unwrap();
        // Port 9 (discard) on localhost is normally closed.
        let request = TransportRequest::new(HttpMethod::Get, "http://127.0.0.1:9/nothing");
        let failure = transport.send(&request).await.unwrap_err();
        assert!(failure.error.is_network_error());
        assert!(failure.details.is_none());
    }
}
