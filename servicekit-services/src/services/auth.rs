//! Sign-in and sign-out flows.
//!
//! Successful sign-ins persist the returned token; successful sign-outs clear
//! it and reload the registry so freshly looked-up services see the change.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use ring::digest::{SHA256, digest};
use serde_json::{Value, json};
use servicekit_core::JsonObject;
use tracing::{debug, info, instrument, warn};

use crate::client::{AUTHORIZATION, CONTENT_TYPE, ServiceClient, ServiceRequest};
use crate::descriptor::ServiceKind;
use crate::registry::{RegisteredService, RegistryHandle, ServiceInstance};

/// Content type of the client-credentials call.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded;charset=UTF-8";

const CLIENT_CREDENTIALS_BODY: &str = "grant_type=client_credentials";

/// Signs a password grant: SHA-256 hex of `secret%timestamp%email`, with the
/// email lowercased.
pub fn password_signature(secret: &str, timestamp: &str, email: &str) -> String {
    let input = format!("{secret}%{timestamp}%{}", email.to_lowercase());
    digest(&SHA256, input.as_bytes())
        .as_ref()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn percent_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

// ============================================================================
// Authentication Service
// ============================================================================

/// Authentication endpoints.
#[derive(Debug)]
pub struct AuthenticationService {
    client: ServiceClient,
    registry: RegistryHandle,
    device_identifier: String,
}

impl AuthenticationService {
    /// Creates the service.
    pub fn new(
        client: ServiceClient,
        registry: RegistryHandle,
        device_identifier: impl Into<String>,
    ) -> Self {
        Self {
            client,
            registry,
            device_identifier: device_identifier.into(),
        }
    }

    /// Returns the router.
    pub fn client(&self) -> &ServiceClient {
        &self.client
    }

    /// True when a token was captured for this generation.
    pub fn is_authenticated(&self) -> bool {
        self.client.is_authenticated()
    }

    /// Client-credentials grant with the configured key and secret.
    ///
    /// Returns true once a token has been stored.
    #[instrument(skip(self))]
    pub async fn authenticate_client(&self) -> bool {
        let configuration = self.client.configuration();
        let credentials = format!(
            "{}:{}",
            percent_encode(&configuration.api_key),
            percent_encode(&configuration.api_secret)
        );
        let request = ServiceRequest::post("oauth2/token")
            .text(CLIENT_CREDENTIALS_BODY)
            .header(AUTHORIZATION, format!("Basic {}", STANDARD.encode(credentials)))
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE);

        match self.client.request(request).await {
            Ok(response) => self.store_token(&response, None).await,
            Err(failure) => {
                debug!(error = %failure, "Client authentication failed");
                false
            }
        }
    }

    /// Password grant for `email`. The token is also kept under `email` so
    /// several accounts can stay signed in.
    #[instrument(skip(self, email, password))]
    pub async fn authenticate(&self, email: &str, password: &str) -> bool {
        let configuration = self.client.configuration();
        let timestamp = Utc::now().timestamp().to_string();
        let signature = password_signature(&configuration.api_secret, &timestamp, email);

        let params = object(json!({
            "username": email,
            "password": password,
            "grant_type": "password",
            "oauth": {
                "client_id": configuration.api_key,
                "timestamp": timestamp,
                "signature": signature,
            },
        }));

        match self
            .client
            .request(ServiceRequest::post("authenticate").parameters(params))
            .await
        {
            Ok(response) => self.store_token(&response, Some(email)).await,
            Err(failure) => {
                debug!(error = %failure, "Password authentication failed");
                false
            }
        }
    }

    /// Signs out the current user.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> bool {
        if !self.is_authenticated() {
            return false;
        }
        let request = ServiceRequest::post("logout").parameters(self.device_parameters());
        self.sign_out(request, None).await
    }

    /// Signs out using `access_token` instead of the captured token.
    #[instrument(skip(self, access_token))]
    pub async fn logout_with_access_token(&self, access_token: &str) -> bool {
        if !self.is_authenticated() {
            return false;
        }
        let request = ServiceRequest::post("logout")
            .parameters(self.device_parameters())
            .header(AUTHORIZATION, format!("Bearer {access_token}"));
        self.sign_out(request, None).await
    }

    /// Signs out the account stored under `email`.
    #[instrument(skip(self, email))]
    pub async fn logout_identity(&self, email: &str) -> bool {
        let Some(access_token) = self.client.tokens().access_token_for(email).await else {
            debug!("No token stored for identity");
            return false;
        };
        if !self.is_authenticated() {
            return false;
        }
        let request = ServiceRequest::post("logout")
            .parameters(self.device_parameters())
            .header(AUTHORIZATION, format!("Bearer {access_token}"));
        self.sign_out(request, Some(email)).await
    }

    /// Invalidates the current client token.
    #[instrument(skip(self))]
    pub async fn invalidate_token(&self) -> bool {
        if !self.is_authenticated() {
            return false;
        }
        let request = ServiceRequest::post("oauth2/invalidate_token").parameters(JsonObject::new());
        self.sign_out(request, None).await
    }

    fn device_parameters(&self) -> JsonObject {
        JsonObject::from_iter([(
            "device_identifier".to_string(),
            Value::from(self.device_identifier.as_str()),
        )])
    }

    async fn store_token(&self, response: &JsonObject, identity: Option<&str>) -> bool {
        let stored = self.client.tokens().store(response, identity).await.is_some();
        if stored {
            info!("Authenticated");
        } else {
            warn!("Authentication response did not contain a usable token");
        }
        stored
    }

    async fn sign_out(&self, request: ServiceRequest, identity: Option<&str>) -> bool {
        if let Err(failure) = self.client.request(request).await {
            debug!(error = %failure, "Sign-out failed");
            return false;
        }

        let tokens = self.client.tokens();
        if let Some(identity) = identity {
            tokens.clear_identity(identity).await;
        }
        tokens.clear().await;

        if let Err(e) = self.registry.reload().await {
            warn!(error = %e, "Failed to reload services after sign-out");
        }
        info!("Signed out");
        true
    }
}

impl RegisteredService for AuthenticationService {
    const KIND: ServiceKind = ServiceKind::Authentication;

    fn from_instance(instance: &ServiceInstance) -> Option<Arc<Self>> {
        match instance {
            ServiceInstance::Authentication(service) => Some(Arc::clone(service)),
            _ => None,
        }
    }
}

fn object(value: Value) -> JsonObject {
    match value {
        Value::Object(map) => map,
        _ => JsonObject::new(),
    }
}

// ============================================================================
// Tests
// ============================================================================
