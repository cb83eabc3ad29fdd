//! Account lookups.

use std::sync::Arc;

use servicekit_core::JsonObject;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::client::{ServiceClient, ServiceRequest};
use crate::descriptor::ServiceKind;
use crate::registry::{RegisteredService, ServiceInstance};

/// Account endpoints.
#[derive(Debug)]
pub struct AccountService {
    client: ServiceClient,
}

impl AccountService {
    /// Creates the service over `client`.
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }

    /// Returns the router.
    pub fn client(&self) -> &ServiceClient {
        &self.client
    }

    /// True when a token was captured for this generation.
    pub fn is_authenticated(&self) -> bool {
        self.client.is_authenticated()
    }

    /// Returns true if an account exists for `email`.
    ///
    /// Any failure counts as not found.
    #[instrument(skip(self, email))]
    pub async fn lookup_user(&self, email: &str) -> bool {
        let params = JsonObject::from_iter([("email".to_string(), Value::from(email))]);
        match self
            .client
            .request(ServiceRequest::get("account").parameters(params))
            .await
        {
            Ok(response) => !response.is_empty(),
            Err(failure) => {
                debug!(error = %failure, "Account lookup failed");
                false
            }
        }
    }
}

impl RegisteredService for AccountService {
    const KIND: ServiceKind = ServiceKind::Account;

    fn from_instance(instance: &ServiceInstance) -> Option<Arc<Self>> {
        match instance {
            ServiceInstance::Account(service) => Some(Arc::clone(service)),
            _ => None,
        }
    }
}
