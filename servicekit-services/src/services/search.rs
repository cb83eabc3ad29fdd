//! Recent search.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use servicekit_core::{JsonObject, ServiceFailure};
use tracing::{debug, instrument};

use crate::client::{ServiceClient, ServiceRequest};
use crate::descriptor::ServiceKind;
use crate::registry::{RegisteredService, ServiceInstance};

const SEARCH_PATH: &str = "search/tweets.json";

/// Author of a search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchUser {
    /// Handle.
    #[serde(rename = "screen_name")]
    pub handle: String,
    /// Avatar URL.
    #[serde(rename = "profile_image_url_https")]
    pub image_url: String,
    /// Free-form location.
    #[serde(default)]
    pub location: String,
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Text of the post.
    pub text: String,
    /// Author.
    pub user: SearchUser,
}

/// Search endpoints.
#[derive(Debug)]
pub struct SearchService {
    client: ServiceClient,
    next_page: Mutex<Option<String>>,
}

impl SearchService {
    /// Creates the service over `client`.
    pub fn new(client: ServiceClient) -> Self {
        Self {
            client,
            next_page: Mutex::new(None),
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

    /// True if the last search reported another page.
    pub fn has_next_page(&self) -> bool {
        self.next_page
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Searches recent posts for `query`. An empty query yields nothing.
    #[instrument(skip(self))]
    pub async fn search_recent(&self, query: &str) -> Result<Vec<SearchResult>, ServiceFailure> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let params = JsonObject::from_iter([("q".to_string(), Value::from(query))]);
        self.run(ServiceRequest::get(SEARCH_PATH).parameters(params))
            .await
    }

    /// Continues the last search. Yields nothing when there is no next page.
    #[instrument(skip(self))]
    pub async fn search_next_page(&self) -> Result<Vec<SearchResult>, ServiceFailure> {
        let next = self
            .next_page
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(next) = next else {
            return Ok(Vec::new());
        };
        self.run(ServiceRequest::get(format!("{SEARCH_PATH}{next}")))
            .await
    }

    async fn run(&self, request: ServiceRequest) -> Result<Vec<SearchResult>, ServiceFailure> {
        let response = self.client.request(request).await?;

        let next = response
            .get("search_metadata")
            .and_then(|meta| meta.get("next_results"))
            .and_then(Value::as_str)
            .filter(|link| !link.is_empty())
            .map(str::to_string);
        *self.next_page.lock().unwrap_or_else(PoisonError::into_inner) = next;

        let results = parse_statuses(&response);
        debug!(count = results.len(), "Search complete");
        Ok(results)
    }
}

/// Decodes `statuses`, skipping entries that lack any required field.
fn parse_statuses(response: &JsonObject) -> Vec<SearchResult> {
    response
        .get("statuses")
        .and_then(Value::as_array)
        .map(|statuses| {
            statuses
                .iter()
                .filter_map(|status| SearchResult::deserialize(status).ok())
                .collect()
        })
        .unwrap_or_default()
}

impl RegisteredService for SearchService {
    const KIND: ServiceKind = ServiceKind::Search;

    fn from_instance(instance: &ServiceInstance) -> Option<Arc<Self>> {
        match instance {
            ServiceInstance::Search(service) => Some(Arc::clone(service)),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
