//! Pagination merging.
//!
//! A paginated response carries `results: [...]` and optionally
//! `next: "<absolute URL>"`. The [`Paginator`] follows `next` links strictly in
//! sequence and appends each page's results to the first page's object.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use servicekit_core::{JsonObject, ServiceFailure};
use tracing::{debug, instrument, warn};

use crate::transport::{Transport, TransportRequest};

/// Key holding a page's items.
pub const RESULTS_KEY: &str = "results";

/// Key holding the link to the following page.
pub const NEXT_KEY: &str = "next";

/// Decodes a response body into a JSON object.
///
/// - an empty body is `{}`
/// - a top-level array becomes `{"results": [...]}`
/// - any other valid JSON value that is not an object is `{}`
/// - invalid JSON is a transport failure
pub fn decode_body(body: &[u8]) -> Result<JsonObject, ServiceFailure> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(JsonObject::new());
    }

    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ServiceFailure::transport(format!("invalid JSON response: {e}")))?;

    Ok(match value {
        Value::Object(map) => map,
        Value::Array(items) => {
            let mut map = JsonObject::new();
            map.insert(RESULTS_KEY.to_string(), Value::Array(items));
            map
        }
        _ => JsonObject::new(),
    })
}

/// Returns the non-empty `next` link of a page.
pub fn next_link(page: &JsonObject) -> Option<&str> {
    page.get(NEXT_KEY)
        .and_then(Value::as_str)
        .filter(|link| !link.is_empty())
}

// ============================================================================
// Paginator
// ============================================================================

/// Fetches a request and, when asked to, every page after it.
#[derive(Clone)]
pub struct Paginator {
    transport: Arc<dyn Transport>,
}

impl Paginator {
    /// Creates a paginator over `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Executes `request` and returns the decoded (and possibly merged) object.
    ///
    /// Without `paginated`, the first page is returned as is, `next` and all.
    /// With it, follow-up pages are requested one after another and their
    /// `results` appended in order; the first page's other keys are kept. A
    /// failure on any page discards everything fetched so far.
    #[instrument(skip(self, request), fields(url = %request.url))]
    pub async fn fetch(
        &self,
        request: &TransportRequest,
        paginated: bool,
    ) -> Result<JsonObject, ServiceFailure> {
        let response = self.transport.send(request).await?;
        let mut merged = decode_body(&response.body)?;

        if !paginated {
            return Ok(merged);
        }

        let mut results = match merged.remove(RESULTS_KEY) {
            Some(Value::Array(items)) => items,
            Some(other) => {
                // Not a list; leave the first page untouched.
                merged.insert(RESULTS_KEY.to_string(), other);
                return Ok(merged);
            }
            None => Vec::new(),
        };

        let mut visited = HashSet::from([request.url.clone()]);
        let mut next = next_link(&merged).map(str::to_string);
        let mut pages = 1usize;

        while let Some(link) = next.take() {
            if !visited.insert(link.clone()) {
                warn!(link = %link, "Pagination loop detected, stopping");
                break;
            }

            debug!(page = pages + 1, link = %link, "Fetching next page");
            let response = self.transport.send(&request.follow(&link)).await?;
            if response.body.iter().all(u8::is_ascii_whitespace) {
                debug!(link = %link, "Empty page, stopping");
                break;
            }

            let page = decode_body(&response.body)?;
            if let Some(Value::Array(items)) = page.get(RESULTS_KEY) {
                results.extend(items.iter().cloned());
            }
            next = next_link(&page).map(str::to_string);
            pages += 1;
        }

        debug!(pages, total = results.len(), "Pagination complete");
        merged.insert(RESULTS_KEY.to_string(), Value::Array(results));
        Ok(merged)
    }
}

impl std::fmt::Debug for Paginator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Paginator")
            .field("transport", &self.transport.name())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportResponse;
    use async_trait::async_trait;
    use serde_json::json;
    use servicekit_core::{HttpMethod, RequestBody, ServiceError};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned bodies by URL and records the order of requests.
    struct PagedTransport {
        pages: HashMap<String, Result<String, u16>>,
        seen: Mutex<Vec<String>>,
        bodies: Mutex<Vec<RequestBody>>,
    }

    impl PagedTransport {
        fn new(pages: &[(&str, Result<Value, u16>)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(url, body)| {
                        let body = body.as_ref().map(Value::to_string).map_err(|c| *c);
                        ((*url).to_string(), body)
                    })
                    .collect(),
                seen: Mutex::new(Vec::new()),
                bodies: Mutex::new(Vec::new()),
            }
        }

        fn with_raw(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), Ok(body.to_string()));
            self
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for PagedTransport {
        async fn send(
            &self,
            request: &TransportRequest,
        ) -> Result<TransportResponse, ServiceFailure> {
            self.seen.lock().unwrap().push(request.url.clone());
            self.bodies.lock().unwrap().push(request.body.clone());
            match self.pages.get(&request.url) {
                Some(Ok(body)) => Ok(TransportResponse::new(200, body.clone())),
                Some(Err(code)) => Err(ServiceFailure::new(ServiceError::from_status(*code))),
                None => Err(ServiceFailure::new(ServiceError::BadRequest { code: 404 })),
            }
        }

        fn name(&self) -> &'static str {
            "paged"
        }
    }

    const P1: &str = "https://api.test/items";
    const P2: &str = "https://api.test/items?page=2";
    const P3: &str = "https://api.test/items?page=3";

    fn paginator(transport: &Arc<PagedTransport>) -> Paginator {
        Paginator::new(transport.clone())
    }

    // ========================================================================
    // Body Decoding
    // ========================================================================

    #[test]
    fn test_decode_empty_body_is_empty_object() {
        assert!(decode_body(b"").unwrap().is_empty());
        assert!(decode_body(b"  \n").unwrap().is_empty());
    }

    #[test]
    fn test_decode_array_wrapped_in_results() {
        let obj = decode_body(b"[1,2]").unwrap();
        assert_eq!(Value::Object(obj), json!({"results": [1, 2]}));
    }

    #[test]
    fn test_decode_scalar_and_invalid() {
        assert!(decode_body(b"true").unwrap().is_empty());
        assert!(decode_body(b"{oops").unwrap_err().error.is_network_error());
    }

    // ========================================================================
    // Merging
    // ========================================================================

    #[tokio::test]
    async fn test_merges_pages_in_order() {
        let transport = Arc::new(PagedTransport::new(&[
            (P1, Ok(json!({"count": 5, "next": P2, "results": [1, 2]}))),
            (P2, Ok(json!({"count": 5, "next": P3, "results": [3, 4]}))),
            (P3, Ok(json!({"count": 5, "next": "", "results": [5]}))),
        ]));
        let request = TransportRequest::new(HttpMethod::Get, P1);

        let merged = paginator(&transport).fetch(&request, true).await.unwrap();

        assert_eq!(merged["results"], json!([1, 2, 3, 4, 5]));
        assert_eq!(merged["count"], json!(5));
        assert_eq!(merged["next"], json!(P2));
        assert_eq!(transport.seen(), vec![P1, P2, P3]);
    }

    #[tokio::test]
    async fn test_not_paginated_ignores_next() {
        let transport = Arc::new(PagedTransport::new(&[(
            P1,
            Ok(json!({"next": P2, "results": [1]})),
        )]));
        let request = TransportRequest::new(HttpMethod::Get, P1);

        let page = paginator(&transport).fetch(&request, false).await.unwrap();

        assert_eq!(Value::Object(page), json!({"next": P2, "results": [1]}));
        assert_eq!(transport.seen(), vec![P1]);
    }

    #[tokio::test]
    async fn test_failure_mid_chain_discards_everything() {
        let transport = Arc::new(PagedTransport::new(&[
            (P1, Ok(json!({"next": P2, "results": [1]}))),
            (P2, Ok(json!({"next": P3, "results": [2]}))),
            (P3, Err(401)),
        ]));
        let request = TransportRequest::new(HttpMethod::Get, P1);

        let failure = paginator(&transport).fetch(&request, true).await.unwrap_err();
        assert!(failure.has_token_expired());
    }

    #[tokio::test]
    async fn test_empty_follow_up_page_terminates() {
        let transport = Arc::new(
            PagedTransport::new(&[(P1, Ok(json!({"next": P2, "results": [1]})))])
                .with_raw(P2, ""),
        );
        let request = TransportRequest::new(HttpMethod::Get, P1);

        let merged = paginator(&transport).fetch(&request, true).await.unwrap();
        assert_eq!(merged["results"], json!([1]));
    }

    #[tokio::test]
    async fn test_self_referencing_next_stops() {
        let transport = Arc::new(PagedTransport::new(&[
            (P1, Ok(json!({"next": P2, "results": [1]}))),
            (P2, Ok(json!({"next": P2, "results": [2]}))),
        ]));
        let request = TransportRequest::new(HttpMethod::Get, P1);

        let merged = paginator(&transport).fetch(&request, true).await.unwrap();
        assert_eq!(merged["results"], json!([1, 2]));
        assert_eq!(transport.seen().len(), 2);
    }

    #[tokio::test]
    async fn test_total_equals_sum_of_pages() {
        let sizes = [3usize, 0, 4, 1];
        let urls: Vec<String> = (0..sizes.len())
            .map(|i| format!("https://api.test/p?page={i}"))
            .collect();
        let pages: Vec<(String, Result<Value, u16>)> = sizes
            .iter()
            .enumerate()
            .map(|(i, &n)| {
                let next = urls.get(i + 1).cloned().map_or(Value::Null, Value::String);
                let results: Vec<Value> = (0..n).map(|k| json!(format!("{i}-{k}"))).collect();
                (urls[i].clone(), Ok(json!({"next": next, "results": results})))
            })
            .collect();
        let borrowed: Vec<(&str, Result<Value, u16>)> =
            pages.iter().map(|(u, b)| (u.as_str(), b.clone())).collect();
        let transport = Arc::new(PagedTransport::new(&borrowed));

        let request = TransportRequest::new(HttpMethod::Get, urls[0].clone());
        let merged = paginator(&transport).fetch(&request, true).await.unwrap();

        let items = merged["results"].as_array().unwrap();
        assert_eq!(items.len(), sizes.iter().sum::<usize>());
        assert_eq!(items.first(), Some(&json!("0-0")));
        assert_eq!(items.last(), Some(&json!("3-0")));
    }

    #[tokio::test]
    async fn test_post_follow_ups_resend_body() {
        let transport = Arc::new(PagedTransport::new(&[
            (P1, Ok(json!({"next": P2, "results": [1]}))),
            (P2, Ok(json!({"results": [2]}))),
        ]));
        let body = RequestBody::Parameters(json!({"filter": "x"}).as_object().cloned().unwrap());
        let request = TransportRequest::new(HttpMethod::Post, P1).with_body(body.clone());

        let merged = paginator(&transport).fetch(&request, true).await.unwrap();

        assert_eq!(merged["results"], json!([1, 2]));
        assert_eq!(*transport.bodies.lock().unwrap(), vec![body.clone(), body]);
    }

    #[tokio::test]
    async fn test_get_follow_ups_rely_on_link_query() {
        let transport = Arc::new(PagedTransport::new(&[
            (P1, Ok(json!({"next": P2, "results": [1]}))),
            (P2, Ok(json!({"results": [2]}))),
        ]));
        let body = RequestBody::Parameters(json!({"q": "a"}).as_object().cloned().unwrap());
        let request = TransportRequest::new(HttpMethod::Get, P1).with_body(body);

        paginator(&transport).fetch(&request, true).await.unwrap();

        assert!(transport.bodies.lock().unwrap()[1].is_empty());
    }
}
