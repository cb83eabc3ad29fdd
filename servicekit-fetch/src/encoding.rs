//! Request encoding.
//!
//! Turns a [`TransportRequest`] into the final URL and body bytes. Both the
//! HTTP transport and the cache key use this, so a cached entry is keyed by
//! exactly what would go over the wire.

use serde_json::Value;
use servicekit_core::{RequestBody, ServiceFailure};
use url::Url;

use crate::transport::TransportRequest;

/// Content type for JSON bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// The wire form of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedRequest {
    /// Final URL including any query string.
    pub url: String,
    /// Body bytes; empty when nothing is sent.
    pub body: Vec<u8>,
}

/// Encodes a request.
///
/// - Parameters on GET/HEAD/DELETE go into the query string, keys in order.
/// - Parameters on other methods become a JSON object body; an empty set
///   sends no body.
/// - Arrays are always a JSON array body.
/// - Text is sent verbatim.
pub fn encode(request: &TransportRequest) -> Result<EncodedRequest, ServiceFailure> {
    match &request.body {
        RequestBody::Parameters(params) if request.method.uses_query_encoding() => {
            if params.is_empty() {
                return Ok(EncodedRequest {
                    url: request.url.clone(),
                    body: Vec::new(),
                });
            }
            let mut url = Url::parse(&request.url).map_err(|e| {
                ServiceFailure::transport(format!("invalid URL `{}`: {e}", request.url))
            })?;
            {
                let mut pairs = url.query_pairs_mut();
                for (key, value) in params {
                    append_pairs(&mut pairs, key, value);
                }
            }
            Ok(EncodedRequest {
                url: url.into(),
                body: Vec::new(),
            })
        }
        RequestBody::Parameters(params) => {
            let body = if params.is_empty() {
                Vec::new()
            } else {
                serde_json::to_vec(params).map_err(|e| {
                    ServiceFailure::transport(format!("failed to encode parameters: {e}"))
                })?
            };
            Ok(EncodedRequest {
                url: request.url.clone(),
                body,
            })
        }
        RequestBody::Array(items) => {
            let body = serde_json::to_vec(items)
                .map_err(|e| ServiceFailure::transport(format!("failed to encode array: {e}")))?;
            Ok(EncodedRequest {
                url: request.url.clone(),
                body,
            })
        }
        RequestBody::Text(text) => Ok(EncodedRequest {
            url: request.url.clone(),
            body: text.as_bytes().to_vec(),
        }),
    }
}

/// Appends one parameter, flattening arrays as `key[]` and objects as `key[sub]`.
fn append_pairs(
    pairs: &mut url::form_urlencoded::Serializer<'_, url::UrlQuery<'_>>,
    key: &str,
    value: &Value,
) {
    match value {
        Value::Array(items) => {
            let key = format!("{key}[]");
            for item in items {
                append_pairs(pairs, &key, item);
            }
        }
        Value::Object(map) => {
            for (sub, item) in map {
                append_pairs(pairs, &format!("{key}[{sub}]"), item);
            }
        }
        Value::String(s) => {
            pairs.append_pair(key, s);
        }
        Value::Null => {
            pairs.append_pair(key, "");
        }
        other => {
            pairs.append_pair(key, &other.to_string());
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
