//! Request description types.
//!
//! These types describe a logical HTTP exchange independently of any
//! transport:
//! - [`HttpMethod`] - HTTP verbs
//! - [`RequestBody`] - parameters, array payloads, or verbatim text
//! - [`Headers`] - header map with case-insensitive helpers
//! - [`CachePolicy`] - per-request caching directive

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::JsonObject;

// ============================================================================
// HTTP Method
// ============================================================================

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// OPTIONS
    Options,
    /// GET
    #[default]
    Get,
    /// HEAD
    Head,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
    /// TRACE
    Trace,
    /// CONNECT
    Connect,
}

impl HttpMethod {
    /// Returns the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Options => "OPTIONS",
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Trace => "TRACE",
            Self::Connect => "CONNECT",
        }
    }

    /// Returns true if parameters for this method travel in the query string.
    pub fn uses_query_encoding(&self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Delete)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Request Body
// ============================================================================

/// The payload of a request.
///
/// `Parameters` are query-encoded for GET/HEAD/DELETE and JSON-encoded for
/// everything else. `Array` and `Text` mark payloads that bypass the
/// parameter encoding: an array is always sent as a JSON array body, text is
/// sent verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RequestBody {
    /// Key/value parameters.
    Parameters(JsonObject),
    /// A JSON array payload.
    Array(Vec<Value>),
    /// A verbatim text payload (for example a form-encoded body).
    Text(String),
}

impl RequestBody {
    /// Returns an empty parameter set.
    pub fn empty() -> Self {
        Self::Parameters(JsonObject::new())
    }

    /// Returns the parameters, if this body is a parameter set.
    pub fn parameters(&self) -> Option<&JsonObject> {
        match self {
            Self::Parameters(params) => Some(params),
            _ => None,
        }
    }

    /// Returns true if this is an empty parameter set.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Parameters(params) if params.is_empty())
    }
}

impl Default for RequestBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<JsonObject> for RequestBody {
    fn from(params: JsonObject) -> Self {
        Self::Parameters(params)
    }
}

// ============================================================================
// Headers
// ============================================================================

/// Request headers keyed by name.
///
/// Names keep the caller's casing; lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    /// Creates an empty header set.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Returns the value for `name`, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if a header named `name` exists, ignoring case.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Sets a header, replacing any existing header with the same name in any casing.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.0.retain(|k, _| !k.eq_ignore_ascii_case(&name));
        self.0.insert(name, value.into());
    }

    /// Sets a header only if no header with that name exists yet.
    pub fn insert_if_absent(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if !self.contains(&name) {
            self.0.insert(name, value.into());
        }
    }

    /// Overlays `other` onto this set; `other` wins on conflicts.
    pub fn merge(&mut self, other: &Headers) {
        for (name, value) in other.iter() {
            self.insert(name, value);
        }
    }

    /// Iterates over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of headers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

// ============================================================================
// Cache Policy
// ============================================================================

/// How a request may use the response cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Never read or write the cache.
    #[default]
    NetworkOnly,
    /// Serve a fresh cached payload, otherwise go to the network and store.
    CacheElseNetwork,
    /// Always go to the network and overwrite the cached payload on success.
    NetworkRevalidatingCache,
}

/// Per-request caching directive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    /// Cache mode.
    pub mode: CacheMode,
    /// How long a stored payload stays fresh.
    #[serde(with = "duration_secs")]
    pub max_age: Duration,
}

impl CachePolicy {
    /// Bypasses the cache.
    pub fn network_only() -> Self {
        Self::default()
    }

    /// Serves fresh cache entries, falling back to the network.
    pub fn cache_else_network(max_age: Duration) -> Self {
        Self {
            mode: CacheMode::CacheElseNetwork,
            max_age,
        }
    }

    /// Always hits the network and refreshes the cache.
    pub fn revalidating(max_age: Duration) -> Self {
        Self {
            mode: CacheMode::NetworkRevalidatingCache,
            max_age,
        }
    }

    /// Returns true if this policy touches the cache at all.
    pub fn uses_cache(&self) -> bool {
        self.mode != CacheMode::NetworkOnly
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

// ============================================================================
// Tests
// ============================================================================
