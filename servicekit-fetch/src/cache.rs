//! Response cache layer.
//!
//! [`CachedTransport`] wraps another [`Transport`] and honours each request's
//! [`CachePolicy`]:
//!
//! | Mode | Read | Network | Write |
//! |------|------|---------|-------|
//! | `NetworkOnly` | no | always | no |
//! | `CacheElseNetwork` | fresh entry wins | on miss | on success |
//! | `NetworkRevalidatingCache` | no | always | on success |
//!
//! An entry is fresh iff `now - stored_at <= max_age`. Stale entries are
//! ignored, never deleted; the next successful store overwrites them. A stale
//! entry is never served when the network fails.
//!
//! Storage problems are logged and treated as a miss.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use ring::digest::{SHA256, digest};
use serde::{Deserialize, Serialize};
use servicekit_core::{CacheMode, ServiceFailure};
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::encoding::encode;
use crate::error::CacheError;
use crate::transport::{Transport, TransportRequest, TransportResponse};

// ============================================================================
// Cache Entry
// ============================================================================

/// One stored response payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request identity (method, URL, body hash).
    pub key: String,
    /// Raw response body.
    pub payload: Vec<u8>,
    /// When the payload was stored.
    pub stored_at: DateTime<Utc>,
    /// Freshness window in seconds.
    pub max_age_secs: u64,
}

impl CacheEntry {
    /// Returns true if the entry is still fresh at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let max_age = i64::try_from(self.max_age_secs)
            .ok()
            .and_then(ChronoDuration::try_seconds)
            .unwrap_or(ChronoDuration::MAX);
        now.signed_duration_since(self.stored_at) <= max_age
    }
}

/// Computes the cache key for a request: `METHOD URL sha256(body)`.
///
/// URL and body are taken from the encoded request, so query parameters are
/// part of the key and each page of a paginated fetch gets its own entry.
pub fn cache_key(request: &TransportRequest) -> Result<String, ServiceFailure> {
    let encoded = encode(request)?;
    let hash = digest(&SHA256, &encoded.body);
    let mut hex = String::with_capacity(64);
    for byte in hash.as_ref() {
        let _ = write!(hex, "{byte:02x}");
    }
    Ok(format!("{} {} {hex}", request.method, encoded.url))
}

// ============================================================================
// Clock
// ============================================================================

/// Source of the current time for freshness checks.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: std::time::Duration) {
        let by = ChronoDuration::from_std(by).unwrap_or(ChronoDuration::MAX);
        let mut now = self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

// ============================================================================
// Cache Store
// ============================================================================

/// Storage for cache entries.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Loads the entry for `key`, fresh or not.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Stores `entry`, replacing any entry with the same key.
    async fn put(&self, entry: CacheEntry) -> Result<(), CacheError>;
}

/// In-memory cache store.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCacheStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, entry: CacheEntry) -> Result<(), CacheError> {
        self.entries.write().await.insert(entry.key.clone(), entry);
        Ok(())
    }
}

// ============================================================================
// Cached Transport
// ============================================================================

/// A transport that consults a [`CacheStore`] before the network.
pub struct CachedTransport {
    inner: Arc<dyn Transport>,
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
}

impl CachedTransport {
    /// Wraps `inner` with an in-memory cache and the system clock.
    pub fn new(inner: Arc<dyn Transport>) -> Self {
        Self::with_store(inner, Arc::new(MemoryCacheStore::new()))
    }

    /// Wraps `inner` with the given store.
    pub fn with_store(inner: Arc<dyn Transport>, store: Arc<dyn CacheStore>) -> Self {
        Self {
            inner,
            store,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the wrapped transport.
    pub fn inner(&self) -> &Arc<dyn Transport> {
        &self.inner
    }

    async fn lookup(&self, key: &str) -> Option<CacheEntry> {
        match self.store.get(key).await {
            Ok(Some(entry)) if entry.is_fresh(self.clock.now()) => Some(entry),
            Ok(Some(_)) => {
                debug!(key = %key, "Cache entry stale");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    async fn save(&self, key: String, response: &TransportResponse, max_age_secs: u64) {
        if !response.is_success() {
            return;
        }
        let entry = CacheEntry {
            key,
            payload: response.body.clone(),
            stored_at: self.clock.now(),
            max_age_secs,
        };
        let key = entry.key.clone();
        if let Err(e) = self.store.put(entry).await {
            warn!(key = %key, error = %e, "Cache write failed");
        } else {
            debug!(key = %key, "Cache entry stored");
        }
    }
}

#[async_trait]
impl Transport for CachedTransport {
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url, mode = ?request.cache_policy.mode))]
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, ServiceFailure> {
        let mode = request.cache_policy.mode;
        if mode == CacheMode::NetworkOnly {
            return self.inner.send(request).await;
        }

        let key = match cache_key(request) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "Cannot derive cache key, bypassing cache");
                return self.inner.send(request).await;
            }
        };

        if mode == CacheMode::CacheElseNetwork {
            if let Some(entry) = self.lookup(&key).await {
                debug!(key = %key, "Cache hit");
                return Ok(TransportResponse::new(200, entry.payload));
            }
            debug!(key = %key, "Cache miss");
        }

        let response = self.inner.send(request).await?;
        self.save(key, &response, request.cache_policy.max_age.as_secs())
            .await;
        Ok(response)
    }

    fn name(&self) -> &'static str {
        "cached"
    }
}

impl std::fmt::Debug for CachedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedTransport")
            .field("inner", &self.inner.name())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use servicekit_core::{CachePolicy, HttpMethod, RequestBody, ServiceError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers with a counter-stamped body, or fails when told to.
    struct CountingTransport {
        calls: AtomicUsize,
        fail: std::sync::atomic::AtomicBool,
    }

    impl CountingTransport {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: std::sync::atomic::AtomicBool::new(false),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn send(
            &self,
            _request: &TransportRequest,
        ) -> Result<TransportResponse, ServiceFailure> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail.load(Ordering::SeqCst) {
                return Err(ServiceFailure::transport("offline"));
            }
            Ok(TransportResponse::new(200, format!(r#"{{"n":{n}}}"#)))
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    /// A store whose every operation fails.
    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<CacheEntry>, CacheError> {
            Err(CacheError::Corrupt("bad bytes".into()))
        }

        async fn put(&self, _entry: CacheEntry) -> Result<(), CacheError> {
            Err(CacheError::Denied("read-only".into()))
        }
    }

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn request(policy: CachePolicy) -> TransportRequest {
        TransportRequest::new(HttpMethod::Get, "https://api.test/1.1/items").with_cache_policy(policy)
    }

    fn setup() -> (Arc<CountingTransport>, Arc<ManualClock>, CachedTransport) {
        let inner = Arc::new(CountingTransport::new());
        let clock = Arc::new(ManualClock::new(start()));
        let cached = CachedTransport::new(inner.clone()).with_clock(clock.clone());
        (inner, clock, cached)
    }

    // ========================================================================
    // Freshness
    // ========================================================================

    #[test]
    fn test_freshness_boundary_inclusive() {
        let entry = CacheEntry {
            key: "k".into(),
            payload: Vec::new(),
            stored_at: start(),
            max_age_secs: 60,
        };
        assert!(entry.is_fresh(start() + ChronoDuration::seconds(60)));
        assert!(!entry.is_fresh(start() + ChronoDuration::seconds(61)));
    }

    #[test]
    fn test_cache_key_includes_query_and_body_hash() {
        let params = serde_json::json!({"q": "x"}).as_object().cloned().unwrap();
        let get = TransportRequest::new(HttpMethod::Get, "https://api.test/s")
            .with_body(RequestBody::Parameters(params.clone()));
        let key = cache_key(&get).unwrap();
        assert!(key.starts_with("GET https://api.test/s?q=x "));
        // sha256 of the empty body
        assert!(key.ends_with("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"));

        let post = TransportRequest::new(HttpMethod::Post, "https://api.test/s")
            .with_body(RequestBody::Parameters(params));
        assert_ne!(cache_key(&post).unwrap(), key);
    }

    // ========================================================================
    // Modes
    // ========================================================================

    #[tokio::test]
    async fn test_network_only_never_caches() {
        let (inner, _clock, cached) = setup();
        let req = request(CachePolicy::network_only());
        cached.send(&req).await.unwrap();
        cached.send(&req).await.unwrap();
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn test_cache_else_network_hit_within_max_age() {
        let (inner, clock, cached) = setup();
        let req = request(CachePolicy::cache_else_network(Duration::from_secs(60)));

        let first = cached.send(&req).await.unwrap();
        clock.advance(Duration::from_secs(30));
        let second = cached.send(&req).await.unwrap();

        assert_eq!(inner.calls(), 1);
        assert_eq!(first.body, second.body);
    }

    #[tokio::test]
    async fn test_cache_else_network_refetches_when_stale() {
        let (inner, clock, cached) = setup();
        let req = request(CachePolicy::cache_else_network(Duration::from_secs(60)));

        cached.send(&req).await.unwrap();
        clock.advance(Duration::from_secs(61));
        let second = cached.send(&req).await.unwrap();

        assert_eq!(inner.calls(), 2);
        assert_eq!(second.body, br#"{"n":2}"#);
    }

    #[tokio::test]
    async fn test_stale_entry_not_served_on_failure() {
        let (inner, clock, cached) = setup();
        let req = request(CachePolicy::cache_else_network(Duration::from_secs(10)));

        cached.send(&req).await.unwrap();
        clock.advance(Duration::from_secs(11));
        inner.set_failing(true);

        let failure = cached.send(&req).await.unwrap_err();
        assert_eq!(failure.error, ServiceError::TransportFailure("offline".into()));
    }

    #[tokio::test]
    async fn test_revalidating_always_hits_network_and_refreshes() {
        let (inner, _clock, cached) = setup();
        let revalidate = request(CachePolicy::revalidating(Duration::from_secs(60)));
        let read = request(CachePolicy::cache_else_network(Duration::from_secs(60)));

        cached.send(&revalidate).await.unwrap();
        let latest = cached.send(&revalidate).await.unwrap();
        assert_eq!(inner.calls(), 2);

        let from_cache = cached.send(&read).await.unwrap();
        assert_eq!(inner.calls(), 2);
        assert_eq!(from_cache.body, latest.body);
    }

    #[tokio::test]
    async fn test_revalidating_failure_does_not_fall_back() {
        let (inner, _clock, cached) = setup();
        let req = request(CachePolicy::revalidating(Duration::from_secs(60)));
        cached.send(&req).await.unwrap();

        inner.set_failing(true);
        assert!(cached.send(&req).await.is_err());
    }

    #[tokio::test]
    async fn test_broken_store_degrades_to_network() {
        let inner = Arc::new(CountingTransport::new());
        let cached = CachedTransport::with_store(inner.clone(), Arc::new(BrokenStore));
        let req = request(CachePolicy::cache_else_network(Duration::from_secs(60)));

        assert!(cached.send(&req).await.is_ok());
        assert!(cached.send(&req).await.is_ok());
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_stores_last_write_wins() {
        let (inner, _clock, cached) = setup();
        let cached = Arc::new(cached);
        let req = request(CachePolicy::revalidating(Duration::from_secs(60)));

        let sends = (0..4).map(|_| {
            let cached = cached.clone();
            let req = req.clone();
            async move { cached.send(&req).await }
        });
        let results = futures::future::join_all(sends).await;
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(inner.calls(), 4);

        let read = request(CachePolicy::cache_else_network(Duration::from_secs(60)));
        let cached_body = cached.send(&read).await.unwrap().body;
        assert!(results.iter().any(|r| r.as_ref().unwrap().body == cached_body));
    }
}
