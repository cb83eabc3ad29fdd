//! On-disk response cache.
//!
//! Each entry is one JSON file named after the SHA-256 of its key:
//!
//! ```json
//! {"key": "GET https://... <hash>", "payload": "<base64>", "stored_at": "...", "max_age_secs": 60}
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use ring::digest::{SHA256, digest};
use serde::{Deserialize, Serialize};
use servicekit_fetch::{CacheEntry, CacheError, CacheStore};
use tracing::debug;

use crate::error::StoreError;
use crate::persistence::{default_response_cache_dir, ensure_dir, load_json, save_json};

/// The file form of a [`CacheEntry`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    key: String,
    payload: String,
    stored_at: DateTime<Utc>,
    max_age_secs: u64,
}

impl From<&CacheEntry> for StoredEntry {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            key: entry.key.clone(),
            payload: STANDARD.encode(&entry.payload),
            stored_at: entry.stored_at,
            max_age_secs: entry.max_age_secs,
        }
    }
}

impl TryFrom<StoredEntry> for CacheEntry {
    type Error = StoreError;

    fn try_from(stored: StoredEntry) -> Result<Self, Self::Error> {
        let payload = STANDARD
            .decode(stored.payload.as_bytes())
            .map_err(|e| StoreError::Parse(format!("cache payload is not base64: {e}")))?;
        Ok(Self {
            key: stored.key,
            payload,
            stored_at: stored.stored_at,
            max_age_secs: stored.max_age_secs,
        })
    }
}

// ============================================================================
// File Cache Store
// ============================================================================

/// Cache store keeping one file per entry under a directory.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    /// Creates a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Creates a store in the platform cache directory.
    pub fn in_default_dir() -> Self {
        Self::new(default_response_cache_dir())
    }

    /// Returns the root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let hash = digest(&SHA256, key.as_bytes());
        let name: String = hash.as_ref().iter().map(|b| format!("{b:02x}")).collect();
        self.dir.join(format!("{name}.json"))
    }

    /// Removes every cached entry.
    pub async fn clear(&self) -> Result<(), StoreError> {
        if self.dir.exists() {
            tokio::fs::remove_dir_all(&self.dir).await?;
            debug!(dir = %self.dir.display(), "Response cache cleared");
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.path_for(key);
        let stored: StoredEntry = match load_json(&path).await {
            Ok(stored) => stored,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        // Hash collisions are treated as a miss.
        if stored.key != key {
            return Ok(None);
        }
        Ok(Some(CacheEntry::try_from(stored)?))
    }

    async fn put(&self, entry: CacheEntry) -> Result<(), CacheError> {
        ensure_dir(&self.dir).await?;
        let path = self.path_for(&entry.key);
        save_json(&path, &StoredEntry::from(&entry)).await?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use servicekit_core::{CachePolicy, HttpMethod, ServiceFailure};
    use servicekit_fetch::{CachedTransport, Transport, TransportRequest, TransportResponse};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn entry(key: &str, payload: &[u8]) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            payload: payload.to_vec(),
            stored_at: Utc::now(),
            max_age_secs: 60,
        }
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path().join("responses"));

        store.put(entry("GET https://a abc", b"{\"x\":1}")).await.unwrap();
        let loaded = store.get("GET https://a abc").await.unwrap().unwrap();

        assert_eq!(loaded.payload, b"{\"x\":1}");
        assert_eq!(loaded.max_age_secs, 60);
    }

    #[tokio::test]
    async fn test_missing_entry_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_payload() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());

        store.put(entry("k", b"old")).await.unwrap();
        store.put(entry("k", b"new")).await.unwrap();

        assert_eq!(store.get("k").await.unwrap().unwrap().payload, b"new");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());
        tokio::fs::write(store.path_for("k"), "garbage").await.unwrap();

        assert!(store.get("k").await.is_err());
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path().join("responses"));
        store.put(entry("k", b"v")).await.unwrap();

        store.clear().await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }

    struct Counter(AtomicUsize);

    #[async_trait]
    impl Transport for Counter {
        async fn send(
            &self,
            _request: &TransportRequest,
        ) -> Result<TransportResponse, ServiceFailure> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            Ok(TransportResponse::new(200, format!("[{n}]")))
        }

        fn name(&self) -> &'static str {
            "counter"
        }
    }

    #[tokio::test]
    async fn test_survives_new_transport_instance() {
        let dir = tempfile::tempdir().unwrap();
        let request = TransportRequest::new(HttpMethod::Get, "https://api.test/items")
            .with_cache_policy(CachePolicy::cache_else_network(Duration::from_secs(300)));

        let first_inner = Arc::new(Counter(AtomicUsize::new(0)));
        let first = CachedTransport::with_store(
            first_inner.clone(),
            Arc::new(FileCacheStore::new(dir.path())),
        );
        let body = first.send(&request).await.unwrap().body;

        let second_inner = Arc::new(Counter(AtomicUsize::new(100)));
        let second = CachedTransport::with_store(
            second_inner.clone(),
            Arc::new(FileCacheStore::new(dir.path())),
        );
        assert_eq!(second.send(&request).await.unwrap().body, body);
        assert_eq!(second_inner.0.load(Ordering::SeqCst), 100);
    }
}
