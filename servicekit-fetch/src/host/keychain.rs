//! Key-value credential storage.
//!
//! Tokens are persisted through the [`KeyValueStore`] trait. Two
//! implementations ship here:
//! - [`SystemKeychain`] - the platform keychain via the `keyring` crate
//!   (macOS Keychain Services, Windows Credential Manager, Linux Secret Service)
//! - [`MemoryStore`] - an in-process map for tests and ephemeral sessions

use std::collections::HashMap;

use async_trait::async_trait;
use keyring::Entry;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::KeychainError;

/// Keychain service name under which every key is stored.
const SERVICE_NAME: &str = "servicekit";

// ============================================================================
// Key-Value Store Trait
// ============================================================================

/// A string key-value store for credentials.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the value for `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<String>, KeychainError>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<(), KeychainError>;

    /// Removes `key`. Removing an absent key succeeds.
    async fn remove(&self, key: &str) -> Result<(), KeychainError>;

    /// Check if a key exists.
    async fn contains(&self, key: &str) -> bool {
        matches!(self.get(key).await, Ok(Some(_)))
    }
}

// ============================================================================
// System Keychain Implementation
// ============================================================================

/// Store backed by the system keychain.
#[derive(Debug, Clone, Default)]
pub struct SystemKeychain;

impl SystemKeychain {
    /// Creates a new system keychain instance.
    pub fn new() -> Self {
        Self
    }

    /// Creates a keyring entry.
    fn entry(key: &str) -> Result<Entry, KeychainError> {
        Entry::new(SERVICE_NAME, key).map_err(|e| KeychainError::Platform(e.to_string()))
    }

    /// Runs a keyring call on the blocking pool. Platform keychains may wait
    /// on IPC or a user prompt.
    async fn with_entry<T, F>(
        key: &str,
        op: F,
    ) -> Result<Result<T, keyring::Error>, KeychainError>
    where
        T: Send + 'static,
        F: FnOnce(&Entry) -> Result<T, keyring::Error> + Send + 'static,
    {
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::entry(&key).map(|entry| op(&entry)))
            .await
            .map_err(|e| KeychainError::Other(format!("Task join error: {e}")))?
    }
}

#[async_trait]
impl KeyValueStore for SystemKeychain {
    async fn get(&self, key: &str) -> Result<Option<String>, KeychainError> {
        match Self::with_entry(key, Entry::get_password).await? {
            Ok(value) if value.is_empty() => Ok(None),
            Ok(value) => {
                debug!(key = %key, "Credential found");
                Ok(Some(value))
            }
            Err(keyring::Error::NoEntry) => {
                debug!(key = %key, "Credential not found");
                Ok(None)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to get credential");
                Err(e.into())
            }
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), KeychainError> {
        let value = value.to_string();
        Self::with_entry(key, move |entry| entry.set_password(&value))
            .await?
            .map_err(|e| {
                warn!(key = %key, error = %e, "Failed to set credential");
                KeychainError::from(e)
            })?;

        debug!(key = %key, "Credential stored");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), KeychainError> {
        match Self::with_entry(key, Entry::delete_credential).await? {
            Ok(()) | Err(keyring::Error::NoEntry) => {
                debug!(key = %key, "Credential removed");
                Ok(())
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to delete credential");
                Err(e.into())
            }
        }
    }
}

// ============================================================================
// Memory Store
// ============================================================================

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all stored keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KeychainError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), KeychainError> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), KeychainError> {
        self.values.write().await.remove(key);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
