//! Token lifecycle on top of a [`KeyValueStore`].
//!
//! Key layout:
//!
//! ```text
//! servicekit.token.current               JSON-encoded active Token
//! servicekit.identity.<id>.access        access token for an account
//! servicekit.identity.<id>.refresh       refresh token for an account
//! ```
//!
//! The identity-scoped copies let several signed-in accounts coexist; the
//! active pointer decides which one requests are signed with.

use std::sync::Arc;

use servicekit_core::{JsonObject, Token, TokenSchema};
use tracing::{debug, warn};

use crate::error::KeychainError;
use crate::host::keychain::KeyValueStore;

/// Key holding the active token.
const CURRENT_KEY: &str = "servicekit.token.current";

/// Prefix for identity-scoped keys.
const IDENTITY_PREFIX: &str = "servicekit.identity.";

fn access_key(identity: &str) -> String {
    format!("{IDENTITY_PREFIX}{identity}.access")
}

fn refresh_key(identity: &str) -> String {
    format!("{IDENTITY_PREFIX}{identity}.refresh")
}

// ============================================================================
// Token Manager
// ============================================================================

/// Reads, stores, and clears the active token.
///
/// Cheap to clone; clones share the same backing store.
#[derive(Clone)]
pub struct TokenManager {
    store: Arc<dyn KeyValueStore>,
    schema: TokenSchema,
}

impl TokenManager {
    /// Creates a manager over `store` accepting responses that satisfy `schema`.
    pub fn new(store: Arc<dyn KeyValueStore>, schema: TokenSchema) -> Self {
        Self { store, schema }
    }

    /// Returns the schema token responses must satisfy.
    pub fn schema(&self) -> &TokenSchema {
        &self.schema
    }

    /// Returns the active token, if any.
    ///
    /// A store error or an unreadable record is logged and reported as no token.
    pub async fn current(&self) -> Option<Token> {
        let raw = match self.store.get(CURRENT_KEY).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "Failed to read current token");
                return None;
            }
        };

        match serde_json::from_str::<Token>(&raw) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(error = %e, "Stored token is unreadable");
                None
            }
        }
    }

    /// Returns true if an active token exists.
    pub async fn is_authenticated(&self) -> bool {
        self.current().await.is_some()
    }

    /// Accepts a token response and makes it the active token.
    ///
    /// Returns `None` without touching the store if the response lacks a
    /// required field. When an identity is given, identity-scoped copies are
    /// written as well.
    pub async fn store(&self, fields: &JsonObject, identity: Option<&str>) -> Option<Token> {
        let token = match Token::from_fields(fields, &self.schema, identity) {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Rejected token response");
                return None;
            }
        };

        match self.persist(&token).await {
            Ok(()) => {
                debug!(identity = ?token.identity, "Token stored");
                Some(token)
            }
            Err(e) => {
                warn!(error = %e, "Failed to persist token");
                None
            }
        }
    }

    /// Replaces the active token with `token`.
    pub async fn replace(&self, token: &Token) -> Result<(), KeychainError> {
        self.persist(token).await
    }

    /// Writes the active token first, then the identity copies. If a copy
    /// cannot be written, the previous active token is restored and the
    /// copies are removed, so a failed write never leaves part of a token.
    async fn persist(&self, token: &Token) -> Result<(), KeychainError> {
        let raw =
            serde_json::to_string(token).map_err(|e| KeychainError::Other(e.to_string()))?;
        let previous = self.store.get(CURRENT_KEY).await.ok().flatten();
        self.store.set(CURRENT_KEY, &raw).await?;

        let Some(identity) = &token.identity else {
            return Ok(());
        };
        if let Err(e) = self.write_identity_copies(identity, token).await {
            self.remove_identity_keys(identity).await;
            let restored = match &previous {
                Some(previous) => self.store.set(CURRENT_KEY, previous).await,
                None => self.store.remove(CURRENT_KEY).await,
            };
            if let Err(restore) = restored {
                warn!(error = %restore, "Failed to restore previous token");
            }
            return Err(e);
        }
        Ok(())
    }

    async fn write_identity_copies(
        &self,
        identity: &str,
        token: &Token,
    ) -> Result<(), KeychainError> {
        self.store
            .set(&access_key(identity), &token.access_token)
            .await?;
        if let Some(refresh) = &token.refresh_token {
            self.store.set(&refresh_key(identity), refresh).await?;
        }
        Ok(())
    }

    /// Removes the active token and, if it has an identity, that identity's copies.
    pub async fn clear(&self) {
        let identity = self.current().await.and_then(|t| t.identity);

        if let Err(e) = self.store.remove(CURRENT_KEY).await {
            warn!(error = %e, "Failed to remove current token");
        }
        if let Some(identity) = identity {
            self.remove_identity_keys(&identity).await;
        }
        debug!("Token cleared");
    }

    /// Removes one identity's copies; clears the active token too if it belongs to it.
    pub async fn clear_identity(&self, identity: &str) {
        let is_current = self
            .current()
            .await
            .and_then(|t| t.identity)
            .is_some_and(|id| id == identity);

        if is_current {
            self.clear().await;
        } else {
            self.remove_identity_keys(identity).await;
        }
    }

    async fn remove_identity_keys(&self, identity: &str) {
        for key in [access_key(identity), refresh_key(identity)] {
            if let Err(e) = self.store.remove(&key).await {
                warn!(key = %key, error = %e, "Failed to remove identity key");
            }
        }
    }

    /// Returns the stored access token for an identity.
    pub async fn access_token_for(&self, identity: &str) -> Option<String> {
        self.store.get(&access_key(identity)).await.ok().flatten()
    }

    /// Returns the stored refresh token for an identity.
    pub async fn refresh_token_for(&self, identity: &str) -> Option<String> {
        self.store.get(&refresh_key(identity)).await.ok().flatten()
    }

    /// Switches the active token to a previously stored identity.
    ///
    /// Returns the new active token, or `None` if nothing is stored for it.
    pub async fn set_current_token_for(&self, identity: &str) -> Option<Token> {
        let access = self.access_token_for(identity).await?;
        let mut token = Token::new(access).with_identity(identity);
        token.refresh_token = self.refresh_token_for(identity).await;

        match self.persist(&token).await {
            Ok(()) => Some(token),
            Err(e) => {
                warn!(error = %e, "Failed to switch active identity");
                None
            }
        }
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::keychain::MemoryStore;
    use async_trait::async_trait;
    use serde_json::{Value, json};

    /// Memory store that refuses writes to one key.
    struct DenyingStore {
        inner: MemoryStore,
        denied: String,
    }

    impl DenyingStore {
        fn new(denied: impl Into<String>) -> Self {
            Self {
                inner: MemoryStore::new(),
                denied: denied.into(),
            }
        }
    }

    #[async_trait]
    impl KeyValueStore for DenyingStore {
        async fn get(&self, key: &str) -> Result<Option<String>, KeychainError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), KeychainError> {
            if key == self.denied {
                return Err(KeychainError::AccessDenied);
            }
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), KeychainError> {
            self.inner.remove(key).await
        }
    }

    fn fields(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    fn oauth_response() -> JsonObject {
        fields(json!({
            "refresh_token": "R1",
            "token_type": "bearer",
            "access_token": "A1",
            "expires_in": 3600,
            "scope": "all"
        }))
    }

    #[tokio::test]
    async fn test_store_then_current_then_clear() {
        let tokens = TokenManager::new(Arc::new(MemoryStore::new()), TokenSchema::bearer());
        assert!(tokens.current().await.is_none());

        let stored = tokens
            .store(&fields(json!({"token_type": "access", "access_token": "KWALI"})), None)
            .await
            .unwrap();
        assert_eq!(stored.access_token, "KWALI");
        assert_eq!(tokens.current().await.unwrap().access_token, "KWALI");
        assert!(tokens.is_authenticated().await);

        tokens.clear().await;
        assert!(tokens.current().await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_response_never_persists() {
        let store = Arc::new(MemoryStore::new());
        let tokens = TokenManager::new(store.clone(), TokenSchema::oauth());

        let mut partial = oauth_response();
        partial.remove("scope");
        assert!(tokens.store(&partial, Some("ana@example.com")).await.is_none());
        assert!(store.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_identity_copies_written_and_cleared() {
        let store = Arc::new(MemoryStore::new());
        let tokens = TokenManager::new(store.clone(), TokenSchema::oauth());

        tokens
            .store(&oauth_response(), Some("ana@example.com"))
            .await
            .unwrap();
        assert_eq!(
            tokens.access_token_for("ana@example.com").await.as_deref(),
            Some("A1")
        );
        assert_eq!(
            tokens.refresh_token_for("ana@example.com").await.as_deref(),
            Some("R1")
        );

        tokens.clear().await;
        assert!(store.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_switch_between_identities() {
        let tokens = TokenManager::new(Arc::new(MemoryStore::new()), TokenSchema::oauth());
        tokens.store(&oauth_response(), Some("ana")).await.unwrap();

        let mut second = oauth_response();
        second.insert("access_token".into(), json!("A2"));
        tokens.store(&second, Some("bo")).await.unwrap();
        assert_eq!(tokens.current().await.unwrap().access_token, "A2");

        let switched = tokens.set_current_token_for("ana").await.unwrap();
        assert_eq!(switched.access_token, "A1");
        assert_eq!(tokens.current().await.unwrap().identity.as_deref(), Some("ana"));

        assert!(tokens.set_current_token_for("nobody").await.is_none());
    }

    #[tokio::test]
    async fn test_clear_identity_keeps_other_account_active() {
        let tokens = TokenManager::new(Arc::new(MemoryStore::new()), TokenSchema::oauth());
        tokens.store(&oauth_response(), Some("ana")).await.unwrap();
        let mut second = oauth_response();
        second.insert("access_token".into(), json!("A2"));
        tokens.store(&second, Some("bo")).await.unwrap();

        tokens.clear_identity("ana").await;
        assert!(tokens.access_token_for("ana").await.is_none());
        assert_eq!(tokens.current().await.unwrap().access_token, "A2");

        tokens.clear_identity("bo").await;
        assert!(tokens.current().await.is_none());
    }

    #[tokio::test]
    async fn test_unreadable_record_is_no_token() {
        let store = Arc::new(MemoryStore::new());
        store.set(CURRENT_KEY, "{not json").await.unwrap();
        let tokens = TokenManager::new(store, TokenSchema::bearer());
        assert!(tokens.current().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_current_write_leaves_nothing() {
        let store = Arc::new(DenyingStore::new(CURRENT_KEY));
        let tokens = TokenManager::new(store.clone(), TokenSchema::oauth());

        assert!(tokens.store(&oauth_response(), Some("ana")).await.is_none());
        assert!(tokens.access_token_for("ana").await.is_none());
        assert!(store.inner.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_identity_write_restores_previous_token() {
        let store = Arc::new(DenyingStore::new(refresh_key("bo")));
        let tokens = TokenManager::new(store.clone(), TokenSchema::oauth());
        tokens.store(&oauth_response(), Some("ana")).await.unwrap();

        let mut second = oauth_response();
        second.insert("access_token".into(), json!("A2"));
        assert!(tokens.store(&second, Some("bo")).await.is_none());

        assert_eq!(tokens.current().await.unwrap().access_token, "A1");
        assert!(tokens.access_token_for("bo").await.is_none());
        assert_eq!(tokens.access_token_for("ana").await.as_deref(), Some("A1"));
    }
}
