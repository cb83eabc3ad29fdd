//! Configuration resolution.
//!
//! A [`Configuration`] is assembled from two catalogs supplied by the host:
//!
//! - an [`EnvironmentCatalog`] mapping profile keys (`PRODUCTION`, `STAGING`,
//!   `CUSTOM`, ...) to base URLs
//! - an [`IdentityCatalog`] mapping application identifiers to API key/secret
//!
//! The profile is chosen in this order:
//!
//! 1. an explicit override set by the host
//! 2. the `SERVICEKIT_SERVER` environment variable
//! 3. the catalog's default (production)
//!
//! A custom base URL, if set, replaces whatever base URL the profile gives.
//! Resolving without both catalogs fails; an empty base URL is never produced.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use servicekit_core::{Configuration, CoreError};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::persistence::{load_json_or_default, save_json};

/// Environment variable naming the server profile.
pub const SERVER_ENV_VAR: &str = "SERVICEKIT_SERVER";

// ============================================================================
// Environments
// ============================================================================

/// One server profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Profile key, e.g. `PRODUCTION`.
    pub key: String,
    /// API base URL.
    pub base_url: String,
    /// Website base URL.
    pub web_url: String,
}

impl Environment {
    /// Creates a profile.
    pub fn new(
        key: impl Into<String>,
        base_url: impl Into<String>,
        web_url: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            base_url: base_url.into(),
            web_url: web_url.into(),
        }
    }

    /// Returns the display name: the key with only its first letter capitalized.
    pub fn display_name(&self) -> String {
        let lower = self.key.to_lowercase();
        let mut chars = lower.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

/// Source of server profiles.
pub trait EnvironmentCatalog: Send + Sync {
    /// Returns the profile for `key`, if known.
    fn profile(&self, key: &str) -> Option<Environment>;

    /// Returns the profile used when nothing selects one.
    fn default_profile(&self) -> Environment;
}

/// A fixed list of profiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticEnvironments {
    /// Known profiles.
    pub profiles: Vec<Environment>,
    /// Key of the default profile.
    pub default_key: String,
}

impl StaticEnvironments {
    /// Creates the usual three profiles: production (default), staging, and
    /// custom, which starts out pointing at production.
    pub fn standard(production: Environment, staging: Environment) -> Self {
        let custom = Environment {
            key: "CUSTOM".to_string(),
            ..production.clone()
        };
        Self {
            default_key: production.key.clone(),
            profiles: vec![production, staging, custom],
        }
    }
}

impl EnvironmentCatalog for StaticEnvironments {
    fn profile(&self, key: &str) -> Option<Environment> {
        self.profiles
            .iter()
            .find(|p| p.key.eq_ignore_ascii_case(key))
            .cloned()
    }

    fn default_profile(&self) -> Environment {
        self.profile(&self.default_key)
            .or_else(|| self.profiles.first().cloned())
            .unwrap_or_else(|| Environment::new(self.default_key.clone(), "", ""))
    }
}

// ============================================================================
// Identities
// ============================================================================

/// API credentials of one client application.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppIdentity {
    /// Application identifier (bundle or package id).
    pub app_id: String,
    /// API key.
    pub key: String,
    /// API secret.
    pub secret: String,
}

impl std::fmt::Debug for AppIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppIdentity")
            .field("app_id", &self.app_id)
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Source of application credentials.
pub trait IdentityCatalog: Send + Sync {
    /// Returns the identity registered for `app_id`, if any.
    fn identity_for(&self, app_id: &str) -> Option<AppIdentity>;

    /// Returns the identity used when nothing matches, if there is one.
    fn default_identity(&self) -> Option<AppIdentity>;
}

/// A fixed list of identities; the first one is the default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticIdentities {
    /// Known identities.
    pub identities: Vec<AppIdentity>,
}

impl IdentityCatalog for StaticIdentities {
    /// Matches the first identity whose registered id starts with `app_id`.
    fn identity_for(&self, app_id: &str) -> Option<AppIdentity> {
        if app_id.is_empty() {
            return None;
        }
        self.identities
            .iter()
            .find(|identity| identity.app_id.starts_with(app_id))
            .cloned()
    }

    fn default_identity(&self) -> Option<AppIdentity> {
        self.identities.first().cloned()
    }
}

// ============================================================================
// Host Settings
// ============================================================================

/// Host-persisted overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSettings {
    /// Selected profile key.
    #[serde(default)]
    pub server: Option<String>,
    /// Base URL replacing the profile's.
    #[serde(default)]
    pub custom_base_url: Option<String>,
}

impl HostSettings {
    /// Loads settings from `path`, or defaults if missing or unreadable.
    pub async fn load(path: &Path) -> Self {
        load_json_or_default(path).await
    }

    /// Saves settings to `path`.
    pub async fn save(&self, path: &Path) -> Result<(), StoreError> {
        save_json(path, self).await
    }
}

// ============================================================================
// Resolver
// ============================================================================

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Builds the [`Configuration`] for a registry generation.
#[derive(Clone)]
pub struct ConfigurationResolver {
    environments: Option<Arc<dyn EnvironmentCatalog>>,
    identities: Option<Arc<dyn IdentityCatalog>>,
    app_id: Option<String>,
    server_override: Option<String>,
    custom_base_url: Option<String>,
    env_lookup: EnvLookup,
}

impl ConfigurationResolver {
    /// Creates a resolver with no catalogs. [`resolve`](Self::resolve) fails
    /// until both are set.
    pub fn new() -> Self {
        Self {
            environments: None,
            identities: None,
            app_id: None,
            server_override: None,
            custom_base_url: None,
            env_lookup: Arc::new(|name| std::env::var(name).ok()),
        }
    }

    /// Sets the environment catalog.
    #[must_use]
    pub fn with_environments(mut self, catalog: Arc<dyn EnvironmentCatalog>) -> Self {
        self.environments = Some(catalog);
        self
    }

    /// Sets the identity catalog.
    #[must_use]
    pub fn with_identities(mut self, catalog: Arc<dyn IdentityCatalog>) -> Self {
        self.identities = Some(catalog);
        self
    }

    /// Sets the application identifier used to pick credentials.
    #[must_use]
    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    /// Forces a profile, taking precedence over the environment variable.
    #[must_use]
    pub fn with_server(mut self, key: impl Into<String>) -> Self {
        self.server_override = Some(key.into());
        self
    }

    /// Replaces the resolved base URL.
    #[must_use]
    pub fn with_custom_base_url(mut self, url: impl Into<String>) -> Self {
        self.custom_base_url = Some(url.into());
        self
    }

    /// Applies host-persisted overrides.
    #[must_use]
    pub fn with_host_settings(mut self, settings: &HostSettings) -> Self {
        if let Some(server) = &settings.server {
            self.server_override = Some(server.clone());
        }
        if let Some(url) = &settings.custom_base_url {
            self.custom_base_url = Some(url.clone());
        }
        self
    }

    /// Replaces how environment variables are read.
    #[must_use]
    pub fn with_env_lookup(
        mut self,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.env_lookup = Arc::new(lookup);
        self
    }

    /// Returns the profile that would be selected.
    pub fn current_environment(&self) -> Result<Environment, CoreError> {
        let catalog = self
            .environments
            .as_ref()
            .ok_or(CoreError::MissingEnvironment)?;

        let signal = self
            .server_override
            .clone()
            .or_else(|| (self.env_lookup)(SERVER_ENV_VAR))
            .filter(|key| !key.trim().is_empty());

        let Some(key) = signal else {
            return Ok(catalog.default_profile());
        };

        match catalog.profile(key.trim()) {
            Some(env) => Ok(env),
            None => {
                warn!(server = %key, "Unknown server profile, using default");
                Ok(catalog.default_profile())
            }
        }
    }

    /// Resolves the configuration.
    pub fn resolve(&self) -> Result<Configuration, CoreError> {
        let environment = self.current_environment()?;
        let identities = self
            .identities
            .as_ref()
            .ok_or(CoreError::MissingIdentity)?;

        let identity = self
            .app_id
            .as_deref()
            .and_then(|id| identities.identity_for(id))
            .or_else(|| identities.default_identity())
            .filter(|identity| !identity.key.is_empty())
            .ok_or(CoreError::MissingIdentity)?;

        let base_url = self
            .custom_base_url
            .clone()
            .filter(|url| !url.is_empty())
            .unwrap_or(environment.base_url);

        if base_url.is_empty() {
            return Err(CoreError::InvalidConfig(format!(
                "profile `{}` has no base URL",
                environment.key
            )));
        }

        debug!(
            server = %environment.key,
            base_url = %base_url,
            app_id = %identity.app_id,
            "Resolved configuration"
        );
        Ok(Configuration::new(
            base_url,
            environment.web_url,
            identity.key,
            identity.secret,
        ))
    }
}

impl Default for ConfigurationResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConfigurationResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationResolver")
            .field("has_environments", &self.environments.is_some())
            .field("has_identities", &self.identities.is_some())
            .field("app_id", &self.app_id)
            .field("server_override", &self.server_override)
            .field("custom_base_url", &self.custom_base_url)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn environments() -> Arc<StaticEnvironments> {
        Arc::new(StaticEnvironments::standard(
            Environment::new("PRODUCTION", "https://api.example.test", "https://example.test"),
            Environment::new(
                "STAGING",
                "https://staging.example.test/api",
                "https://staging.example.test",
            ),
        ))
    }

    fn identities() -> Arc<StaticIdentities> {
        Arc::new(StaticIdentities {
            identities: vec![
                AppIdentity {
                    app_id: "com.example.main".into(),
                    key: "main-key".into(),
                    secret: "main-secret".into(),
                },
                AppIdentity {
                    app_id: "com.example.Rocket".into(),
                    key: "rocket-key".into(),
                    secret: "rocket-secret".into(),
                },
            ],
        })
    }

    fn resolver() -> ConfigurationResolver {
        ConfigurationResolver::new()
            .with_environments(environments())
            .with_identities(identities())
            .with_env_lookup(|_| None)
    }

    #[test]
    fn test_missing_catalogs_fail_fast() {
        let err = ConfigurationResolver::new().resolve().unwrap_err();
        assert!(matches!(err, CoreError::MissingEnvironment));

        let err = ConfigurationResolver::new()
            .with_environments(environments())
            .resolve()
            .unwrap_err();
        assert!(matches!(err, CoreError::MissingIdentity));
    }

    #[test]
    fn test_empty_identity_catalog_fails_fast() {
        let err = ConfigurationResolver::new()
            .with_environments(environments())
            .with_identities(Arc::new(StaticIdentities {
                identities: Vec::new(),
            }))
            .with_env_lookup(|_| None)
            .resolve()
            .unwrap_err();
        assert!(matches!(err, CoreError::MissingIdentity));
    }

    #[test]
    fn test_identity_without_key_fails_fast() {
        let err = ConfigurationResolver::new()
            .with_environments(environments())
            .with_identities(Arc::new(StaticIdentities {
                identities: vec![AppIdentity {
                    app_id: "com.example.main".into(),
                    key: String::new(),
                    secret: "s".into(),
                }],
            }))
            .with_env_lookup(|_| None)
            .resolve()
            .unwrap_err();
        assert!(matches!(err, CoreError::MissingIdentity));
    }

    #[test]
    fn test_default_is_production() {
        let config = resolver().resolve().unwrap();
        assert_eq!(config.base_url, "https://api.example.test");
        assert_eq!(config.api_key, "main-key");
    }

    #[test]
    fn test_env_variable_selects_profile() {
        let config = resolver()
            .with_env_lookup(|name| (name == SERVER_ENV_VAR).then(|| "STAGING".to_string()))
            .resolve()
            .unwrap();
        assert_eq!(config.base_url, "https://staging.example.test/api");
    }

    #[test]
    fn test_override_beats_env_variable() {
        let config = resolver()
            .with_env_lookup(|_| Some("STAGING".to_string()))
            .with_server("PRODUCTION")
            .resolve()
            .unwrap();
        assert_eq!(config.base_url, "https://api.example.test");
    }

    #[test]
    fn test_unknown_profile_falls_back_to_default() {
        let env = resolver().with_server("MOON").current_environment().unwrap();
        assert_eq!(env.key, "PRODUCTION");
    }

    #[test]
    fn test_custom_base_url_replaces_profile_url() {
        let config = resolver()
            .with_host_settings(&HostSettings {
                server: Some("CUSTOM".into()),
                custom_base_url: Some("https://dev.example.test/".into()),
            })
            .resolve()
            .unwrap();
        assert_eq!(config.base_url, "https://dev.example.test");
        assert_eq!(config.web_url, "https://example.test");
    }

    #[test]
    fn test_identity_by_app_id_prefix() {
        let config = resolver().with_app_id("com.example.Rock").resolve().unwrap();
        assert_eq!(config.api_key, "rocket-key");

        let config = resolver().with_app_id("org.unknown").resolve().unwrap();
        assert_eq!(config.api_key, "main-key");
    }

    #[test]
    fn test_display_name() {
        assert_eq!(
            Environment::new("STAGING", "", "").display_name(),
            "Staging"
        );
    }

    #[test]
    fn test_empty_base_url_rejected() {
        let catalog = Arc::new(StaticEnvironments {
            profiles: vec![Environment::new("PRODUCTION", "", "")],
            default_key: "PRODUCTION".into(),
        });
        let err = ConfigurationResolver::new()
            .with_environments(catalog)
            .with_identities(identities())
            .with_env_lookup(|_| None)
            .resolve()
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
    }
}
