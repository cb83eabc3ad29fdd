// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # servicekit Store
//!
//! Configuration resolution and on-disk persistence.
//!
//! This crate provides:
//!
//! - **ConfigurationResolver**: picks base URLs and app credentials from
//!   host-supplied catalogs
//! - **FileCacheStore**: response cache entries persisted as files
//! - **Persistence**: JSON file helpers with owner-only permissions
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use servicekit_store::{ConfigurationResolver, HostSettings, default_host_settings_path};
//!
//! let host = HostSettings::load(&default_host_settings_path()).await;
//! let config = ConfigurationResolver::new()
//!     .with_environments(Arc::new(environments))
//!     .with_identities(Arc::new(identities))
//!     .with_host_settings(&host)
//!     .resolve()?;
//! ```

pub mod config;
pub mod error;
pub mod file_cache;
pub mod persistence;

pub use config::{
    AppIdentity, ConfigurationResolver, Environment, EnvironmentCatalog, HostSettings,
    IdentityCatalog, SERVER_ENV_VAR, StaticEnvironments, StaticIdentities,
};
pub use error::StoreError;
pub use file_cache::FileCacheStore;
pub use persistence::{
    default_host_settings_path, default_response_cache_dir, ensure_dir, load_json,
    load_json_or_default, save_json,
};
