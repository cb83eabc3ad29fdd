//! File persistence helpers.
//!
//! JSON load/save with owner-only permissions, used for host settings and
//! the on-disk response cache.

use serde::{Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::StoreError;

const APP_DIR: &str = "servicekit";

// ============================================================================
// Default Paths
// ============================================================================

/// Host settings file in the platform config dir
/// (`~/Library/Application Support/servicekit/host.json`, `~/.config/servicekit/host.json`).
pub fn default_host_settings_path() -> PathBuf {
    app_dir(dirs::config_dir()).join("host.json")
}

/// Response cache directory in the platform cache dir
/// (`~/Library/Caches/servicekit/responses`, `~/.cache/servicekit/responses`).
pub fn default_response_cache_dir() -> PathBuf {
    app_dir(dirs::cache_dir()).join("responses")
}

fn app_dir(base: Option<PathBuf>) -> PathBuf {
    base.unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR)
}

// ============================================================================
// Permissions
// ============================================================================

/// Restricts `path` to its owner: 0o600 for files, 0o700 for directories.
#[cfg(unix)]
async fn restrict(path: &Path, mode: u32) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    debug!(path = %path.display(), mode = %format!("{mode:o}"), "Restricted permissions");
    Ok(())
}

#[cfg(not(unix))]
async fn restrict(_path: &Path, _mode: u32) -> Result<(), StoreError> {
    Ok(())
}

// ============================================================================
// File Operations
// ============================================================================

/// Writes `data` as pretty JSON through a temp file and rename, creating the
/// parent directory if needed. The file ends up owner-only.
pub async fn save_json<T: Serialize>(path: &Path, data: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent).await?;
    }

    let json = serde_json::to_string_pretty(data)?;
    let staging = path.with_extension("json.tmp");
    tokio::fs::write(&staging, json).await?;
    tokio::fs::rename(&staging, path).await?;
    restrict(path, 0o600).await?;

    debug!(path = %path.display(), "Saved JSON");
    Ok(())
}

/// Reads and decodes a JSON file.
pub async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

/// Like [`load_json`], but a missing or unreadable file yields `T::default()`.
/// Only errors other than "not found" are logged.
pub async fn load_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    load_json(path).await.unwrap_or_else(|e: StoreError| {
        if !e.is_not_found() {
            warn!(path = %path.display(), error = %e, "Failed to load, using defaults");
        }
        T::default()
    })
}

/// Creates `path` (owner-only) if it does not exist.
pub async fn ensure_dir(path: &Path) -> Result<(), StoreError> {
    if tokio::fs::try_exists(path).await? {
        return Ok(());
    }
    debug!(path = %path.display(), "Creating directory");
    tokio::fs::create_dir_all(path).await?;
    restrict(path, 0o700).await
}

// ============================================================================
// Tests
// ============================================================================
