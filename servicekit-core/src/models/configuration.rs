//! Resolved connection configuration.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The endpoints and credentials one registry generation talks to.
///
/// Built once per generation and never mutated; a reload produces a new value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    /// API base URL, without a trailing slash.
    pub base_url: String,
    /// Website base URL.
    pub web_url: String,
    /// Application key.
    pub api_key: String,
    /// Application secret.
    pub api_secret: String,
}

impl Configuration {
    /// Creates a configuration, trimming trailing slashes from the URLs.
    pub fn new(
        base_url: impl Into<String>,
        web_url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            base_url: trim_slashes(base_url.into()),
            web_url: trim_slashes(web_url.into()),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Returns a copy with a different base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = trim_slashes(base_url.into());
        self
    }
}

fn trim_slashes(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("base_url", &self.base_url)
            .field("web_url", &self.web_url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}
