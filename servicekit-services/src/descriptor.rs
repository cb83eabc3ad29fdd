//! Service kinds and their static descriptors.

use serde::{Deserialize, Serialize};
use servicekit_core::ServiceDescriptor;

// ============================================================================
// Descriptors
// ============================================================================

const AUTHENTICATION: ServiceDescriptor = ServiceDescriptor {
    name: "authentication",
    base_path: "",
    version: "",
    requires_auth: false,
};

const ACCOUNT: ServiceDescriptor = ServiceDescriptor {
    name: "account",
    base_path: "",
    version: "v4",
    requires_auth: false,
};

const SEARCH: ServiceDescriptor = ServiceDescriptor {
    name: "search",
    base_path: "",
    version: "1.1",
    requires_auth: true,
};

// ============================================================================
// Service Kind
// ============================================================================

/// Every service the registry knows how to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// Sign in and out.
    Authentication,
    /// Account lookups.
    Account,
    /// Search.
    Search,
}

impl ServiceKind {
    /// Returns all kinds in declaration order.
    pub fn all() -> &'static [ServiceKind] {
        &[Self::Authentication, Self::Account, Self::Search]
    }

    /// Returns the static descriptor.
    pub fn descriptor(&self) -> &'static ServiceDescriptor {
        match self {
            Self::Authentication => &AUTHENTICATION,
            Self::Account => &ACCOUNT,
            Self::Search => &SEARCH,
        }
    }

    /// Returns the stable name.
    pub fn name(&self) -> &'static str {
        self.descriptor().name
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_kinds_have_unique_names() {
        let mut names: Vec<_> = ServiceKind::all().iter().map(ServiceKind::name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ServiceKind::all().len());
    }

    #[test]
    fn test_search_path() {
        let path = ServiceKind::Search.descriptor().full_path(
            "https://api.twitter.com",
            None,
            "search/tweets.json",
        );
        assert_eq!(path, "https://api.twitter.com/1.1/search/tweets.json");
    }

    #[test]
    fn test_authentication_has_no_version() {
        let path = ServiceKind::Authentication
            .descriptor()
            .full_path("https://api.twitter.com/", None, "oauth2/token");
        assert_eq!(path, "https://api.twitter.com/oauth2/token");
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&ServiceKind::Account).unwrap(),
            "\"account\""
        );
    }
}
