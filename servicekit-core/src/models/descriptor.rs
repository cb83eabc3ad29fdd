//! Static service descriptors.

use serde::Serialize;

/// Static description of one API surface.
///
/// The effective request path is
/// `base + "/" + base_path? + "/" + version? + "/" + path`, with empty
/// segments dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDescriptor {
    /// Stable service name.
    pub name: &'static str,
    /// Path prefix shared by all calls of this service (may be empty).
    pub base_path: &'static str,
    /// API version segment (may be empty).
    pub version: &'static str,
    /// Whether calls need a signed-in user.
    pub requires_auth: bool,
}

impl ServiceDescriptor {
    /// Joins `base`, this service's prefix and version, and `path`.
    ///
    /// `version` overrides the descriptor's version when given.
    pub fn full_path(&self, base: &str, version: Option<&str>, path: &str) -> String {
        join_segments(&[
            base,
            self.base_path,
            version.unwrap_or(self.version),
            path,
        ])
    }
}

/// Joins URL segments with single slashes, skipping empty ones.
pub fn join_segments(segments: &[&str]) -> String {
    let mut out = String::new();
    for (index, segment) in segments.iter().enumerate() {
        let segment = if index == 0 {
            segment.trim_end_matches('/')
        } else {
            segment.trim_matches('/')
        };
        if segment.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(segment);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH: ServiceDescriptor = ServiceDescriptor {
        name: "search",
        base_path: "",
        version: "1.1",
        requires_auth: true,
    };

    #[test]
    fn test_full_path_skips_empty_segments() {
        assert_eq!(
            SEARCH.full_path("https://api.test", None, "search/tweets.json"),
            "https://api.test/1.1/search/tweets.json"
        );
    }

    #[test]
    fn test_full_path_version_override() {
        assert_eq!(
            SEARCH.full_path("https://api.test/", Some("2"), "/x"),
            "https://api.test/2/x"
        );
    }

    #[test]
    fn test_full_path_no_duplicate_separators() {
        let desc = ServiceDescriptor {
            name: "account",
            base_path: "/api/",
            version: "",
            requires_auth: false,
        };
        assert_eq!(
            desc.full_path("https://api.test", None, ""),
            "https://api.test/api"
        );
    }
}
