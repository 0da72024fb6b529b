//! Client-side route paths.

use core::fmt;

use serde::{Deserialize, Serialize};

/// A client-side route path (e.g. `/login`, `/dashboard/applications`).
///
/// Construction normalizes a missing leading slash. Comparisons that decide
/// redirect-loop prevention go through [`RoutePath::matches`], which ignores
/// ASCII case, so `/Login` and `/login` are the same route.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutePath(String);

impl RoutePath {
    /// Create a route path, prepending a leading slash if missing.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        if path.starts_with('/') {
            Self(path)
        } else {
            Self(format!("/{path}"))
        }
    }

    /// Returns the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive route comparison.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl fmt::Display for RoutePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RoutePath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
