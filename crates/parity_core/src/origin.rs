//! Backend identities and origin rewriting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two services under comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Backend {
    /// Legacy service; reference behaviour
    A,
    /// Candidate reimplementation
    B,
}

impl Backend {
    /// Both backends, in replay order
    pub const ALL: [Backend; 2] = [Backend::A, Backend::B];

    /// Short label
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base URLs of the two backends.
///
/// Captured URIs are expressed against origin A. Origin B replaces that
/// prefix; relative URIs are resolved against either origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origins {
    /// Origin of backend A, e.g. `https://query.example.com/`
    pub a: String,
    /// Origin of backend B
    pub b: String,
}

impl Origins {
    /// Create from two base URLs
    #[must_use]
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
        }
    }

    /// Origin for a backend
    #[must_use]
    pub fn origin(&self, backend: Backend) -> &str {
        match backend {
            Backend::A => &self.a,
            Backend::B => &self.b,
        }
    }

    /// URI to send to `backend` for a captured URI.
    ///
    /// - URIs under origin A go verbatim to A and are re-rooted for B.
    /// - Relative URIs (`/...`) are joined onto the backend's origin.
    /// - Anything else is sent unchanged to both.
    #[must_use]
    pub fn resolve(&self, uri: &str, backend: Backend) -> String {
        if let Some(rest) = uri.strip_prefix(self.a.as_str()) {
            return match backend {
                Backend::A => uri.to_string(),
                Backend::B => format!("{}{}", self.b, rest),
            };
        }
        if uri.starts_with('/') {
            let origin = self.origin(backend).trim_end_matches('/');
            return format!("{}{}", origin, uri);
        }
        uri.to_string()
    }

    /// Whether `uri` is exactly the root of origin A
    #[must_use]
    pub fn is_root(&self, uri: &str) -> bool {
        uri == self.a || uri.trim_end_matches('/') == self.a.trim_end_matches('/')
    }
}
