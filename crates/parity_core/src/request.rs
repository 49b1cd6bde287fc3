//! Canonical request identity.
//!
//! A [`RequestDescriptor`] is the deduplication key for captured traffic:
//! two captures are the same request iff method, URI, credential and
//! `Accept` value all match exactly. The URL path is derived on demand and
//! only used for grouping.

use crate::credential::Credential;
use crate::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Method used when a capture carries an empty method field
pub const DEFAULT_METHOD: &str = "GET";

/// Forwarded protocol recorded when a capture has no `X-Forwarded-Proto`
/// line. Compared case-insensitively; never used to build a URI.
pub const UNKNOWN_PROTO: &str = "unknown";

/// Rendering of an absent optional field inside the fingerprint input.
/// Existing deny-list fingerprints were computed with this spelling.
const ABSENT_FIELD: &str = "None";

/// Immutable, hashable request identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestDescriptor {
    method: String,
    uri: String,
    auth: Option<String>,
    accept: Option<String>,
}

impl RequestDescriptor {
    /// Build a descriptor from already-canonical parts.
    ///
    /// The method is uppercased; an empty method becomes [`DEFAULT_METHOD`].
    #[must_use]
    pub fn new(
        method: &str,
        uri: impl Into<String>,
        auth: Option<String>,
        accept: Option<String>,
    ) -> Self {
        let method = method.trim();
        let method = if method.is_empty() {
            DEFAULT_METHOD.to_string()
        } else {
            method.to_uppercase()
        };
        Self {
            method,
            uri: uri.into(),
            auth,
            accept,
        }
    }

    /// Canonicalize raw captured fields.
    ///
    /// A present, non-empty `proto` other than [`UNKNOWN_PROTO`] is lowercased
    /// and prefixed as `"{proto}:/{uri}"`. The raw URI already starts with
    /// `/`, so the single slash yields a scheme-qualified form. Credentials
    /// are kept verbatim.
    #[must_use]
    pub fn canonicalize(
        method: &str,
        proto: Option<&str>,
        uri: &str,
        auth: Option<&str>,
        accept: Option<&str>,
    ) -> Self {
        let proto = proto
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty() && p.as_str() != UNKNOWN_PROTO);
        let uri = match proto {
            Some(proto) => format!("{proto}:/{uri}"),
            None => uri.to_string(),
        };
        Self::new(
            method,
            uri,
            auth.map(str::to_string),
            accept.map(str::to_string),
        )
    }

    /// HTTP method (uppercase)
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Request URI
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Raw `Authorization` value
    #[must_use]
    pub fn auth(&self) -> Option<&str> {
        self.auth.as_deref()
    }

    /// Raw `Accept` value
    #[must_use]
    pub fn accept(&self) -> Option<&str> {
        self.accept.as_deref()
    }

    /// URL path component, used for grouping only
    #[must_use]
    pub fn path(&self) -> &str {
        url_path(&self.uri)
    }

    /// Stable fingerprint over the four identity fields
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        let input = format!(
            "{},{},{},{}",
            self.method,
            self.uri,
            self.auth.as_deref().unwrap_or(ABSENT_FIELD),
            self.accept.as_deref().unwrap_or(ABSENT_FIELD),
        );
        Fingerprint::compute(input.as_bytes())
    }

    /// Decoded credential, if any
    #[must_use]
    pub fn credential(&self) -> Option<Credential> {
        self.auth.as_deref().map(Credential::parse)
    }

    /// Account identity for reports; `-` when the request is anonymous
    #[must_use]
    pub fn identity(&self) -> String {
        self.credential()
            .map_or_else(|| "-".to_string(), |c| c.identity().to_string())
    }

    /// Same request against a different URI
    #[must_use]
    pub fn with_uri(&self, uri: impl Into<String>) -> Self {
        Self {
            method: self.method.clone(),
            uri: uri.into(),
            auth: self.auth.clone(),
            accept: self.accept.clone(),
        }
    }

    /// Render as a curl command line
    #[must_use]
    pub fn to_curl(&self, redacted: bool) -> String {
        let accept = self
            .accept
            .as_deref()
            .map(|a| format!(" -H 'Accept: {}' ", a))
            .unwrap_or_default();
        let method = if self.method == DEFAULT_METHOD {
            String::new()
        } else {
            format!(" -X {}", self.method)
        };
        let auth = self
            .credential()
            .map(|c| c.curl_args(redacted))
            .unwrap_or_default();
        format!("curl -v{}{}{} '{}'", method, accept, auth, self.uri)
    }
}

impl fmt::Display for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_curl(true))
    }
}

/// Path component of a URL or URI reference.
///
/// Skips a leading `scheme:` and `//authority`, then stops at `?` or `#`.
/// `"http://x"` has an empty path; `"/x?y"` has path `/x`.
#[must_use]
pub fn url_path(uri: &str) -> &str {
    let rest = match uri.find(':') {
        Some(idx) if is_scheme(&uri[..idx]) => &uri[idx + 1..],
        _ => uri,
    };
    let rest = match rest.strip_prefix("//") {
        Some(authority) => authority
            .find(['/', '?', '#'])
            .map_or("", |idx| &authority[idx..]),
        None => rest,
    };
    let end = rest.find(['?', '#']).unwrap_or(rest.len());
    &rest[..end]
}

fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> RequestDescriptor {
        RequestDescriptor::canonicalize(
            "get",
            Some("HTTPS"),
            "/query.example.com/api/v1/things?x=1",
            Some("Basic YWxpY2U6czNjcmV0"),
            Some("application/json"),
        )
    }

    #[test]
    fn test_canonicalize_builds_single_slash_uri() {
        let req = sample();
        assert_eq!(req.method(), "GET");
        assert_eq!(req.uri(), "https://query.example.com/api/v1/things?x=1");
        assert_eq!(req.path(), "/api/v1/things");
    }

    #[test]
    fn test_canonicalize_without_proto_keeps_uri() {
        let req = RequestDescriptor::canonicalize("post", None, "/x", None, None);
        assert_eq!(req.method(), "POST");
        assert_eq!(req.uri(), "/x");
        assert_eq!(req.path(), "/x");

        let empty = RequestDescriptor::canonicalize("get", Some(""), "/x", None, None);
        assert_eq!(empty.uri(), "/x");

        let unknown = RequestDescriptor::canonicalize("get", Some("UnKnown"), "/x", None, None);
        assert_eq!(unknown.uri(), "/x");
    }

    #[test]
    fn test_empty_method_defaults_to_get() {
        let req = RequestDescriptor::new("  ", "/x", None, None);
        assert_eq!(req.method(), DEFAULT_METHOD);
    }

    #[test]
    fn test_fingerprint_matches_recorded_format() {
        let req = RequestDescriptor::new("GET", "/x", None, None);
        let expected = Fingerprint::compute(b"GET,/x,None,None");
        assert_eq!(req.fingerprint(), expected);
    }

    #[test]
    fn test_equality_uses_all_fields() {
        let a = sample();
        assert_eq!(a, sample());
        assert_ne!(a, a.with_uri("https://other.example.com/api/v1/things?x=1"));
        let no_accept = RequestDescriptor::new("GET", a.uri(), a.auth().map(str::to_string), None);
        assert_ne!(a, no_accept);
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        let a = RequestDescriptor::new("GET", "/a", None, None);
        let b = RequestDescriptor::new("GET", "/b", None, None);
        let p = RequestDescriptor::new("POST", "/a", None, None);
        assert!(a < b);
        assert!(b < p);
    }

    #[test]
    fn test_identity() {
        assert_eq!(sample().identity(), "alice");
        assert_eq!(RequestDescriptor::new("GET", "/x", None, None).identity(), "-");
    }

    #[test]
    fn test_to_curl() {
        let req = sample();
        assert_eq!(
            req.to_curl(false),
            "curl -v -H 'Accept: application/json'  -u 'alice:s3cret' 'https://query.example.com/api/v1/things?x=1'"
        );
        assert!(req.to_curl(true).contains("alice:**********"));

        let post = RequestDescriptor::new("DELETE", "/x", None, None);
        assert_eq!(post.to_curl(true), "curl -v -X DELETE '/x'");
    }

    #[test]
    fn test_url_path() {
        assert_eq!(url_path("https://host/a/b?c#d"), "/a/b");
        assert_eq!(url_path("http://x"), "");
        assert_eq!(url_path("/x"), "/x");
        assert_eq!(url_path("/x?a=b:c"), "/x");
        assert_eq!(url_path("https://host?q"), "");
    }

    proptest! {
        #[test]
        fn prop_fingerprint_is_pure(
            method in "[a-z]{1,7}",
            uri in "/[a-z/]{0,20}",
            auth in proptest::option::of("[A-Za-z0-9 ]{1,20}"),
            accept in proptest::option::of("[a-z/+]{1,20}"),
        ) {
            let a = RequestDescriptor::canonicalize(&method, Some("https"), &uri, auth.as_deref(), accept.as_deref());
            let b = RequestDescriptor::canonicalize(&method, Some("https"), &uri, auth.as_deref(), accept.as_deref());
            prop_assert_eq!(a.fingerprint(), b.fingerprint());
            prop_assert_eq!(a, b);
        }

        #[test]
        fn prop_fingerprint_changes_with_uri(uri in "/[a-z]{1,20}") {
            let a = RequestDescriptor::new("GET", uri.clone(), None, None);
            let b = RequestDescriptor::new("GET", format!("{}/", uri), None, None);
            prop_assert_ne!(a.fingerprint(), b.fingerprint());
        }
    }

    #[test]
    fn test_fingerprint_changes_with_each_field() {
        let base = RequestDescriptor::new("GET", "/x", Some("t".into()), Some("a".into()));
        let variants = [
            RequestDescriptor::new("PUT", "/x", Some("t".into()), Some("a".into())),
            RequestDescriptor::new("GET", "/y", Some("t".into()), Some("a".into())),
            RequestDescriptor::new("GET", "/x", Some("u".into()), Some("a".into())),
            RequestDescriptor::new("GET", "/x", Some("t".into()), Some("b".into())),
            RequestDescriptor::new("GET", "/x", None, Some("a".into())),
        ];
        for v in &variants {
            assert_ne!(base.fingerprint(), v.fingerprint());
        }
    }
}
