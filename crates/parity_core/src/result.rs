//! The record of one replay against one backend.

use crate::origin::Backend;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum number of body bytes kept per response (1 MiB).
///
/// Bodies are never compared past this point.
pub const BODY_CAP: usize = 1024 * 1024;

/// Status at or above which a response counts as an error
const ERROR_STATUS: u16 = 300;

/// Outcome of sending one request to one backend. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayResult {
    /// Backend that answered
    pub backend: Backend,
    /// HTTP status code
    pub status: u16,
    /// Response headers, names lowercased, repeated values joined by `, `
    pub headers: IndexMap<String, String>,
    /// Response body, at most [`BODY_CAP`] bytes
    pub body: Vec<u8>,
    /// Whether the body was cut at [`BODY_CAP`]
    pub truncated: bool,
    /// Wall time from send to last body byte kept
    pub elapsed: Duration,
    /// Artifact name holding the body
    pub body_artifact: String,
}

impl ReplayResult {
    /// Header value, looked up case-insensitively
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// `Content-Type` header, or empty
    #[must_use]
    pub fn content_type(&self) -> &str {
        self.header("content-type").unwrap_or_default()
    }

    /// Whether status >= 300
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status >= ERROR_STATUS
    }

    /// Elapsed time in seconds, 3 decimals
    #[must_use]
    pub fn elapsed_display(&self) -> String {
        format!("{:.3}", self.elapsed.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: u16) -> ReplayResult {
        let mut headers = IndexMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        ReplayResult {
            backend: Backend::A,
            status,
            headers,
            body: b"{}".to_vec(),
            truncated: false,
            elapsed: Duration::from_millis(1234),
            body_artifact: "0011223344556677.out.json".to_string(),
        }
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let r = result(200);
        assert_eq!(r.header("Content-Type"), Some("application/json"));
        assert_eq!(r.content_type(), "application/json");
        assert_eq!(r.header("x-missing"), None);
    }

    #[test]
    fn test_is_error() {
        assert!(!result(200).is_error());
        assert!(!result(299).is_error());
        assert!(result(300).is_error());
        assert!(result(500).is_error());
    }

    #[test]
    fn test_elapsed_display() {
        assert_eq!(result(200).elapsed_display(), "1.234");
    }
}
