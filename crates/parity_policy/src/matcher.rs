//! Rule predicates and the context they are evaluated against.

use parity_core::{Fingerprint, ReplayResult, RequestDescriptor};
use serde::{Deserialize, Serialize};

/// Bodies that count as "no data" for JSON endpoints
const EMPTY_JSON_BODIES: [&[u8]; 2] = [b"{}", b"{\"data\":[]}"];

/// Everything a rule may look at for one mismatching request
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    /// Request as captured
    pub descriptor: &'a RequestDescriptor,
    /// Request fingerprint
    pub fingerprint: Fingerprint,
    /// Replay against backend A
    pub a: &'a ReplayResult,
    /// Replay against backend B
    pub b: &'a ReplayResult,
}

impl<'a> Candidate<'a> {
    /// Build a candidate
    #[must_use]
    pub fn new(
        descriptor: &'a RequestDescriptor,
        a: &'a ReplayResult,
        b: &'a ReplayResult,
    ) -> Self {
        Self {
            descriptor,
            fingerprint: descriptor.fingerprint(),
            a,
            b,
        }
    }
}

/// Whether a body is exactly `{}` or `{"data":[]}`
#[must_use]
pub fn is_empty_json(body: &[u8]) -> bool {
    EMPTY_JSON_BODIES.iter().any(|empty| *empty == body)
}

/// Condition half of an exclusion rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RulePredicate {
    /// Both bodies are empty JSON and the URI contains `uri_contains`
    EmptyJsonOn {
        /// URI fragment the rule is limited to
        uri_contains: String,
    },
    /// Both statuses are >= 300
    BothErrored,
    /// Fingerprint is one of a deny-list
    FingerprintIn {
        /// Deny-listed fingerprints
        fingerprints: Vec<Fingerprint>,
    },
    /// URI contains a fragment
    UriContains {
        /// Fragment to look for
        pattern: String,
    },
    /// Credential identity equals a known account
    CredentialIs {
        /// Account identity
        identity: String,
    },
}

impl RulePredicate {
    /// Evaluate against a candidate
    #[must_use]
    pub fn matches(&self, candidate: &Candidate<'_>) -> bool {
        match self {
            Self::EmptyJsonOn { uri_contains } => {
                candidate.descriptor.uri().contains(uri_contains.as_str())
                    && is_empty_json(&candidate.a.body)
                    && is_empty_json(&candidate.b.body)
            }
            Self::BothErrored => candidate.a.is_error() && candidate.b.is_error(),
            Self::FingerprintIn { fingerprints } => fingerprints.contains(&candidate.fingerprint),
            Self::UriContains { pattern } => candidate.descriptor.uri().contains(pattern.as_str()),
            Self::CredentialIs { identity } => candidate
                .descriptor
                .credential()
                .is_some_and(|credential| credential.identity() == identity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parity_core::Backend;
    use std::time::Duration;

    fn result(backend: Backend, status: u16, body: &[u8]) -> ReplayResult {
        ReplayResult {
            backend,
            status,
            headers: Default::default(),
            body: body.to_vec(),
            truncated: false,
            elapsed: Duration::ZERO,
            body_artifact: "x.out".to_string(),
        }
    }

    fn descriptor(uri: &str, auth: Option<&str>) -> RequestDescriptor {
        RequestDescriptor::new("GET", uri, auth.map(str::to_string), None)
    }

    #[test]
    fn test_is_empty_json() {
        assert!(is_empty_json(b"{}"));
        assert!(is_empty_json(b"{\"data\":[]}"));
        assert!(!is_empty_json(b"{ }"));
        assert!(!is_empty_json(b"[]"));
        assert!(!is_empty_json(b""));
    }

    #[test]
    fn test_empty_json_requires_uri_and_both_bodies() {
        let rule = RulePredicate::EmptyJsonOn {
            uri_contains: "/Link/".to_string(),
        };
        let link = descriptor("/data/Link/1", None);
        let other = descriptor("/data/Other/1", None);
        let empty_a = result(Backend::A, 200, b"{}");
        let empty_b = result(Backend::B, 200, b"{\"data\":[]}");
        let full_b = result(Backend::B, 200, b"{\"data\":[1]}");

        assert!(rule.matches(&Candidate::new(&link, &empty_a, &empty_b)));
        assert!(!rule.matches(&Candidate::new(&link, &empty_a, &full_b)));
        assert!(!rule.matches(&Candidate::new(&other, &empty_a, &empty_b)));
    }

    #[test]
    fn test_both_errored() {
        let d = descriptor("/x", None);
        let ok = result(Backend::A, 200, b"");
        let redirect = result(Backend::A, 300, b"");
        let fail = result(Backend::B, 500, b"");
        assert!(RulePredicate::BothErrored.matches(&Candidate::new(&d, &redirect, &fail)));
        assert!(!RulePredicate::BothErrored.matches(&Candidate::new(&d, &ok, &fail)));
    }

    #[test]
    fn test_fingerprint_in() {
        let d = descriptor("/x", None);
        let r = result(Backend::A, 200, b"");
        let hit = RulePredicate::FingerprintIn {
            fingerprints: vec![d.fingerprint()],
        };
        let miss = RulePredicate::FingerprintIn {
            fingerprints: vec![Fingerprint::from_bytes([0; 8])],
        };
        assert!(hit.matches(&Candidate::new(&d, &r, &r)));
        assert!(!miss.matches(&Candidate::new(&d, &r, &r)));
    }

    #[test]
    fn test_credential_is_uses_basic_username() {
        // "someone@example.com:secret"
        let d = descriptor("/x", Some("Basic c29tZW9uZUBleGFtcGxlLmNvbTpzZWNyZXQ="));
        let anon = descriptor("/x", None);
        let r = result(Backend::A, 200, b"");
        let rule = RulePredicate::CredentialIs {
            identity: "someone@example.com".to_string(),
        };
        assert!(rule.matches(&Candidate::new(&d, &r, &r)));
        assert!(!rule.matches(&Candidate::new(&anon, &r, &r)));
    }

    #[test]
    fn test_predicate_from_toml() {
        let rule: RulePredicate =
            toml::from_str("kind = \"uri_contains\"\npattern = \"/direct/\"\n").unwrap();
        assert_eq!(
            rule,
            RulePredicate::UriContains {
                pattern: "/direct/".to_string()
            }
        );
        let rule: RulePredicate = toml::from_str("kind = \"both_errored\"\n").unwrap();
        assert_eq!(rule, RulePredicate::BothErrored);
    }
}
