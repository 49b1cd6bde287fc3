//! Ordered exclusion table for accepted divergences.
//!
//! A raw mismatch is run through the table top to bottom; the first rule
//! whose predicate matches decides the final outcome.

use crate::matcher::{Candidate, RulePredicate};
use parity_core::{ComparisonOutcome, Fingerprint};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

/// Policy validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// A rule has no name
    #[error("Rule #{index} has an empty name")]
    EmptyName {
        /// Position in the table
        index: usize,
    },
    /// Two rules share a name
    #[error("Duplicate rule name: {name}")]
    DuplicateName {
        /// Repeated name
        name: String,
    },
    /// A predicate would match every request
    #[error("Rule {rule} has an empty pattern")]
    EmptyPattern {
        /// Offending rule
        rule: String,
    },
    /// Count window is inverted
    #[error("Invalid count window: min {min} > max {max}")]
    CountWindow {
        /// Lower bound
        min: u64,
        /// Upper bound
        max: u64,
    },
}

/// Outcome a matching rule assigns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Treat as identical
    TreatIdentical,
    /// Both backends failed; not worth comparing
    BothErrored,
    /// Accepted known divergence
    KnownIssue,
}

/// One row of the exclusion table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionRule {
    /// Rule name, shown in reports
    pub name: String,
    /// When the rule applies
    pub when: RulePredicate,
    /// What the rule turns the mismatch into
    pub action: RuleAction,
    /// Why the divergence is accepted
    pub reason: String,
}

impl ExclusionRule {
    /// Create a rule
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        when: RulePredicate,
        action: RuleAction,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            when,
            action,
            reason: reason.into(),
        }
    }

    /// Outcome this rule produces
    #[must_use]
    pub fn outcome(&self) -> ComparisonOutcome {
        match self.action {
            RuleAction::TreatIdentical => ComparisonOutcome::Identical,
            RuleAction::BothErrored => ComparisonOutcome::BothErrored,
            RuleAction::KnownIssue => ComparisonOutcome::ExcludedKnownIssue {
                rule: self.name.clone(),
                reason: self.reason.clone(),
            },
        }
    }
}

/// Ordered exclusion table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionPolicy {
    /// Rules, first match wins
    pub rules: Vec<ExclusionRule>,
}

impl Default for ExclusionPolicy {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ExclusionPolicy {
    /// Policy with the given rules
    ///
    /// # Errors
    ///
    /// Returns error if the table fails [`ExclusionPolicy::validate`]
    pub fn new(rules: Vec<ExclusionRule>) -> Result<Self, PolicyError> {
        let policy = Self { rules };
        policy.validate()?;
        Ok(policy)
    }

    /// Policy that never suppresses anything
    #[must_use]
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Known issues of the production deployment
    #[must_use]
    pub fn builtin() -> Self {
        let fingerprints = |hexes: &[&str]| RulePredicate::FingerprintIn {
            fingerprints: hexes
                .iter()
                .filter_map(|hex| Fingerprint::from_hex(hex).ok())
                .collect(),
        };
        Self {
            rules: vec![
                ExclusionRule::new(
                    "empty-link-data",
                    RulePredicate::EmptyJsonOn {
                        uri_contains: "/Link/".to_string(),
                    },
                    RuleAction::TreatIdentical,
                    "Link endpoints return either empty JSON form for no data",
                ),
                ExclusionRule::new(
                    "both-errored",
                    RulePredicate::BothErrored,
                    RuleAction::BothErrored,
                    "Both backends returned an error status",
                ),
                ExclusionRule::new(
                    "case-colliding-dynamic-fields",
                    fingerprints(&["17dfec42ee028144", "725b6a7900e6c090"]),
                    RuleAction::KnownIssue,
                    "Two dynamic fields differ only in case; backend A merges them",
                ),
                ExclusionRule::new(
                    "inconsistent-source-data",
                    fingerprints(&["e3bccf7bc389fbd3"]),
                    RuleAction::KnownIssue,
                    "Tenant data is inconsistent, so the backends legitimately disagree",
                ),
                ExclusionRule::new(
                    "third-party-opportunities",
                    fingerprints(&["efe338ec68bea36f"]),
                    RuleAction::KnownIssue,
                    "Backend A produces incorrect results for this query",
                ),
                ExclusionRule::new(
                    "syndicated-rss-encoding",
                    RulePredicate::UriContains {
                        pattern: "/direct/Syndicate/Vacancies".to_string(),
                    },
                    RuleAction::KnownIssue,
                    "RSS feeds have encoding issues on backend A",
                ),
                ExclusionRule::new(
                    "retired-account",
                    RulePredicate::CredentialIs {
                        identity: "brian.davis@leeds-services.targetconnect.net".to_string(),
                    },
                    RuleAction::KnownIssue,
                    "Account should not be making requests; error bodies differ",
                ),
            ],
        }
    }

    /// Check names are present and unique and no pattern is empty
    ///
    /// # Errors
    ///
    /// Returns the first problem found
    pub fn validate(&self) -> Result<(), PolicyError> {
        let mut seen = HashSet::new();
        for (index, rule) in self.rules.iter().enumerate() {
            if rule.name.trim().is_empty() {
                return Err(PolicyError::EmptyName { index });
            }
            if !seen.insert(rule.name.as_str()) {
                return Err(PolicyError::DuplicateName {
                    name: rule.name.clone(),
                });
            }
            let empty_pattern = match &rule.when {
                RulePredicate::EmptyJsonOn { uri_contains } => uri_contains.is_empty(),
                RulePredicate::UriContains { pattern } => pattern.is_empty(),
                RulePredicate::CredentialIs { identity } => identity.is_empty(),
                RulePredicate::FingerprintIn { fingerprints } => fingerprints.is_empty(),
                RulePredicate::BothErrored => false,
            };
            if empty_pattern {
                return Err(PolicyError::EmptyPattern {
                    rule: rule.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// First rule matching the candidate
    #[must_use]
    pub fn first_match(&self, candidate: &Candidate<'_>) -> Option<&ExclusionRule> {
        self.rules.iter().find(|rule| rule.when.matches(candidate))
    }

    /// Final outcome for a raw comparison.
    ///
    /// Only `Different` and `LengthMismatch` are eligible for suppression;
    /// every other outcome passes through untouched.
    #[must_use]
    pub fn evaluate(&self, candidate: &Candidate<'_>, raw: ComparisonOutcome) -> ComparisonOutcome {
        if !raw.is_mismatch() {
            return raw;
        }
        match self.first_match(candidate) {
            Some(rule) => {
                debug!(
                    fingerprint = %candidate.fingerprint,
                    rule = %rule.name,
                    "mismatch suppressed by exclusion rule"
                );
                rule.outcome()
            }
            None => raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parity_core::{Backend, Divergence, ReplayResult, RequestDescriptor};
    use proptest::prelude::*;
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

    fn mismatch() -> ComparisonOutcome {
        ComparisonOutcome::Different(Divergence {
            position: 3,
            window_start: 0,
            context_a: b"abcdef".to_vec(),
            context_b: b"abcXef".to_vec(),
        })
    }

    #[test]
    fn test_builtin_table_is_valid() {
        let policy = ExclusionPolicy::builtin();
        policy.validate().unwrap();
        assert_eq!(policy.rules.len(), 7);
        assert_eq!(policy.rules[0].name, "empty-link-data");
        assert_eq!(policy.rules[1].name, "both-errored");
        let deny: usize = policy
            .rules
            .iter()
            .map(|rule| match &rule.when {
                RulePredicate::FingerprintIn { fingerprints } => fingerprints.len(),
                _ => 0,
            })
            .sum();
        assert_eq!(deny, 4);
    }

    #[test]
    fn test_non_mismatch_passes_through() {
        let policy = ExclusionPolicy::builtin();
        let d = RequestDescriptor::new("GET", "/x", None, None);
        let a = result(Backend::A, 500, b"");
        let b = result(Backend::B, 500, b"");
        let candidate = Candidate::new(&d, &a, &b);
        assert_eq!(
            policy.evaluate(&candidate, ComparisonOutcome::Identical),
            ComparisonOutcome::Identical
        );
    }

    #[test]
    fn test_first_match_wins() {
        let d = RequestDescriptor::new("GET", "/direct/Syndicate/Vacancies", None, None);
        let a = result(Backend::A, 500, b"x");
        let b = result(Backend::B, 502, b"y");
        let candidate = Candidate::new(&d, &a, &b);
        let policy = ExclusionPolicy::builtin();
        assert_eq!(
            policy.evaluate(&candidate, mismatch()),
            ComparisonOutcome::BothErrored
        );
    }

    #[test]
    fn test_empty_link_data_treated_identical() {
        let d = RequestDescriptor::new("GET", "/data/Link/7", None, None);
        let a = result(Backend::A, 200, b"{}");
        let b = result(Backend::B, 200, b"{\"data\":[]}");
        let candidate = Candidate::new(&d, &a, &b);
        assert_eq!(
            ExclusionPolicy::builtin().evaluate(&candidate, mismatch()),
            ComparisonOutcome::Identical
        );
    }

    #[test]
    fn test_uri_rule_is_known_issue() {
        let d = RequestDescriptor::new("GET", "/direct/Syndicate/Vacancies?x=1", None, None);
        let a = result(Backend::A, 200, b"<rss>a</rss>");
        let b = result(Backend::B, 200, b"<rss>b</rss>");
        let candidate = Candidate::new(&d, &a, &b);
        match ExclusionPolicy::builtin().evaluate(&candidate, mismatch()) {
            ComparisonOutcome::ExcludedKnownIssue { rule, .. } => {
                assert_eq!(rule, "syndicated-rss-encoding");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_unmatched_mismatch_stands() {
        let d = RequestDescriptor::new("GET", "/api/things", None, None);
        let a = result(Backend::A, 200, b"abcdef");
        let b = result(Backend::B, 200, b"abcXef");
        let candidate = Candidate::new(&d, &a, &b);
        assert_eq!(
            ExclusionPolicy::builtin().evaluate(&candidate, mismatch()),
            mismatch()
        );
        assert_eq!(
            ExclusionPolicy::empty().evaluate(&candidate, mismatch()),
            mismatch()
        );
    }

    #[test]
    fn test_validation_errors() {
        let rule = |name: &str, pattern: &str| {
            ExclusionRule::new(
                name,
                RulePredicate::UriContains {
                    pattern: pattern.to_string(),
                },
                RuleAction::KnownIssue,
                "r",
            )
        };
        assert_eq!(
            ExclusionPolicy::new(vec![rule(" ", "/a")]).unwrap_err(),
            PolicyError::EmptyName { index: 0 }
        );
        assert!(matches!(
            ExclusionPolicy::new(vec![rule("a", "/a"), rule("a", "/b")]),
            Err(PolicyError::DuplicateName { .. })
        ));
        assert!(matches!(
            ExclusionPolicy::new(vec![rule("a", "")]),
            Err(PolicyError::EmptyPattern { .. })
        ));
    }

    #[test]
    fn test_table_from_toml() {
        let text = r#"
[[rules]]
name = "flaky-report"
action = "known_issue"
reason = "report totals are computed at request time"
when = { kind = "fingerprint_in", fingerprints = ["0011223344556677"] }

[[rules]]
name = "errors"
action = "both_errored"
reason = "both down"
when = { kind = "both_errored" }
"#;
        let policy: ExclusionPolicy = toml::from_str(text).unwrap();
        policy.validate().unwrap();
        assert_eq!(policy.rules.len(), 2);
        assert_eq!(policy.rules[0].action, RuleAction::KnownIssue);
        assert_eq!(
            policy.rules[0].when,
            RulePredicate::FingerprintIn {
                fingerprints: vec![Fingerprint::from_bytes([
                    0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77
                ])]
            }
        );
    }

    proptest! {
        #[test]
        fn test_deny_listed_fingerprint_always_excluded(uri in "/[a-z]{1,12}", body_a in ".*", body_b in ".*") {
            let d = RequestDescriptor::new("GET", uri, None, None);
            let policy = ExclusionPolicy::new(vec![ExclusionRule::new(
                "deny",
                RulePredicate::FingerprintIn { fingerprints: vec![d.fingerprint()] },
                RuleAction::KnownIssue,
                "known",
            )]).unwrap();
            let a = result(Backend::A, 200, body_a.as_bytes());
            let b = result(Backend::B, 200, body_b.as_bytes());
            let outcome = policy.evaluate(&Candidate::new(&d, &a, &b), mismatch());
            let is_excluded = matches!(outcome, ComparisonOutcome::ExcludedKnownIssue { .. });
            prop_assert!(is_excluded);
        }
    }
}
