//! Pre-replay filtering.
//!
//! Some request families are never replayed: endpoints the candidate does
//! not implement yet, documentation routes, and the bare origin. A skipped
//! representative takes its whole path group with it.

use crate::rules::PolicyError;
use parity_core::{Origins, RequestDescriptor};
use serde::{Deserialize, Serialize};

/// Condition for skipping a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipPredicate {
    /// URI contains a fragment
    UriContains {
        /// Fragment to look for
        pattern: String,
    },
    /// URI is exactly the root of origin A
    OriginRoot,
}

impl SkipPredicate {
    /// Evaluate against a request
    #[must_use]
    pub fn matches(&self, descriptor: &RequestDescriptor, origins: &Origins) -> bool {
        match self {
            Self::UriContains { pattern } => descriptor.uri().contains(pattern.as_str()),
            Self::OriginRoot => origins.is_root(descriptor.uri()),
        }
    }
}

/// One skip rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipRule {
    /// Short label used in the skip line, e.g. `odata`
    pub reason: String,
    /// When to skip
    pub when: SkipPredicate,
}

impl SkipRule {
    /// Create a rule
    #[must_use]
    pub fn new(reason: impl Into<String>, when: SkipPredicate) -> Self {
        Self {
            reason: reason.into(),
            when,
        }
    }
}

/// Why a request was not replayed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipDecision {
    /// Short label
    pub reason: String,
}

/// Skip rules plus an optional occurrence-count window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkipPolicy {
    /// Rules, first match wins
    pub rules: Vec<SkipRule>,
    /// Skip representatives seen fewer times than this
    pub min_count: Option<u64>,
    /// Skip representatives seen more times than this
    pub max_count: Option<u64>,
}

impl Default for SkipPolicy {
    fn default() -> Self {
        Self {
            rules: vec![
                SkipRule::new(
                    "odata",
                    SkipPredicate::UriContains {
                        pattern: "/odata4/".to_string(),
                    },
                ),
                SkipRule::new(
                    "docs",
                    SkipPredicate::UriContains {
                        pattern: "/api-docs/".to_string(),
                    },
                ),
                SkipRule::new("root", SkipPredicate::OriginRoot),
            ],
            min_count: None,
            max_count: None,
        }
    }
}

impl SkipPolicy {
    /// Policy that replays everything
    #[must_use]
    pub fn none() -> Self {
        Self {
            rules: Vec::new(),
            min_count: None,
            max_count: None,
        }
    }

    /// Check the count window
    ///
    /// # Errors
    ///
    /// Returns error if `min_count > max_count`
    pub fn validate(&self) -> Result<(), PolicyError> {
        if let (Some(min), Some(max)) = (self.min_count, self.max_count) {
            if min > max {
                return Err(PolicyError::CountWindow { min, max });
            }
        }
        Ok(())
    }

    /// Decide whether a representative should be skipped
    #[must_use]
    pub fn check(
        &self,
        descriptor: &RequestDescriptor,
        count: u64,
        origins: &Origins,
    ) -> Option<SkipDecision> {
        let reason = self
            .rules
            .iter()
            .find(|rule| rule.when.matches(descriptor, origins))
            .map(|rule| rule.reason.clone())
            .or_else(|| match (self.min_count, self.max_count) {
                (Some(min), _) if count < min => Some("infrequent".to_string()),
                (_, Some(max)) if count > max => Some("frequent".to_string()),
                _ => None,
            })?;
        Some(SkipDecision { reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origins() -> Origins {
        Origins::new("https://query.example.com/", "https://candidate.test/")
    }

    fn get(uri: &str) -> RequestDescriptor {
        RequestDescriptor::new("GET", uri, None, None)
    }

    #[test]
    fn test_default_rules() {
        let policy = SkipPolicy::default();
        let o = origins();
        let reason = |uri: &str| policy.check(&get(uri), 1, &o).map(|d| d.reason);
        assert_eq!(reason("https://query.example.com/odata4/People"), Some("odata".to_string()));
        assert_eq!(reason("/api-docs/v1"), Some("docs".to_string()));
        assert_eq!(reason("https://query.example.com/"), Some("root".to_string()));
        assert_eq!(reason("https://query.example.com/data/x"), None);
    }

    #[test]
    fn test_count_window() {
        let policy = SkipPolicy {
            min_count: Some(3),
            max_count: Some(50),
            ..SkipPolicy::none()
        };
        let o = origins();
        let d = get("/x");
        assert_eq!(policy.check(&d, 2, &o).unwrap().reason, "infrequent");
        assert!(policy.check(&d, 3, &o).is_none());
        assert!(policy.check(&d, 50, &o).is_none());
        assert_eq!(policy.check(&d, 51, &o).unwrap().reason, "frequent");
    }

    #[test]
    fn test_inverted_window_rejected() {
        let policy = SkipPolicy {
            min_count: Some(10),
            max_count: Some(5),
            ..SkipPolicy::none()
        };
        assert_eq!(
            policy.validate(),
            Err(PolicyError::CountWindow { min: 10, max: 5 })
        );
    }

    #[test]
    fn test_policy_from_toml() {
        let text = r#"
min_count = 2

[[rules]]
reason = "admin"
when = { kind = "uri_contains", pattern = "/admin/" }
"#;
        let policy: SkipPolicy = toml::from_str(text).unwrap();
        assert_eq!(policy.min_count, Some(2));
        assert_eq!(policy.max_count, None);
        assert_eq!(policy.rules.len(), 1);
        assert!(policy.check(&get("/admin/x"), 5, &origins()).is_some());
    }
}
