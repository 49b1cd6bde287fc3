//! Classification of a compared request.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Location of the first differing byte, with context from both sides
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    /// Absolute offset of the first difference
    pub position: u64,
    /// Offset where both context windows start
    pub window_start: u64,
    /// Bytes of A around `position` (truncated at end of data)
    pub context_a: Vec<u8>,
    /// Bytes of B around `position` (truncated at end of data)
    pub context_b: Vec<u8>,
}

impl Divergence {
    /// Render a context window as an escaped byte string literal
    #[must_use]
    pub fn escape(bytes: &[u8]) -> String {
        format!("b\"{}\"", bytes.escape_ascii())
    }
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "@{}\t{} != {}",
            self.position,
            Self::escape(&self.context_a),
            Self::escape(&self.context_b)
        )
    }
}

/// Result of comparing two replays of the same request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOutcome {
    /// Bodies are byte-identical, or equivalent by policy
    Identical,
    /// Bodies differ at a byte both sides have
    Different(Divergence),
    /// One body is a strict prefix of the other
    LengthMismatch(Divergence),
    /// Mismatch suppressed by a named exclusion rule
    ExcludedKnownIssue {
        /// Rule that matched
        rule: String,
        /// Why the mismatch is accepted
        reason: String,
    },
    /// Both backends answered with status >= 300
    BothErrored,
    /// Artifacts could not be read back for comparison
    Unresolved {
        /// I/O failure description
        error: String,
    },
}

impl ComparisonOutcome {
    /// Whether the outcome is a reportable mismatch
    #[must_use]
    pub fn is_mismatch(&self) -> bool {
        matches!(self, Self::Different(_) | Self::LengthMismatch(_))
    }

    /// Whether the outcome was silenced by policy
    #[must_use]
    pub fn is_suppressed(&self) -> bool {
        matches!(self, Self::ExcludedKnownIssue { .. } | Self::BothErrored)
    }

    /// Whether the request's artifacts should be discarded
    #[must_use]
    pub fn discards_artifacts(&self) -> bool {
        matches!(self, Self::Identical) || self.is_suppressed()
    }

    /// Divergence details for raw mismatches
    #[must_use]
    pub fn divergence(&self) -> Option<&Divergence> {
        match self {
            Self::Different(d) | Self::LengthMismatch(d) => Some(d),
            _ => None,
        }
    }

    /// Console marker for the report line
    #[must_use]
    pub const fn marker(&self) -> &'static str {
        match self {
            Self::Identical => "==",
            Self::ExcludedKnownIssue { .. } => "<>",
            Self::BothErrored => "XX",
            Self::Different(_) | Self::LengthMismatch(_) => "!=",
            Self::Unresolved { .. } => "??",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn divergence() -> Divergence {
        Divergence {
            position: 3,
            window_start: 0,
            context_a: b"abcdef".to_vec(),
            context_b: b"abcXef".to_vec(),
        }
    }

    #[test]
    fn test_markers() {
        assert_eq!(ComparisonOutcome::Identical.marker(), "==");
        assert_eq!(ComparisonOutcome::BothErrored.marker(), "XX");
        assert_eq!(ComparisonOutcome::Different(divergence()).marker(), "!=");
        let excluded = ComparisonOutcome::ExcludedKnownIssue {
            rule: "r".to_string(),
            reason: "why".to_string(),
        };
        assert_eq!(excluded.marker(), "<>");
    }

    #[test]
    fn test_retention_classes() {
        assert!(ComparisonOutcome::Identical.discards_artifacts());
        assert!(ComparisonOutcome::BothErrored.discards_artifacts());
        assert!(!ComparisonOutcome::Different(divergence()).discards_artifacts());
        let unresolved = ComparisonOutcome::Unresolved {
            error: "gone".to_string(),
        };
        assert!(!unresolved.discards_artifacts());
        assert!(!unresolved.is_mismatch());
    }

    #[test]
    fn test_divergence_display() {
        let rendered = divergence().to_string();
        assert_eq!(rendered, "@3\tb\"abcdef\" != b\"abcXef\"");
    }

    #[test]
    fn test_escape_non_ascii() {
        assert_eq!(Divergence::escape(b"a\n\xff"), "b\"a\\n\\xff\"");
    }
}
