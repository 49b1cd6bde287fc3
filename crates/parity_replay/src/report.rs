//! Console report lines and run totals.

use parity_core::{Backend, ComparisonOutcome, Fingerprint, ReplayResult, RequestDescriptor};
use parity_storage::{BodyExtension, Retention};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

const SIBLING_INDENT: &str = "    ";

/// Position of a request within its path group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryRole {
    /// Most frequent request for the path
    Representative,
    /// Another request on the same path
    Sibling,
}

/// Per-backend part of a report line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendSummary {
    /// Backend
    pub backend: Backend,
    /// HTTP status
    pub status: u16,
    /// Round-trip time
    pub elapsed: Duration,
    /// Content type that mapped to no body extension
    pub unrecognised_content_type: Option<String>,
    /// Body was cut at the cap
    pub truncated: bool,
}

impl BackendSummary {
    /// Summarise a replay
    #[must_use]
    pub fn of(result: &ReplayResult) -> Self {
        let content_type = result.content_type();
        let unrecognised_content_type = (BodyExtension::from_content_type(content_type)
            == BodyExtension::None)
            .then(|| content_type.to_string());
        Self {
            backend: result.backend,
            status: result.status,
            elapsed: result.elapsed,
            unrecognised_content_type,
            truncated: result.truncated,
        }
    }
}

impl fmt::Display for BackendSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, " {} ({:.3}s)", self.status, self.elapsed.as_secs_f64())?;
        if let Some(content_type) = &self.unrecognised_content_type {
            write!(f, " ContentType: {content_type:?}")?;
        }
        Ok(())
    }
}

/// What happened to one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryKind {
    /// Filtered out before replay
    Skipped {
        /// Skip reason label
        reason: String,
    },
    /// Replayed against both backends and compared
    Compared {
        /// Backend A
        a: BackendSummary,
        /// Backend B
        b: BackendSummary,
        /// Final outcome after exclusion rules
        outcome: ComparisonOutcome,
        /// Whether artifacts were kept
        #[serde(skip)]
        retention: Retention,
    },
    /// A backend could not be reached or its artifacts not written
    Failed {
        /// Backends that answered before the failure
        completed: Vec<BackendSummary>,
        /// Backend that failed
        backend: Backend,
        /// Failure description
        error: String,
    },
}

/// One line of the console report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    /// Representative or sibling
    pub role: EntryRole,
    /// Request fingerprint
    pub fingerprint: Fingerprint,
    /// The request
    pub descriptor: RequestDescriptor,
    /// Occurrences in the capture log
    pub count: u64,
    /// Result
    pub kind: EntryKind,
}

impl ReportEntry {
    /// Whether the entry needs a human to look at it
    #[must_use]
    pub fn needs_attention(&self) -> bool {
        match &self.kind {
            EntryKind::Skipped { .. } => false,
            EntryKind::Compared { outcome, .. } => {
                outcome.is_mismatch() || matches!(outcome, ComparisonOutcome::Unresolved { .. })
            }
            EntryKind::Failed { .. } => true,
        }
    }
}

impl fmt::Display for ReportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let EntryKind::Skipped { reason } = &self.kind {
            return write!(
                f,
                "Skipping {} request {} {} {}",
                reason,
                self.descriptor.identity(),
                self.count,
                self.descriptor.to_curl(true)
            );
        }

        if self.role == EntryRole::Sibling {
            f.write_str(SIBLING_INDENT)?;
        }
        write!(
            f,
            "{}\t{}\t{}\t{}",
            self.count,
            self.fingerprint,
            self.descriptor.identity(),
            self.descriptor.uri()
        )?;

        match &self.kind {
            EntryKind::Skipped { .. } => Ok(()),
            EntryKind::Compared { a, b, outcome, .. } => {
                write!(f, "{a}{b} {}", outcome.marker())?;
                match outcome {
                    ComparisonOutcome::Different(d) | ComparisonOutcome::LengthMismatch(d) => {
                        write!(f, "\t{d}")
                    }
                    ComparisonOutcome::ExcludedKnownIssue { rule, reason } => {
                        write!(f, "\t{rule}: {reason}")
                    }
                    ComparisonOutcome::Unresolved { error } => write!(f, "\t{error}"),
                    ComparisonOutcome::Identical | ComparisonOutcome::BothErrored => Ok(()),
                }
            }
            EntryKind::Failed {
                completed,
                backend,
                error,
            } => {
                for summary in completed {
                    write!(f, "{summary}")?;
                }
                write!(f, " ??\t{backend} failed: {error}")
            }
        }
    }
}

/// Totals for a whole run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Capture records parsed into requests
    pub captured: u64,
    /// Distinct requests
    pub distinct: u64,
    /// Log lines that never became an object
    pub parse_skipped: u64,
    /// Path groups
    pub groups: u64,
    /// Requests skipped by policy
    pub skipped: u64,
    /// Identical
    pub identical: u64,
    /// Suppressed by an exclusion rule
    pub excluded: u64,
    /// Both backends errored
    pub both_errored: u64,
    /// True mismatches
    pub mismatched: u64,
    /// Comparisons that could not read artifacts
    pub unresolved: u64,
    /// Transport or storage failures
    pub failed: u64,
}

impl RunSummary {
    /// Account for one report entry
    pub fn record(&mut self, entry: &ReportEntry) {
        match &entry.kind {
            EntryKind::Skipped { .. } => self.skipped += 1,
            EntryKind::Failed { .. } => self.failed += 1,
            EntryKind::Compared { outcome, .. } => match outcome {
                ComparisonOutcome::Identical => self.identical += 1,
                ComparisonOutcome::ExcludedKnownIssue { .. } => self.excluded += 1,
                ComparisonOutcome::BothErrored => self.both_errored += 1,
                ComparisonOutcome::Different(_) | ComparisonOutcome::LengthMismatch(_) => {
                    self.mismatched += 1;
                }
                ComparisonOutcome::Unresolved { .. } => self.unresolved += 1,
            },
        }
    }

    /// Requests replayed against both backends
    #[must_use]
    pub fn compared(&self) -> u64 {
        self.identical + self.excluded + self.both_errored + self.mismatched + self.unresolved
    }

    /// Whether the run found anything that needs attention
    #[must_use]
    pub fn has_findings(&self) -> bool {
        self.mismatched > 0 || self.unresolved > 0 || self.failed > 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} requests captured, {} distinct in {} path groups ({} log fragments skipped)",
            self.captured, self.distinct, self.groups, self.parse_skipped
        )?;
        write!(
            f,
            "{} compared: {} identical, {} excluded, {} both errored, {} mismatched, {} unresolved; {} failed, {} skipped",
            self.compared(),
            self.identical,
            self.excluded,
            self.both_errored,
            self.mismatched,
            self.unresolved,
            self.failed,
            self.skipped
        )
    }
}
