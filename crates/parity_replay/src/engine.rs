//! Replay orchestration.
//!
//! Each distinct request is one unit: replay against A, replay against B,
//! compare the persisted bodies, apply the exclusion table, then keep or
//! delete the evidence. Up to `concurrency` units are in flight at once; a
//! slow unit holds back report lines behind it but never new work. Results
//! are reported in path-group order regardless of completion order.

use crate::diff::{CompareError, Comparator, DEFAULT_CHUNK_SIZE, DEFAULT_CONTEXT_SIZE};
use crate::group::{Counted, PathGroup};
use crate::report::{BackendSummary, EntryKind, EntryRole, ReportEntry, RunSummary};
use crate::transport::{HttpTransport, OutboundRequest, TransportError};
use futures::stream::{self, StreamExt};
use parity_core::{
    Backend, ComparisonOutcome, Fingerprint, Origins, ReplayResult, RequestDescriptor, BODY_CAP,
};
use parity_policy::{Candidate, ExclusionPolicy, SkipPolicy};
use parity_storage::{
    artifact_prefix, write_request, write_response, ArtifactKind, ArtifactLifecycle, ArtifactPair,
    BodyExtension, StoreError,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Replay configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Body bytes kept and compared per response
    pub body_cap: usize,
    /// Comparator read size
    pub chunk_size: usize,
    /// Comparator context bytes
    pub context_size: usize,
    /// Units in flight at once
    pub concurrency: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            body_cap: BODY_CAP,
            chunk_size: DEFAULT_CHUNK_SIZE,
            context_size: DEFAULT_CONTEXT_SIZE,
            concurrency: 1,
        }
    }
}

/// Failure replaying one request against one backend
#[derive(Debug, Error)]
pub enum ReplayError {
    /// No usable response
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Evidence could not be written
    #[error("Artifact write failed: {0}")]
    Store(#[from] StoreError),
}

/// One schedulable piece of work, in report order
enum Unit {
    Skip(Counted, String),
    Replay(Counted, EntryRole),
}

/// Drives replay, comparison and retention for a set of path groups
pub struct ReplayEngine {
    transport: Arc<dyn HttpTransport>,
    lifecycle: ArtifactLifecycle,
    origins: Origins,
    exclusions: ExclusionPolicy,
    skip: SkipPolicy,
    config: ReplayConfig,
}

impl ReplayEngine {
    /// Create with built-in exclusion and skip tables
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, stores: ArtifactPair, origins: Origins) -> Self {
        Self {
            transport,
            lifecycle: ArtifactLifecycle::new(stores),
            origins,
            exclusions: ExclusionPolicy::default(),
            skip: SkipPolicy::default(),
            config: ReplayConfig::default(),
        }
    }

    /// Replace the configuration
    #[must_use]
    pub fn with_config(mut self, config: ReplayConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the exclusion table
    #[must_use]
    pub fn with_exclusions(mut self, exclusions: ExclusionPolicy) -> Self {
        self.exclusions = exclusions;
        self
    }

    /// Replace the skip policy
    #[must_use]
    pub fn with_skip_policy(mut self, skip: SkipPolicy) -> Self {
        self.skip = skip;
        self
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    fn stores(&self) -> &ArtifactPair {
        self.lifecycle.stores()
    }

    fn plan(&self, groups: Vec<PathGroup>) -> Vec<Unit> {
        let mut units = Vec::new();
        for group in groups {
            let representative = group.representative;
            if let Some(decision) =
                self.skip
                    .check(&representative.descriptor, representative.count, &self.origins)
            {
                debug!(path = %group.path, reason = %decision.reason, "skipping path group");
                units.push(Unit::Skip(representative, decision.reason));
                continue;
            }
            units.push(Unit::Replay(representative, EntryRole::Representative));
            units.extend(
                group
                    .siblings
                    .into_iter()
                    .map(|sibling| Unit::Replay(sibling, EntryRole::Sibling)),
            );
        }
        units
    }

    /// Replay every group, handing each report entry to `on_entry` in order.
    ///
    /// Per-request failures are reported and never stop the run.
    pub async fn run<F>(&self, groups: Vec<PathGroup>, mut on_entry: F) -> RunSummary
    where
        F: FnMut(&ReportEntry),
    {
        let mut summary = RunSummary {
            groups: groups.len() as u64,
            ..RunSummary::default()
        };
        let units = self.plan(groups);
        info!(
            units = units.len(),
            concurrency = self.config.concurrency,
            "starting replay"
        );

        let mut entries = stream::iter(units.into_iter().enumerate())
            .map(|(index, unit)| async move { (index, self.execute(unit).await) })
            .buffer_unordered(self.config.concurrency.max(1));

        // Completed entries wait here until every earlier unit has reported
        let mut finished = BTreeMap::new();
        let mut next = 0;
        while let Some((index, entry)) = entries.next().await {
            finished.insert(index, entry);
            while let Some(entry) = finished.remove(&next) {
                summary.record(&entry);
                on_entry(&entry);
                next += 1;
            }
        }
        summary
    }

    async fn execute(&self, unit: Unit) -> ReportEntry {
        match unit {
            Unit::Skip(counted, reason) => ReportEntry {
                role: EntryRole::Representative,
                fingerprint: counted.descriptor.fingerprint(),
                descriptor: counted.descriptor,
                count: counted.count,
                kind: EntryKind::Skipped { reason },
            },
            Unit::Replay(counted, role) => {
                let fingerprint = counted.descriptor.fingerprint();
                let kind = self.replay_unit(&counted.descriptor, &fingerprint).await;
                ReportEntry {
                    role,
                    fingerprint,
                    descriptor: counted.descriptor,
                    count: counted.count,
                    kind,
                }
            }
        }
    }

    /// Replay one request against both backends and classify it
    pub async fn replay_unit(
        &self,
        descriptor: &RequestDescriptor,
        fingerprint: &Fingerprint,
    ) -> EntryKind {
        let mut results = Vec::with_capacity(Backend::ALL.len());
        for backend in Backend::ALL {
            match self.replay_one(descriptor, fingerprint, backend).await {
                Ok(result) => results.push(result),
                Err(err) => {
                    warn!(%fingerprint, %backend, error = %err, "replay failed; artifacts retained");
                    return EntryKind::Failed {
                        completed: results.iter().map(BackendSummary::of).collect(),
                        backend,
                        error: err.to_string(),
                    };
                }
            }
        }
        let (a, b) = (&results[0], &results[1]);

        let outcome = match self.compare_artifacts(a, b) {
            Ok(raw) => self
                .exclusions
                .evaluate(&Candidate::new(descriptor, a, b), raw),
            Err(err) => {
                warn!(%fingerprint, error = %err, "comparison unresolved; artifacts retained");
                ComparisonOutcome::Unresolved {
                    error: err.to_string(),
                }
            }
        };
        let retention = self.lifecycle.apply(fingerprint, &outcome);
        debug!(%fingerprint, marker = outcome.marker(), ?retention, "request classified");

        EntryKind::Compared {
            a: BackendSummary::of(a),
            b: BackendSummary::of(b),
            outcome,
            retention,
        }
    }

    async fn replay_one(
        &self,
        descriptor: &RequestDescriptor,
        fingerprint: &Fingerprint,
        backend: Backend,
    ) -> Result<ReplayResult, ReplayError> {
        let store = self.stores().store(backend);
        let stale = store.delete_prefix(&artifact_prefix(fingerprint))?;
        if stale > 0 {
            debug!(%fingerprint, %backend, stale, "removed artifacts of an earlier run");
        }
        let request = OutboundRequest::for_backend(descriptor, &self.origins, backend);
        write_request(store, fingerprint, &request.to_curl())?;

        let started = Instant::now();
        let response = self.transport.send(&request, self.config.body_cap).await?;
        let elapsed = started.elapsed();

        let content_type = response
            .headers
            .get("content-type")
            .map(String::as_str)
            .unwrap_or_default();
        let extension = BodyExtension::from_content_type(content_type);
        let result = ReplayResult {
            backend,
            status: response.status,
            headers: response.headers,
            body: response.body,
            truncated: response.truncated,
            elapsed,
            body_artifact: ArtifactKind::Body(extension).name(fingerprint),
        };
        write_response(store, fingerprint, &result)?;
        debug!(
            %fingerprint,
            %backend,
            status = result.status,
            elapsed_ms = elapsed.as_millis() as u64,
            "replayed"
        );
        Ok(result)
    }

    /// Compares the persisted bodies, not the in-memory copies
    fn compare_artifacts(
        &self,
        a: &ReplayResult,
        b: &ReplayResult,
    ) -> Result<ComparisonOutcome, CompareError> {
        let open = |result: &ReplayResult| {
            self.stores()
                .store(result.backend)
                .open(&result.body_artifact)
                .map_err(|err| CompareError::Open {
                    backend: result.backend,
                    reason: err.to_string(),
                })
        };
        let comparator = Comparator::new(self.config.chunk_size, self.config.context_size);
        comparator.compare(open(a)?, open(b)?)
    }
}
