//! Evidence retention.
//!
//! Artifacts of identical or suppressed requests are deleted from both
//! stores; everything else is left on disk for inspection.

use crate::artifact::artifact_prefix;
use crate::store::ArtifactStore;
use parity_core::{Backend, ComparisonOutcome, Fingerprint};
use std::sync::Arc;
use tracing::{debug, warn};

/// The two per-backend stores
#[derive(Clone)]
pub struct ArtifactPair {
    a: Arc<dyn ArtifactStore>,
    b: Arc<dyn ArtifactStore>,
}

impl ArtifactPair {
    /// Pair two stores
    #[must_use]
    pub fn new(a: Arc<dyn ArtifactStore>, b: Arc<dyn ArtifactStore>) -> Self {
        Self { a, b }
    }

    /// Store for a backend
    #[must_use]
    pub fn store(&self, backend: Backend) -> &dyn ArtifactStore {
        match backend {
            Backend::A => self.a.as_ref(),
            Backend::B => self.b.as_ref(),
        }
    }
}

impl std::fmt::Debug for ArtifactPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactPair")
            .field("a", &self.a.location(""))
            .field("b", &self.b.location(""))
            .finish()
    }
}

/// What happened to a request's artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Kept for inspection
    Retained,
    /// Deleted from both stores
    Discarded {
        /// Artifacts removed across both stores
        removed: usize,
    },
}

/// Applies the retention rule after each comparison
#[derive(Debug, Clone)]
pub struct ArtifactLifecycle {
    stores: ArtifactPair,
}

impl ArtifactLifecycle {
    /// Create over a store pair
    #[must_use]
    pub fn new(stores: ArtifactPair) -> Self {
        Self { stores }
    }

    /// Underlying stores
    #[must_use]
    pub fn stores(&self) -> &ArtifactPair {
        &self.stores
    }

    /// Keep or delete artifacts according to `outcome`
    pub fn apply(&self, fingerprint: &Fingerprint, outcome: &ComparisonOutcome) -> Retention {
        if outcome.discards_artifacts() {
            Retention::Discarded {
                removed: self.discard(fingerprint),
            }
        } else {
            debug!(%fingerprint, marker = outcome.marker(), "retaining artifacts");
            Retention::Retained
        }
    }

    /// Delete every artifact of `fingerprint` from both stores.
    ///
    /// Missing artifacts are fine; failures are logged and never abort the run.
    pub fn discard(&self, fingerprint: &Fingerprint) -> usize {
        let prefix = artifact_prefix(fingerprint);
        Backend::ALL
            .iter()
            .map(|&backend| match self.stores.store(backend).delete_prefix(&prefix) {
                Ok(removed) => removed,
                Err(err) => {
                    warn!(%fingerprint, %backend, error = %err, "failed to discard artifacts");
                    0
                }
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FsArtifactStore, MemoryArtifactStore};
    use parity_core::Divergence;

    fn fp(last: u8) -> Fingerprint {
        Fingerprint::from_bytes([0xab, 0, 0, 0, 0, 0, 0, last])
    }

    fn seeded() -> (Arc<MemoryArtifactStore>, Arc<MemoryArtifactStore>, ArtifactLifecycle) {
        let a = Arc::new(MemoryArtifactStore::new("a"));
        let b = Arc::new(MemoryArtifactStore::new("b"));
        for store in [&a, &b] {
            for last in [1, 2] {
                let fp = fp(last);
                store.write(&format!("{fp}.req"), b"curl").unwrap();
                store.write(&format!("{fp}.out.json"), b"{}").unwrap();
            }
        }
        let lifecycle = ArtifactLifecycle::new(ArtifactPair::new(a.clone(), b.clone()));
        (a, b, lifecycle)
    }

    #[test]
    fn test_identical_discards_both_sides() {
        let (a, b, lifecycle) = seeded();
        let retention = lifecycle.apply(&fp(1), &ComparisonOutcome::Identical);
        assert_eq!(retention, Retention::Discarded { removed: 4 });
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 2);
        assert!(a.list(&fp(1).to_hex()).unwrap().is_empty());
    }

    #[test]
    fn test_suppressed_discards() {
        let (_, _, lifecycle) = seeded();
        let excluded = ComparisonOutcome::ExcludedKnownIssue {
            rule: "rule".to_string(),
            reason: "known".to_string(),
        };
        assert!(matches!(
            lifecycle.apply(&fp(1), &excluded),
            Retention::Discarded { .. }
        ));
        assert!(matches!(
            lifecycle.apply(&fp(2), &ComparisonOutcome::BothErrored),
            Retention::Discarded { .. }
        ));
    }

    #[test]
    fn test_mismatch_retains() {
        let (a, b, lifecycle) = seeded();
        let outcome = ComparisonOutcome::Different(Divergence {
            position: 0,
            window_start: 0,
            context_a: b"a".to_vec(),
            context_b: b"b".to_vec(),
        });
        assert_eq!(lifecycle.apply(&fp(1), &outcome), Retention::Retained);
        assert_eq!(a.len(), 4);
        assert_eq!(b.len(), 4);
    }

    #[test]
    fn test_discard_missing_is_not_an_error() {
        let (_, _, lifecycle) = seeded();
        assert_eq!(lifecycle.discard(&fp(9)), 0);
    }

    #[test]
    fn test_discard_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let a = Arc::new(FsArtifactStore::new(dir.path().join("a")).unwrap());
        let b = Arc::new(FsArtifactStore::new(dir.path().join("b")).unwrap());
        let fp = fp(1);
        a.write(&format!("{fp}.req"), b"curl").unwrap();
        a.write(&format!("{fp}.status"), b"200\n").unwrap();
        // Only A got as far as writing
        let lifecycle = ArtifactLifecycle::new(ArtifactPair::new(a.clone(), b));
        assert_eq!(lifecycle.discard(&fp), 2);
        assert!(a.list("").unwrap().is_empty());
    }
}
