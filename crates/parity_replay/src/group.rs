//! Deduplication and path grouping.
//!
//! Identical descriptors are counted; the distinct ones are then grouped by
//! URL path so that each endpoint is represented by its most frequent
//! variant, with the rarer variants replayed right after it.

use indexmap::IndexMap;
use parity_core::RequestDescriptor;
use serde::Serialize;

/// A distinct request and how often it was captured
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Counted {
    /// The request
    pub descriptor: RequestDescriptor,
    /// Occurrences in the capture log
    pub count: u64,
}

/// All distinct requests sharing a URL path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathGroup {
    /// Shared path
    pub path: String,
    /// Most frequent request for the path
    pub representative: Counted,
    /// The rest, by descending count
    pub siblings: Vec<Counted>,
}

impl PathGroup {
    /// Distinct requests in the group
    #[must_use]
    pub fn len(&self) -> usize {
        1 + self.siblings.len()
    }

    /// Always false; a group has at least its representative
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Occurrence map keyed by descriptor, in first-seen order
#[derive(Debug, Clone, Default)]
pub struct OccurrenceCounter {
    counts: IndexMap<RequestDescriptor, u64>,
    total: u64,
}

impl OccurrenceCounter {
    /// Empty counter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one occurrence
    pub fn record(&mut self, descriptor: RequestDescriptor) {
        *self.counts.entry(descriptor).or_insert(0) += 1;
        self.total += 1;
    }

    /// Distinct descriptors
    #[must_use]
    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    /// All occurrences recorded
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Distinct requests by descending count; ties keep first-seen order
    #[must_use]
    pub fn into_sorted(self) -> Vec<Counted> {
        let mut sorted: Vec<Counted> = self
            .counts
            .into_iter()
            .map(|(descriptor, count)| Counted { descriptor, count })
            .collect();
        sorted.sort_by(|x, y| y.count.cmp(&x.count));
        sorted
    }

    /// Sort and group in one step
    #[must_use]
    pub fn into_groups(self) -> Vec<PathGroup> {
        group_by_path(self.into_sorted())
    }
}

impl FromIterator<RequestDescriptor> for OccurrenceCounter {
    fn from_iter<I: IntoIterator<Item = RequestDescriptor>>(iter: I) -> Self {
        let mut counter = Self::new();
        for descriptor in iter {
            counter.record(descriptor);
        }
        counter
    }
}

/// Group a count-sorted list by path.
///
/// The first entry seen for a path becomes its representative. Groups are
/// ordered by representative count, descending, ties in first-seen order.
#[must_use]
pub fn group_by_path(sorted: Vec<Counted>) -> Vec<PathGroup> {
    let mut by_path: IndexMap<String, PathGroup> = IndexMap::new();
    for counted in sorted {
        let path = counted.descriptor.path().to_string();
        match by_path.get_mut(&path) {
            Some(group) => group.siblings.push(counted),
            None => {
                by_path.insert(
                    path.clone(),
                    PathGroup {
                        path,
                        representative: counted,
                        siblings: Vec::new(),
                    },
                );
            }
        }
    }
    let mut groups: Vec<PathGroup> = by_path.into_values().collect();
    groups.sort_by(|x, y| y.representative.count.cmp(&x.representative.count));
    groups
}
