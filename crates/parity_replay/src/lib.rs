//! PARITY Replay Engine
//!
//! Deduplicates captured requests, replays them against two backends,
//! compares the responses byte for byte and reports the divergences that
//! survive the exclusion table.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod diff;
pub mod engine;
pub mod group;
pub mod report;
pub mod transport;

pub use diff::{CompareError, Comparator, DEFAULT_CHUNK_SIZE, DEFAULT_CONTEXT_SIZE};
pub use engine::{ReplayConfig, ReplayEngine, ReplayError};
pub use group::{group_by_path, Counted, OccurrenceCounter, PathGroup};
pub use report::{BackendSummary, EntryKind, EntryRole, ReportEntry, RunSummary};
pub use transport::{
    HttpTransport, OutboundRequest, ReqwestTransport, TransportConfig, TransportError,
    TransportResponse,
};
