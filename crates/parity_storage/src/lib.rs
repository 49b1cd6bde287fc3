//! PARITY Storage
//!
//! Per-backend artifact stores, artifact naming, and the retention rule
//! that deletes evidence for requests that need no attention.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod artifact;
pub mod lifecycle;
pub mod store;

pub use artifact::{
    artifact_prefix, render_info, write_request, write_response, ArtifactKind, BodyExtension,
};
pub use lifecycle::{ArtifactLifecycle, ArtifactPair, Retention};
pub use store::{
    ArtifactStore, FsArtifactStore, MemoryArtifactStore, StoreConfig, StoreError, StoreResult,
};
