//! PARITY Core Types
//!
//! This crate contains pure types and logic with no I/O.
//! Request identity, fingerprints, backend origins and comparison outcomes
//! are shared by every other crate in the workspace.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod credential;
pub mod fingerprint;
pub mod origin;
pub mod outcome;
pub mod request;
pub mod result;

// Re-exports
pub use credential::Credential;
pub use fingerprint::{Fingerprint, FingerprintError};
pub use origin::{Backend, Origins};
pub use outcome::{ComparisonOutcome, Divergence};
pub use request::{url_path, RequestDescriptor, DEFAULT_METHOD, UNKNOWN_PROTO};
pub use result::{ReplayResult, BODY_CAP};
