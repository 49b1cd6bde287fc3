//! PARITY Capture Log
//!
//! Streaming reader for newline-oriented capture logs and extraction of
//! canonical requests from the captured records.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod record;
pub mod stream;

pub use record::{CaptureRecord, RecordError, RequestStats, RequestStream};
pub use stream::{JsonObject, ObjectStream, StreamConfig, StreamError, StreamStats};
