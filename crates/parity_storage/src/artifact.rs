//! Artifact naming and rendering.
//!
//! Every replayed request leaves up to four artifacts per backend, all
//! named after the request fingerprint:
//!
//! | Artifact            | Contents                                         |
//! |---------------------|--------------------------------------------------|
//! | `{fp}.req`          | curl command that reproduces the request         |
//! | `{fp}.status`       | status code                                      |
//! | `{fp}.info`         | status, headers as JSON, elapsed seconds         |
//! | `{fp}.out[.ext]`    | response body, capped                            |

use crate::store::{ArtifactStore, StoreResult};
use parity_core::{Fingerprint, ReplayResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Body file extension chosen from the response content type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyExtension {
    /// `application/json`
    Json,
    /// `text/csv`
    Csv,
    /// `application/rss+xml`
    Rss,
    /// `application/xml`
    Xml,
    /// Anything else
    None,
}

impl BodyExtension {
    /// Classify a `Content-Type` value.
    ///
    /// JSON must match exactly; the others match as prefixes so that
    /// `; charset=...` parameters are tolerated.
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type == "application/json" {
            Self::Json
        } else if content_type.starts_with("text/csv") {
            Self::Csv
        } else if content_type.starts_with("application/rss+xml") {
            Self::Rss
        } else if content_type.starts_with("application/xml") {
            Self::Xml
        } else {
            debug!(content_type, "unrecognised content type; body stored without extension");
            Self::None
        }
    }

    /// Suffix appended after `.out`, including the dot
    #[must_use]
    pub const fn suffix(&self) -> &'static str {
        match self {
            Self::Json => ".json",
            Self::Csv => ".csv",
            Self::Rss => ".rss",
            Self::Xml => ".xml",
            Self::None => "",
        }
    }
}

/// Kind of artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Reproducing curl command
    Request,
    /// Status code
    Status,
    /// Status, headers and timing
    Info,
    /// Response body
    Body(BodyExtension),
}

impl ArtifactKind {
    /// Artifact name for a fingerprint
    #[must_use]
    pub fn name(&self, fingerprint: &Fingerprint) -> String {
        format!("{fingerprint}{self}")
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => f.write_str(".req"),
            Self::Status => f.write_str(".status"),
            Self::Info => f.write_str(".info"),
            Self::Body(ext) => write!(f, ".out{}", ext.suffix()),
        }
    }
}

/// Prefix shared by every artifact of a fingerprint
#[must_use]
pub fn artifact_prefix(fingerprint: &Fingerprint) -> String {
    format!("{fingerprint}.")
}

/// Contents of the `.info` artifact
///
/// # Errors
///
/// Returns error if the headers cannot be serialized
pub fn render_info(result: &ReplayResult) -> Result<String, serde_json::Error> {
    let headers = serde_json::to_string_pretty(&result.headers)?;
    Ok(format!(
        "{}\n{}\n{}\n",
        result.status,
        headers,
        result.elapsed_display()
    ))
}

/// Write the response artifacts of one replay.
///
/// The `.req` artifact is written before the request is sent; see
/// [`write_request`].
///
/// # Errors
///
/// Returns error if any artifact cannot be written
pub fn write_response(
    store: &dyn ArtifactStore,
    fingerprint: &Fingerprint,
    result: &ReplayResult,
) -> StoreResult<()> {
    store.write(
        &ArtifactKind::Status.name(fingerprint),
        format!("{}\n", result.status).as_bytes(),
    )?;
    // Header maps of strings always serialize
    let info = render_info(result).unwrap_or_else(|_| format!("{}\n", result.status));
    store.write(&ArtifactKind::Info.name(fingerprint), info.as_bytes())?;
    store.write(&result.body_artifact, &result.body)
}

/// Write the `.req` artifact
///
/// # Errors
///
/// Returns error if the artifact cannot be written
pub fn write_request(
    store: &dyn ArtifactStore,
    fingerprint: &Fingerprint,
    curl: &str,
) -> StoreResult<()> {
    store.write(
        &ArtifactKind::Request.name(fingerprint),
        format!("{curl}\n").as_bytes(),
    )
}
