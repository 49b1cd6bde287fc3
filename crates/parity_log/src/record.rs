//! Captured request records.
//!
//! A [`CaptureRecord`] is validated once when it is pulled out of the
//! stream; everything downstream works with named optional fields instead
//! of poking at raw JSON.

use crate::stream::{JsonObject, ObjectStream, StreamError, StreamStats};
use parity_core::{RequestDescriptor, UNKNOWN_PROTO};
use serde::Deserialize;
use std::io::BufRead;
use thiserror::Error;
use tracing::debug;

const FORWARDED_PROTO: &str = "X-Forwarded-Proto";
const AUTHORIZATION: &str = "Authorization";
const ACCEPT: &str = "Accept";

/// Record extraction errors
#[derive(Debug, Error)]
pub enum RecordError {
    /// Object has the right shape but wrong field types
    #[error("Malformed capture record: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One captured log entry, as far as request replay cares
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CaptureRecord {
    /// Request method, when the entry is a request
    #[serde(rename = "http_http_request_method")]
    pub method: Option<String>,
    /// Raw request URI
    #[serde(rename = "http_http_request_uri")]
    pub uri: Option<String>,
    /// Raw header lines
    #[serde(rename = "http_http_request_line", default)]
    pub header_lines: Vec<String>,
}

impl CaptureRecord {
    /// Extract a record from a parsed JSON object
    ///
    /// # Errors
    ///
    /// Returns error if a known field has the wrong JSON type
    pub fn from_object(object: JsonObject) -> Result<Self, RecordError> {
        Ok(serde_json::from_value(serde_json::Value::Object(object))?)
    }

    /// Whether the record describes an HTTP request
    #[must_use]
    pub fn is_request(&self) -> bool {
        self.method.is_some()
    }

    /// Value of the first `"{name}: value\r\n"` header line.
    ///
    /// Matching is case-sensitive on the header name. The two trailing
    /// characters (the `\r\n` terminator) are removed.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_lines.iter().find_map(|line| {
            let value = line.strip_prefix(name)?.strip_prefix(": ")?;
            Some(drop_last_chars(value, 2))
        })
    }

    /// Canonical descriptor; `None` for records that are not requests
    #[must_use]
    pub fn into_descriptor(self) -> Option<RequestDescriptor> {
        let method = self.method.as_deref()?.trim();
        let uri = self.uri.as_deref().map(str::trim).unwrap_or_default();
        Some(RequestDescriptor::canonicalize(
            method,
            Some(self.header(FORWARDED_PROTO).unwrap_or(UNKNOWN_PROTO)),
            uri,
            self.header(AUTHORIZATION),
            self.header(ACCEPT),
        ))
    }
}

fn drop_last_chars(value: &str, count: usize) -> &str {
    let cut = value
        .char_indices()
        .rev()
        .nth(count - 1)
        .map_or(0, |(idx, _)| idx);
    &value[..cut]
}

/// Counters for request extraction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestStats {
    /// Underlying stream counters
    pub stream: StreamStats,
    /// Requests produced
    pub requests: u64,
    /// Objects that were not requests
    pub non_requests: u64,
    /// Objects whose fields had the wrong types
    pub malformed: u64,
}

/// Iterator of canonical requests from a capture log
pub struct RequestStream<R> {
    objects: ObjectStream<R>,
    requests: u64,
    non_requests: u64,
    malformed: u64,
}

impl<R: BufRead> RequestStream<R> {
    /// Wrap an object stream
    #[must_use]
    pub fn new(objects: ObjectStream<R>) -> Self {
        Self {
            objects,
            requests: 0,
            non_requests: 0,
            malformed: 0,
        }
    }

    /// Counters so far
    #[must_use]
    pub fn stats(&self) -> RequestStats {
        RequestStats {
            stream: self.objects.stats(),
            requests: self.requests,
            non_requests: self.non_requests,
            malformed: self.malformed,
        }
    }
}

impl<R: BufRead> Iterator for RequestStream<R> {
    type Item = Result<RequestDescriptor, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let object = match self.objects.next()? {
                Ok(object) => object,
                Err(err) => return Some(Err(err)),
            };
            let record = match CaptureRecord::from_object(object) {
                Ok(record) => record,
                Err(err) => {
                    debug!(error = %err, "skipping malformed capture record");
                    self.malformed += 1;
                    continue;
                }
            };
            match record.into_descriptor() {
                Some(descriptor) => {
                    self.requests += 1;
                    return Some(Ok(descriptor));
                }
                None => self.non_requests += 1,
            }
        }
    }
}
