//! Incremental JSON-object reader over a capture log.
//!
//! The capture log is newline oriented, but a single JSON object may span
//! any number of lines and unrelated noise may sit between objects. The
//! reader never holds more than one pending object in memory.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// A parsed top-level JSON object
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// Stream configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Largest pending object, in bytes, before it is dropped as a fragment
    pub max_object_bytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_object_bytes: 16 * 1024 * 1024, // 16 MB
        }
    }
}

/// Stream errors
#[derive(Debug, Error)]
pub enum StreamError {
    /// Log could not be opened
    #[error("Failed to open capture log {path}: {source}")]
    Open {
        /// Log location
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
    /// Reading failed mid-stream
    #[error("I/O error reading line {line}: {source}")]
    Io {
        /// 1-based line number being read
        line: u64,
        /// Underlying error
        source: std::io::Error,
    },
}

/// Counters describing what the reader saw
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStats {
    /// Lines read
    pub lines: u64,
    /// Objects emitted
    pub objects: u64,
    /// Lines ignored outside any object
    pub noise_lines: u64,
    /// Pending fragments dropped without ever parsing
    pub skipped_fragments: u64,
}

/// Result of trying to parse the pending buffer
enum Attempt {
    Parsed(JsonObject),
    /// Ran out of input; more lines may complete the object
    Incomplete,
    /// Invalid no matter what follows
    Dead,
}

/// Line accumulator for one pending object
#[derive(Debug)]
struct Accumulator {
    buffer: String,
    max_bytes: usize,
}

impl Accumulator {
    fn new(max_bytes: usize) -> Self {
        Self {
            buffer: String::new(),
            max_bytes,
        }
    }

    fn push_line(&mut self, line: &str, stats: &mut StreamStats) -> Option<JsonObject> {
        let starts_object = line.starts_with('{');
        let fresh = self.buffer.is_empty();
        if fresh && !starts_object {
            stats.noise_lines += 1;
            return None;
        }

        let trimmed = line.trim();
        self.buffer.push_str(trimmed);
        if self.buffer.len() > self.max_bytes {
            debug!(bytes = self.buffer.len(), "dropping oversized capture fragment");
            self.discard(stats);
            return None;
        }

        if !trimmed.ends_with('}') {
            return None;
        }

        match self.attempt(stats) {
            Attempt::Parsed(object) => Some(object),
            Attempt::Incomplete => None,
            Attempt::Dead => {
                self.discard(stats);
                if fresh || !starts_object {
                    return None;
                }
                // The line that killed the fragment may be a whole object itself
                self.buffer.push_str(trimmed);
                match self.attempt(stats) {
                    Attempt::Parsed(object) => Some(object),
                    Attempt::Incomplete => None,
                    Attempt::Dead => {
                        self.discard(stats);
                        None
                    }
                }
            }
        }
    }

    fn attempt(&mut self, stats: &mut StreamStats) -> Attempt {
        match serde_json::from_str::<JsonObject>(&self.buffer) {
            Ok(object) => {
                self.buffer.clear();
                stats.objects += 1;
                Attempt::Parsed(object)
            }
            Err(err) if err.is_eof() => Attempt::Incomplete,
            Err(err) => {
                debug!(error = %err, "capture fragment can never parse");
                Attempt::Dead
            }
        }
    }

    fn discard(&mut self, stats: &mut StreamStats) {
        if !self.buffer.is_empty() {
            stats.skipped_fragments += 1;
        }
        self.buffer.clear();
    }
}

/// Lazy iterator of JSON objects read from a capture log
pub struct ObjectStream<R> {
    reader: R,
    line: Vec<u8>,
    acc: Accumulator,
    stats: StreamStats,
    done: bool,
}

impl ObjectStream<BufReader<File>> {
    /// Open a capture log from the start
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StreamError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| StreamError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> ObjectStream<R> {
    /// Create a stream with default configuration
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self::with_config(reader, StreamConfig::default())
    }

    /// Create with custom configuration
    #[must_use]
    pub fn with_config(reader: R, config: StreamConfig) -> Self {
        Self {
            reader,
            line: Vec::new(),
            acc: Accumulator::new(config.max_object_bytes),
            stats: StreamStats::default(),
            done: false,
        }
    }

    /// Counters so far
    #[must_use]
    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    fn finish(&mut self) {
        self.done = true;
        if !self.acc.buffer.is_empty() {
            debug!(
                bytes = self.acc.buffer.len(),
                "dropping unterminated fragment at end of capture log"
            );
        }
        self.acc.discard(&mut self.stats);
    }
}

impl<R: BufRead> Iterator for ObjectStream<R> {
    type Item = Result<JsonObject, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            self.line.clear();
            match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) => {
                    self.finish();
                    return None;
                }
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(source) => {
                    self.done = true;
                    return Some(Err(StreamError::Io {
                        line: self.stats.lines + 1,
                        source,
                    }));
                }
            }

            self.stats.lines += 1;
            let line = String::from_utf8_lossy(&self.line);
            if let Some(object) = self.acc.push_line(&line, &mut self.stats) {
                return Some(Ok(object));
            }
        }
    }
}
