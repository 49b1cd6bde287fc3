//! Streaming byte comparison of two response bodies.
//!
//! Both sides are read in fixed-size chunks and compared as they arrive.
//! Only the unconsumed tail plus `context` bytes of look-behind are kept
//! in memory, so bodies never need to be fully resident.

use parity_core::{Backend, ComparisonOutcome, Divergence};
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read};
use thiserror::Error;

/// Default read size per side
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Default number of context bytes either side of a divergence
pub const DEFAULT_CONTEXT_SIZE: usize = 10;

/// Comparison I/O failure
#[derive(Debug, Error)]
pub enum CompareError {
    /// A body could not be opened
    #[error("Cannot open body from backend {backend}: {reason}")]
    Open {
        /// Side that failed
        backend: Backend,
        /// Why
        reason: String,
    },
    /// A body could not be read
    #[error("Cannot read body from backend {backend}: {source}")]
    Read {
        /// Side that failed
        backend: Backend,
        /// Underlying error
        source: std::io::Error,
    },
}

/// Comparator configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparator {
    /// Bytes requested per read
    pub chunk_size: usize,
    /// Context bytes kept either side of the first difference
    pub context_size: usize,
}

impl Default for Comparator {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            context_size: DEFAULT_CONTEXT_SIZE,
        }
    }
}

/// One input plus its buffered window
struct Side<R> {
    backend: Backend,
    reader: R,
    /// Absolute offset of `buf[0]`
    start: u64,
    buf: Vec<u8>,
    eof: bool,
}

impl<R: Read> Side<R> {
    fn new(backend: Backend, reader: R) -> Self {
        Self {
            backend,
            reader,
            start: 0,
            buf: Vec::new(),
            eof: false,
        }
    }

    /// Absolute offset one past the last buffered byte
    fn end(&self) -> u64 {
        self.start + self.buf.len() as u64
    }

    fn fill(&mut self, chunk_size: usize) -> Result<(), CompareError> {
        if self.eof {
            return Ok(());
        }
        let old_len = self.buf.len();
        self.buf.resize(old_len + chunk_size, 0);
        let read = loop {
            match self.reader.read(&mut self.buf[old_len..]) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(source) => {
                    self.buf.truncate(old_len);
                    return Err(CompareError::Read {
                        backend: self.backend,
                        source,
                    });
                }
            }
        };
        self.buf.truncate(old_len + read);
        self.eof = read == 0;
        Ok(())
    }

    /// Read until `end` is buffered or the input is exhausted
    fn fill_to(&mut self, end: u64, chunk_size: usize) -> Result<(), CompareError> {
        while !self.eof && self.end() < end {
            self.fill(chunk_size)?;
        }
        Ok(())
    }

    /// Bytes at `pos..` that are buffered
    fn tail(&self, pos: u64) -> &[u8] {
        let offset = usize::try_from(pos.saturating_sub(self.start)).unwrap_or(usize::MAX);
        self.buf.get(offset..).unwrap_or_default()
    }

    /// Buffered bytes in `[from, to)`, truncated at end of data
    fn window(&self, from: u64, to: u64) -> Vec<u8> {
        let to = to.min(self.end());
        if from >= to {
            return Vec::new();
        }
        let tail = self.tail(from);
        tail[..usize::try_from(to - from).unwrap_or(tail.len()).min(tail.len())].to_vec()
    }

    /// Drop buffered bytes before `pos`
    fn release_before(&mut self, pos: u64) {
        let drop = usize::try_from(pos.saturating_sub(self.start))
            .unwrap_or(usize::MAX)
            .min(self.buf.len());
        self.buf.drain(..drop);
        self.start += drop as u64;
    }
}

impl Comparator {
    /// Create with explicit sizes; zero sizes fall back to defaults
    #[must_use]
    pub fn new(chunk_size: usize, context_size: usize) -> Self {
        Self {
            chunk_size: if chunk_size == 0 {
                DEFAULT_CHUNK_SIZE
            } else {
                chunk_size
            },
            context_size,
        }
    }

    /// Compare two byte streams.
    ///
    /// Returns [`ComparisonOutcome::Identical`], [`ComparisonOutcome::Different`]
    /// for the first differing byte, or [`ComparisonOutcome::LengthMismatch`]
    /// when one stream is a strict prefix of the other.
    ///
    /// # Errors
    ///
    /// Returns error if either stream fails to read
    pub fn compare<A: Read, B: Read>(&self, a: A, b: B) -> Result<ComparisonOutcome, CompareError> {
        let mut a = Side::new(Backend::A, a);
        let mut b = Side::new(Backend::B, b);
        let mut pos: u64 = 0;

        loop {
            if a.end() == pos {
                a.fill(self.chunk_size)?;
            }
            if b.end() == pos {
                b.fill(self.chunk_size)?;
            }

            let (tail_a, tail_b) = (a.tail(pos), b.tail(pos));
            if tail_a.is_empty() && tail_b.is_empty() {
                return Ok(ComparisonOutcome::Identical);
            }
            if tail_a.is_empty() || tail_b.is_empty() {
                let divergence = self.divergence(&mut a, &mut b, pos)?;
                return Ok(ComparisonOutcome::LengthMismatch(divergence));
            }

            let common = tail_a.len().min(tail_b.len());
            let first_diff = tail_a[..common]
                .iter()
                .zip(&tail_b[..common])
                .position(|(x, y)| x != y);
            if let Some(idx) = first_diff {
                let divergence = self.divergence(&mut a, &mut b, pos + idx as u64)?;
                return Ok(ComparisonOutcome::Different(divergence));
            }

            pos += common as u64;
            let keep_from = pos.saturating_sub(self.context_size as u64);
            a.release_before(keep_from);
            b.release_before(keep_from);
        }
    }

    /// Compare two in-memory bodies
    #[must_use]
    pub fn compare_bytes(&self, a: &[u8], b: &[u8]) -> ComparisonOutcome {
        // Slices never fail to read
        self.compare(a, b)
            .unwrap_or_else(|err| ComparisonOutcome::Unresolved {
                error: err.to_string(),
            })
    }

    fn divergence<A: Read, B: Read>(
        &self,
        a: &mut Side<A>,
        b: &mut Side<B>,
        position: u64,
    ) -> Result<Divergence, CompareError> {
        let context = self.context_size as u64;
        let window_start = position.saturating_sub(context);
        let window_end = position + context + 1;
        a.fill_to(window_end, self.chunk_size)?;
        b.fill_to(window_end, self.chunk_size)?;
        Ok(Divergence {
            position,
            window_start,
            context_a: a.window(window_start, window_end),
            context_b: b.window(window_start, window_end),
        })
    }
}
