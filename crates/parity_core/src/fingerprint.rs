//! Stable short hashes identifying a request.
//!
//! A fingerprint is the first 8 bytes (16 hex characters) of a SHA-256
//! digest. It names the artifacts of a request and keys the deny-lists, so
//! the hex form must never change for the same input.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Truncated SHA-256 of a request identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 8]);

impl Fingerprint {
    /// The number of bytes in a fingerprint
    pub const LEN: usize = 8;

    /// Compute the fingerprint of data
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut arr = [0u8; Self::LEN];
        arr.copy_from_slice(&digest[..Self::LEN]);
        Self(arr)
    }

    /// Create from bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Get as bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Convert to lowercase hex string
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    ///
    /// # Errors
    ///
    /// Returns error if hex is invalid or not 8 bytes
    pub fn from_hex(hex: &str) -> Result<Self, FingerprintError> {
        let bytes = hex::decode(hex).map_err(|_| FingerprintError::InvalidHex)?;
        if bytes.len() != Self::LEN {
            return Err(FingerprintError::InvalidLength(bytes.len()));
        }
        let mut arr = [0u8; Self::LEN];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl AsRef<[u8]> for Fingerprint {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Fingerprint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let hex = String::deserialize(deserializer)?;
        Self::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

/// Fingerprint parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FingerprintError {
    /// Invalid hex encoding
    #[error("Invalid hex encoding")]
    InvalidHex,
    /// Invalid length (not 8 bytes)
    #[error("Invalid fingerprint length: {0} bytes (expected 8)")]
    InvalidLength(usize),
}
