//! Named-blob artifact stores.
//!
//! Each backend gets its own store. Artifact names are flat file names
//! (`{fingerprint}.{suffix}`); stores never see directories.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Cursor, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use tracing::warn;

/// Store result type
pub type StoreResult<T> = Result<T, StoreError>;

/// Store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Artifact directory for backend A
    pub dir_a: PathBuf,
    /// Artifact directory for backend B
    pub dir_b: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir_a: PathBuf::from("artifacts/a"),
            dir_b: PathBuf::from("artifacts/b"),
        }
    }
}

/// Store error
#[derive(Debug, Error)]
pub enum StoreError {
    /// Artifact not found
    #[error("Artifact not found: {name}")]
    NotFound {
        /// Artifact name
        name: String,
    },
    /// Name would escape the store or is empty
    #[error("Invalid artifact name: {name:?}")]
    InvalidName {
        /// Rejected name
        name: String,
    },
    /// IO error
    #[error("IO error on {name}: {source}")]
    Io {
        /// Artifact or directory involved
        name: String,
        /// Underlying error
        source: std::io::Error,
    },
}

/// A namespace of named byte blobs
pub trait ArtifactStore: Send + Sync {
    /// Human-readable location of an artifact, for reports
    fn location(&self, name: &str) -> String;

    /// Create or replace an artifact
    ///
    /// # Errors
    ///
    /// Returns error if the name is invalid or the write fails
    fn write(&self, name: &str, data: &[u8]) -> StoreResult<()>;

    /// Open an artifact for streaming reads
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if absent
    fn open(&self, name: &str) -> StoreResult<Box<dyn Read + Send>>;

    /// Remove an artifact; `Ok(false)` if it did not exist
    ///
    /// # Errors
    ///
    /// Returns error if removal fails for another reason
    fn delete(&self, name: &str) -> StoreResult<bool>;

    /// Names starting with `prefix`, sorted
    ///
    /// # Errors
    ///
    /// Returns error if the namespace cannot be listed
    fn list(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Best-effort removal of every artifact starting with `prefix`.
    ///
    /// Individual failures are logged and skipped; returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns error only if the namespace cannot be listed
    fn delete_prefix(&self, prefix: &str) -> StoreResult<usize> {
        let mut removed = 0;
        for name in self.list(prefix)? {
            match self.delete(&name) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(err) => warn!(artifact = %self.location(&name), error = %err, "failed to delete artifact"),
            }
        }
        Ok(removed)
    }
}

fn validate_name(name: &str) -> StoreResult<()> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\'])
        || name.contains("..");
    if invalid {
        return Err(StoreError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Directory-backed store
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    dir: PathBuf,
}

impl FsArtifactStore {
    /// Create a store rooted at `dir`, creating it if needed
    ///
    /// # Errors
    ///
    /// Returns error if directory creation fails
    pub fn new(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            name: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// Root directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> StoreResult<PathBuf> {
        validate_name(name)?;
        Ok(self.dir.join(name))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn location(&self, name: &str) -> String {
        self.dir.join(name).display().to_string()
    }

    fn write(&self, name: &str, data: &[u8]) -> StoreResult<()> {
        let path = self.path(name)?;
        std::fs::write(&path, data).map_err(|source| StoreError::Io {
            name: name.to_string(),
            source,
        })
    }

    fn open(&self, name: &str) -> StoreResult<Box<dyn Read + Send>> {
        let path = self.path(name)?;
        match File::open(&path) {
            Ok(file) => Ok(Box::new(file)),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StoreError::NotFound {
                name: name.to_string(),
            }),
            Err(source) => Err(StoreError::Io {
                name: name.to_string(),
                source,
            }),
        }
    }

    fn delete(&self, name: &str) -> StoreResult<bool> {
        let path = self.path(name)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Io {
                name: name.to_string(),
                source,
            }),
        }
    }

    fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let io_err = |source| StoreError::Io {
            name: self.dir.display().to_string(),
            source,
        };
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with(prefix) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    namespace: String,
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryArtifactStore {
    /// Create an empty store; `namespace` only shows up in locations
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            blobs: RwLock::new(BTreeMap::new()),
        }
    }

    /// Copy of an artifact's bytes
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Number of artifacts held
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn location(&self, name: &str) -> String {
        format!("{}/{}", self.namespace, name)
    }

    fn write(&self, name: &str, data: &[u8]) -> StoreResult<()> {
        validate_name(name)?;
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn open(&self, name: &str) -> StoreResult<Box<dyn Read + Send>> {
        validate_name(name)?;
        let data = self.get(name).ok_or_else(|| StoreError::NotFound {
            name: name.to_string(),
        })?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn delete(&self, name: &str) -> StoreResult<bool> {
        validate_name(name)?;
        Ok(self
            .blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some())
    }

    fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }
}
