//! Configuration file and flag merging.
//!
//! Every section of the TOML file is optional. Command-line flags win over
//! the file, and the file wins over built-in defaults.

use parity_core::Origins;
use parity_policy::{ExclusionPolicy, PolicyError, SkipPolicy};
use parity_replay::{ReplayConfig, TransportConfig};
use parity_storage::StoreConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File unreadable
    #[error("Cannot read config {path}: {source}")]
    Read {
        /// Config path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
    /// File is not valid TOML for this schema
    #[error("Invalid config {path}: {source}")]
    Parse {
        /// Config path
        path: PathBuf,
        /// Underlying error
        source: toml::de::Error,
    },
    /// A required value is missing everywhere
    #[error("Missing {what}: pass {flag} or set it in the config file")]
    Missing {
        /// Value description
        what: &'static str,
        /// Flag that supplies it
        flag: &'static str,
    },
    /// Rule tables are inconsistent
    #[error(transparent)]
    Policy(#[from] PolicyError),
    /// Zero concurrency
    #[error("Concurrency must be at least 1")]
    Concurrency,
}

/// `[origins]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OriginsSection {
    /// Backend A base URL
    pub a: Option<String>,
    /// Backend B base URL
    pub b: Option<String>,
}

/// `[output]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSection {
    /// Artifact directory for A
    pub dir_a: Option<PathBuf>,
    /// Artifact directory for B
    pub dir_b: Option<PathBuf>,
}

/// Parsed TOML file
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Backend origins
    pub origins: OriginsSection,
    /// Artifact directories
    pub output: OutputSection,
    /// Replay tuning
    pub replay: Option<ReplayConfig>,
    /// HTTP client tuning
    pub transport: Option<TransportConfig>,
    /// Exclusion table; replaces the built-in one when present
    pub exclusions: Option<ExclusionPolicy>,
    /// Skip policy; omitted fields keep their defaults
    pub skip: Option<SkipPolicy>,
}

impl FileConfig {
    /// Load from disk
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// `--origin-a`
    pub origin_a: Option<String>,
    /// `--origin-b`
    pub origin_b: Option<String>,
    /// `--out-a`
    pub out_a: Option<PathBuf>,
    /// `--out-b`
    pub out_b: Option<PathBuf>,
    /// `--concurrency`
    pub concurrency: Option<usize>,
    /// `--timeout-secs`
    pub timeout_secs: Option<u64>,
    /// `--min-count`
    pub min_count: Option<u64>,
    /// `--max-count`
    pub max_count: Option<u64>,
    /// `--no-exclusions`
    pub no_exclusions: bool,
}

/// Fully resolved run settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Backend origins
    pub origins: Origins,
    /// Artifact directories
    pub stores: StoreConfig,
    /// Replay tuning
    pub replay: ReplayConfig,
    /// HTTP client tuning
    pub transport: TransportConfig,
    /// Exclusion table
    pub exclusions: ExclusionPolicy,
    /// Skip policy
    pub skip: SkipPolicy,
}

impl Settings {
    /// Merge flags over file over defaults
    ///
    /// # Errors
    ///
    /// Returns error if an origin is missing or a rule table is invalid
    pub fn resolve(file: FileConfig, flags: Overrides) -> Result<Self, ConfigError> {
        let origin_a = flags.origin_a.or(file.origins.a).ok_or(ConfigError::Missing {
            what: "origin of backend A",
            flag: "--origin-a",
        })?;
        let origin_b = flags.origin_b.or(file.origins.b).ok_or(ConfigError::Missing {
            what: "origin of backend B",
            flag: "--origin-b",
        })?;

        let default_stores = StoreConfig::default();
        let stores = StoreConfig {
            dir_a: flags
                .out_a
                .or(file.output.dir_a)
                .unwrap_or(default_stores.dir_a),
            dir_b: flags
                .out_b
                .or(file.output.dir_b)
                .unwrap_or(default_stores.dir_b),
        };

        let mut replay = file.replay.unwrap_or_default();
        if let Some(concurrency) = flags.concurrency {
            replay.concurrency = concurrency;
        }
        if replay.concurrency == 0 {
            return Err(ConfigError::Concurrency);
        }

        let mut transport = file.transport.unwrap_or_default();
        if let Some(timeout_secs) = flags.timeout_secs {
            transport.timeout_secs = timeout_secs;
        }

        let exclusions = if flags.no_exclusions {
            ExclusionPolicy::empty()
        } else {
            file.exclusions.unwrap_or_default()
        };
        exclusions.validate()?;

        let mut skip = file.skip.unwrap_or_default();
        if flags.min_count.is_some() {
            skip.min_count = flags.min_count;
        }
        if flags.max_count.is_some() {
            skip.max_count = flags.max_count;
        }
        skip.validate()?;

        Ok(Self {
            origins: Origins::new(origin_a, origin_b),
            stores,
            replay,
            transport,
            exclusions,
            skip,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origins_only() -> Overrides {
        Overrides {
            origin_a: Some("https://a.example/".to_string()),
            origin_b: Some("https://b.example/".to_string()),
            ..Overrides::default()
        }
    }

    #[test]
    fn test_defaults_with_origin_flags() {
        let settings = Settings::resolve(FileConfig::default(), origins_only()).unwrap();
        assert_eq!(settings.origins.a, "https://a.example/");
        assert_eq!(settings.stores, StoreConfig::default());
        assert_eq!(settings.replay.concurrency, 1);
        assert_eq!(settings.transport.timeout_secs, 60);
        assert_eq!(settings.exclusions, ExclusionPolicy::builtin());
        assert_eq!(settings.skip, SkipPolicy::default());
    }

    #[test]
    fn test_missing_origin() {
        let err = Settings::resolve(FileConfig::default(), Overrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { flag: "--origin-a", .. }));
    }

    #[test]
    fn test_file_config_and_flag_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parity.toml");
        std::fs::write(
            &path,
            r#"
[origins]
a = "https://legacy.example/"
b = "https://candidate.example/"

[output]
dir_a = "out/legacy"

[replay]
concurrency = 8

[skip]
max_count = 100

[[exclusions.rules]]
name = "feed"
action = "known_issue"
reason = "feed encoding differs"
when = { kind = "uri_contains", pattern = "/feed/" }
"#,
        )
        .unwrap();

        let file = FileConfig::load(&path).unwrap();
        let flags = Overrides {
            origin_b: Some("http://localhost:8080/".to_string()),
            concurrency: Some(2),
            min_count: Some(3),
            ..Overrides::default()
        };
        let settings = Settings::resolve(file, flags).unwrap();
        assert_eq!(settings.origins.a, "https://legacy.example/");
        assert_eq!(settings.origins.b, "http://localhost:8080/");
        assert_eq!(settings.stores.dir_a, PathBuf::from("out/legacy"));
        assert_eq!(settings.stores.dir_b, StoreConfig::default().dir_b);
        assert_eq!(settings.replay.concurrency, 2);
        assert_eq!(settings.replay.chunk_size, 8192);
        assert_eq!(settings.exclusions.rules.len(), 1);
        assert_eq!(settings.skip.min_count, Some(3));
        assert_eq!(settings.skip.max_count, Some(100));
        assert_eq!(settings.skip.rules, SkipPolicy::default().rules);
    }

    #[test]
    fn test_no_exclusions_flag() {
        let flags = Overrides {
            no_exclusions: true,
            ..origins_only()
        };
        let settings = Settings::resolve(FileConfig::default(), flags).unwrap();
        assert!(settings.exclusions.rules.is_empty());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let flags = Overrides {
            concurrency: Some(0),
            ..origins_only()
        };
        assert!(matches!(
            Settings::resolve(FileConfig::default(), flags),
            Err(ConfigError::Concurrency)
        ));

        let flags = Overrides {
            min_count: Some(9),
            max_count: Some(1),
            ..origins_only()
        };
        assert!(matches!(
            Settings::resolve(FileConfig::default(), flags),
            Err(ConfigError::Policy(PolicyError::CountWindow { .. }))
        ));
    }

    #[test]
    fn test_sample_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/parity.toml");
        let file = FileConfig::load(&path).unwrap();
        let settings = Settings::resolve(file, Overrides::default()).unwrap();
        assert_eq!(settings.origins.b, "http://localhost:8080/");
        assert_eq!(settings.replay.concurrency, 4);
        assert_eq!(settings.skip.rules, SkipPolicy::default().rules);
        assert_eq!(settings.skip.min_count, Some(2));
        assert_eq!(settings.exclusions.rules.len(), 3);
    }

    #[test]
    fn test_unknown_section_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[origin]\na = \"x\"\n").unwrap();
        assert!(matches!(
            FileConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
