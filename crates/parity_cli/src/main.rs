//! PARITY CLI
//!
//! Replays captured HTTP traffic against two backends and reports where
//! their responses diverge.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;

use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use config::{FileConfig, Overrides, Settings};
use parity_log::{ObjectStream, RequestStream};
use parity_replay::{OccurrenceCounter, ReplayEngine, ReqwestTransport};
use parity_storage::{ArtifactPair, FsArtifactStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "parity=info";

#[derive(Parser, Debug)]
#[command(name = "parity")]
#[command(about = "PARITY - differential replay of captured HTTP traffic", long_about = None)]
#[command(version)]
struct Cli {
    /// Capture log of JSON request records
    log: PathBuf,

    /// Base URL of backend A; captured URIs are expressed against it
    #[arg(long, env = "PARITY_ORIGIN_A")]
    origin_a: Option<String>,

    /// Base URL of backend B
    #[arg(long, env = "PARITY_ORIGIN_B")]
    origin_b: Option<String>,

    /// Artifact directory for backend A
    #[arg(long)]
    out_a: Option<PathBuf>,

    /// Artifact directory for backend B
    #[arg(long)]
    out_b: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "PARITY_CONFIG")]
    config: Option<PathBuf>,

    /// Requests replayed at once
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Skip requests captured fewer times than this
    #[arg(long)]
    min_count: Option<u64>,

    /// Skip requests captured more times than this
    #[arg(long)]
    max_count: Option<u64>,

    /// Report every divergence, ignoring the exclusion table
    #[arg(long)]
    no_exclusions: bool,

    /// Log filter directive, e.g. `parity=debug`; overrides RUST_LOG
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            origin_a: self.origin_a.clone(),
            origin_b: self.origin_b.clone(),
            out_a: self.out_a.clone(),
            out_b: self.out_b.clone(),
            concurrency: self.concurrency,
            timeout_secs: self.timeout_secs,
            min_count: self.min_count,
            max_count: self.max_count,
            no_exclusions: self.no_exclusions,
        }
    }
}

fn init_tracing(directive: Option<&str>, json: bool) {
    let filter = match directive {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref(), cli.log_json);

    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = Settings::resolve(file, cli.overrides())?;

    let objects = ObjectStream::open(&cli.log)?;
    let mut requests = RequestStream::new(objects);
    let mut counter = OccurrenceCounter::new();
    for descriptor in requests.by_ref() {
        counter.record(descriptor.wrap_err("reading capture log")?);
    }
    let stats = requests.stats();
    info!(
        requests = stats.requests,
        distinct = counter.distinct(),
        non_requests = stats.non_requests,
        malformed = stats.malformed,
        skipped_fragments = stats.stream.skipped_fragments,
        "capture log loaded"
    );

    let distinct = counter.distinct() as u64;
    let total = counter.total();
    let groups = counter.into_groups();

    let stores = ArtifactPair::new(
        Arc::new(
            FsArtifactStore::new(settings.stores.dir_a.clone())
                .wrap_err("creating artifact directory for backend A")?,
        ),
        Arc::new(
            FsArtifactStore::new(settings.stores.dir_b.clone())
                .wrap_err("creating artifact directory for backend B")?,
        ),
    );
    let transport = Arc::new(ReqwestTransport::new(&settings.transport)?);
    let engine = ReplayEngine::new(transport, stores, settings.origins)
        .with_config(settings.replay)
        .with_exclusions(settings.exclusions)
        .with_skip_policy(settings.skip);

    let mut summary = engine.run(groups, |entry| println!("{entry}")).await;
    summary.captured = total;
    summary.distinct = distinct;
    summary.parse_skipped = stats.stream.skipped_fragments + stats.malformed;
    println!("{summary}");

    if summary.has_findings() {
        std::process::exit(1);
    }
    Ok(())
}
