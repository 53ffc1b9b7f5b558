//! bindery-ingest - organize a directory of books and comics into a store
//!
//! ```text
//! bindery-ingest <SOURCE> --store DIR [--config FILE] [--database FILE]
//!                [--concurrency N] [--actor NAME] [--offline]
//! ```
//!
//! Exits non-zero when the session ends `Failed`. Ctrl-C cancels the run;
//! files already written are kept and the session is still finalized.

use anyhow::{Context, Result};
use bindery_common::{LoggingConfig, TomlConfig};
use bindery_ingest::{ProgressEvent, SessionStatus};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for bindery-ingest
#[derive(Parser, Debug)]
#[command(name = "bindery-ingest")]
#[command(about = "Ingest books, comics and scans into an organized store")]
#[command(version)]
struct Args {
    /// Directory to ingest
    source: PathBuf,

    /// Store root the organized files are written under
    #[arg(short, long, env = "BINDERY_STORE_ROOT")]
    store: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(short, long, env = "BINDERY_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database for session records
    #[arg(long, env = "BINDERY_DATABASE")]
    database: Option<PathBuf>,

    /// Files processed in parallel (overrides config)
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Name recorded as the session's actor
    #[arg(long, default_value = "cli")]
    actor: String,

    /// Skip remote catalog lookups
    #[arg(long)]
    offline: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let mut config = TomlConfig::resolve(args.config.as_deref())
        .context("Failed to load configuration")?;
    init_tracing(&config.logging).context("Failed to initialize logging")?;

    if let Some(concurrency) = args.concurrency {
        config.pipeline.concurrency = concurrency;
    }

    let store_root = config.resolve_store_root(args.store.as_deref());
    let database = args.database.clone().or_else(|| config.database_path.clone());

    info!("Starting bindery-ingest {}", env!("CARGO_PKG_VERSION"));
    info!("Source: {}", args.source.display());
    info!("Store: {}", store_root.display());

    let pipeline = bindery_ingest::config::build_pipeline(
        &config,
        &store_root,
        database.as_deref(),
        args.offline,
    )
    .await
    .context("Failed to build pipeline")?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let mut handle = pipeline
        .run_async(&args.source, &args.actor, &cancel)
        .context("Failed to start ingestion")?;

    while let Some(event) = handle.progress.recv().await {
        log_event(&event);
    }

    let result = handle
        .wait()
        .await
        .context("Ingestion run failed")?;

    println!("Session:   {}", result.session_id);
    println!("Status:    {}", result.status);
    println!("Files:     {}", result.total_files);
    println!("Processed: {}", result.processed_files);
    println!("Skipped:   {}", result.skipped_files);
    println!("Failed:    {}", result.failed_files);
    println!("Duration:  {:.1}s", result.duration.as_secs_f64());
    for error in &result.errors {
        println!("  [{}] {}: {}", error.stage, error.file.display(), error.source);
    }
    for error in &result.secondary_errors {
        println!("  [session] {}", error);
    }

    Ok(match result.status {
        SessionStatus::Failed => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}

/// stderr, or the configured log file; `RUST_LOG` overrides the level
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    let file = logging
        .file
        .as_ref()
        .map(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))
        })
        .transpose()?;

    let (stderr_layer, file_layer) = match file {
        Some(file) => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false),
            ),
        ),
        None => (
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
            None,
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(())
}

fn log_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::RunStarted { session_id, total_files } => {
            info!(session_id = %session_id, total_files, "Run started");
        }
        ProgressEvent::FileCompleted { file_path, destination, outcome } => {
            info!(file = %file_path, destination = %destination, outcome = %outcome, "File done");
        }
        ProgressEvent::FileFailed { file_path, stage, message } => {
            warn!(file = %file_path, stage = %stage, error = %message, "File failed");
        }
        _ => {}
    }
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, cancelling run");
            cancel.cancel();
        }
        Err(e) => warn!("Failed to install Ctrl+C handler: {}", e),
    }
}
