use roster_sync::config::SyncConfig;
use roster_sync::engine::SyncEngine;
use roster_sync::select::{choose_source, SourceChoice};

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "roster-sync")]
#[command(about = "Synchronize the Master personnel roster with a Source snapshot")]
#[command(version)]
struct Args {
    /// Master dataset directory (one CSV file per relation)
    master: PathBuf,

    /// Source snapshot directory (or set ROSTER_SYNC_SOURCE); prompted for when absent
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// JSON config file (or set ROSTER_SYNC_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reconcile in memory only: no audit flush, no save
    #[arg(long)]
    dry_run: bool,

    /// Write the run report as JSON to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    if !args.master.exists() {
        eprintln!("Error: Master dataset {} not found", args.master.display());
        return ExitCode::FAILURE;
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Synchronization failed");
            eprintln!("\nFatal error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = SyncConfig::resolve(args.config.as_deref()).context("Failed to load sync config")?;

    // Cancelling is fatal: nothing is flushed or saved and the exit status is non-zero
    let source = choose_source(args.source, &args.master)
        .and_then(SourceChoice::into_path)
        .context("Failed to select Source snapshot")?;

    info!("Roster sync starting");
    let mut engine = SyncEngine::tabular(config);
    let report = engine
        .run(&args.master, &source, args.dry_run)
        .with_context(|| format!("Failed to synchronize {} from {}", args.master.display(), source.display()))?;

    println!("\n=== Sync Report ===");
    println!("{}", report);

    if let Some(path) = args.report {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        std::fs::write(&path, json).with_context(|| format!("Failed to write report {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    Ok(())
}
