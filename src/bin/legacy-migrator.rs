//! # Legacy Migrator
//!
//! Command-line worker that drains the migration work queue into file assets.
//! Run several instances against the same database to parallelize; Ctrl-C
//! stops the run after the item in flight.

use anyhow::Context;
use clap::Parser;
use migrator_core::config::ConfigManager;
use migrator_core::converters::FileAssetConverter;
use migrator_core::logging::init_structured_logging;
use migrator_core::migration::{MigrationController, StopHandle};
use migrator_core::queue::{PgWorkQueue, WorkQueueStore};
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "legacy-migrator")]
#[command(about = "Migrate legacy file records into file assets")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file (default: config/migrator.toml)
    #[arg(short, long, env = "MIGRATOR_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Worker identity recorded on claimed items
    #[arg(short, long)]
    worker_id: Option<String>,

    /// Override the configured batch size
    #[arg(short, long)]
    batch_size: Option<u32>,

    /// Return ERROR items to PENDING before the run starts
    #[arg(long)]
    reset_errors: bool,

    /// Do not apply the bundled schema migrations
    #[arg(long)]
    skip_migrations: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_structured_logging();

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!(error = %format!("{e:#}"), "Legacy migrator aborted");
            process::exit(2);
        }
    }
}

/// Returns whether the run ended without a batch-scoped failure
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let manager = match &cli.config {
        Some(path) => ConfigManager::load_from_path(path),
        None => ConfigManager::load(),
    };
    let mut config = manager.config().clone();
    if let Some(batch_size) = cli.batch_size {
        config.migration.batch_size = batch_size;
    }
    let worker_id = cli
        .worker_id
        .clone()
        .unwrap_or_else(|| manager.resolve_worker_id());

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(&config.database_url)
        .await
        .context("connecting to the migration database")?;

    if cli.skip_migrations {
        warn!("Skipping schema migrations");
    } else {
        PgWorkQueue::run_migrations(&pool)
            .await
            .context("applying work queue schema")?;
    }

    let store = Arc::new(PgWorkQueue::with_load_query(
        pool,
        config.migration.load_query.clone(),
    ));

    if cli.reset_errors {
        let reset = store
            .reset_errored()
            .await
            .context("resetting errored work items")?;
        info!(reset, "Errored work items returned to pending");
    }

    let controller = Arc::new(MigrationController::new(
        store,
        Arc::new(FileAssetConverter::default()),
        config.migration,
        worker_id,
    ));

    let stop = StopHandle::new();
    let signal_stop = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown signal received; stopping after the current item");
            signal_stop.stop();
        }
    });

    let report = controller
        .spawn(stop)
        .await
        .context("migration task panicked")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report.is_success())
}
