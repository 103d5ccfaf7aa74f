//! scheduler-worker: runs the saved-search scheduler loop standalone.
//!
//! Configuration comes from the environment (see `bugwatch_core::Config`);
//! the flags below override individual values.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use bugwatch_connector::BugzillaClient;
use bugwatch_core::{Config, SystemClock};
use bugwatch_ingest::{Ingestor, Scheduler};

// ── CLI ─────────────────────────────────────────────────────────────

/// Polls due saved searches and records their results.
#[derive(Parser, Debug)]
#[command(name = "scheduler-worker", version, about)]
struct Cli {
    /// Override DATABASE_URL.
    #[arg(long)]
    database_url: Option<String>,

    /// Override SCHEDULER_WAKE_INTERVAL_SECS.
    #[arg(long)]
    wake_interval_secs: Option<u64>,

    /// Run a single cycle and exit.
    #[arg(long)]
    once: bool,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    bugwatch_core::config::load_dotenv();
    let mut config = Config::from_env();
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }
    if let Some(secs) = cli.wake_interval_secs {
        config.scheduler.wake_interval_secs = secs;
    }
    config.validate()?;
    config.log_summary();

    let pool = bugwatch_storage::connect(&config.database).await?;
    let tracker = Arc::new(BugzillaClient::new(&config.bugzilla)?);
    let ingestor = Arc::new(Ingestor::new(pool.clone(), tracker, Arc::new(SystemClock)));
    let scheduler = Scheduler::new(ingestor, config.scheduler.clone());

    if cli.once {
        let report = scheduler.run_cycle().await;
        info!(?report, "single cycle finished");
    } else {
        scheduler
            .run_until(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("shutdown signal received");
            })
            .await;
    }

    pool.close().await;
    info!("scheduler-worker exited cleanly");
    Ok(())
}
