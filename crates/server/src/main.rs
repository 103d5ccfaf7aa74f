mod api;
mod router;
mod state;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use bugwatch_connector::BugzillaClient;
use bugwatch_core::{Config, SystemClock};
use bugwatch_ingest::{Ingestor, Scheduler};

use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "bugwatch-server", version, about = "Bug tracker search history service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP API.
    Serve {
        /// Also run the scheduler loop in this process.
        #[arg(long)]
        with_scheduler: bool,
    },
    /// Create the database schema and exit.
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    bugwatch_core::config::load_dotenv();
    let config = Config::from_env();
    config.validate()?;
    config.log_summary();

    match cli.command.unwrap_or(Command::Serve { with_scheduler: false }) {
        Command::Migrate => {
            // connect() applies the schema.
            bugwatch_storage::connect(&config.database).await?;
            info!("schema is up to date");
            Ok(())
        }
        Command::Serve { with_scheduler } => serve(config, with_scheduler).await,
    }
}

async fn serve(config: Config, with_scheduler: bool) -> anyhow::Result<()> {
    let pool = bugwatch_storage::connect(&config.database).await?;
    let tracker = Arc::new(BugzillaClient::new(&config.bugzilla)?);
    let ingestor = Arc::new(Ingestor::new(pool.clone(), tracker, Arc::new(SystemClock)));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler_task = if with_scheduler {
        let scheduler = Scheduler::new(ingestor.clone(), config.scheduler.clone());
        let mut rx = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            scheduler
                .run_until(async move {
                    let _ = rx.wait_for(|stop| *stop).await;
                })
                .await;
        }))
    } else {
        info!("scheduler not started in-process; run scheduler-worker separately");
        None
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(pool, ingestor, config));
    let app = router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    if let Some(task) = scheduler_task {
        task.await?;
    }
    Ok(())
}
