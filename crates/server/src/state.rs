use std::sync::Arc;

use sqlx::SqlitePool;

use bugwatch_core::Config;
use bugwatch_ingest::{Ingestor, RunDispatcher};

pub struct AppState {
    pub pool: SqlitePool,
    pub ingestor: Arc<Ingestor>,
    pub dispatcher: RunDispatcher,
    pub config: Config,
}

impl AppState {
    pub fn new(pool: SqlitePool, ingestor: Arc<Ingestor>, config: Config) -> Self {
        let dispatcher = RunDispatcher::new(ingestor.clone(), config.scheduler.max_manual_runs as usize);
        Self { pool, ingestor, dispatcher, config }
    }
}
