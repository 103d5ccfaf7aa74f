//! Fire-and-forget "run now" execution.
//!
//! [`RunDispatcher::trigger`] checks the search exists, registers a
//! [`ManualRun`] in the in-memory registry and spawns the pipeline on a
//! background task; the caller gets the run id back immediately. A
//! semaphore bounds how many manual runs execute at once.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use bugwatch_storage::{RunCounts, SavedSearch, SavedSearchStore};

use crate::error::IngestError;
use crate::pipeline::{log_run_result, Ingestor, RunOutcome, Trigger};

/// Finished runs kept in the registry before the oldest are dropped.
const MAX_TRACKED_RUNS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

/// A manually triggered run as seen by the API.
#[derive(Debug, Clone, Serialize)]
pub struct ManualRun {
    pub id: Uuid,
    pub search_id: i64,
    pub search_name: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub counts: Option<RunCounts>,
    pub error: Option<String>,
}

type Registry = Arc<RwLock<IndexMap<Uuid, ManualRun>>>;

#[derive(Clone)]
pub struct RunDispatcher {
    ingestor: Arc<Ingestor>,
    permits: Arc<Semaphore>,
    runs: Registry,
}

impl RunDispatcher {
    pub fn new(ingestor: Arc<Ingestor>, max_concurrent: usize) -> Self {
        Self {
            ingestor,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            runs: Arc::new(RwLock::new(IndexMap::new())),
        }
    }

    /// Queue a run of `search_id` and return its id without waiting for it.
    pub async fn trigger(&self, search_id: i64) -> Result<Uuid, IngestError> {
        let search = SavedSearchStore::get(self.ingestor.pool(), search_id)
            .await?
            .ok_or(IngestError::SearchNotFound(search_id))?;

        let run = ManualRun {
            id: Uuid::new_v4(),
            search_id,
            search_name: search.name.clone(),
            status: RunStatus::Pending,
            created_at: self.ingestor.now(),
            started_at: None,
            completed_at: None,
            counts: None,
            error: None,
        };
        let run_id = run.id;
        self.register(run)?;

        info!(%run_id, search_id, search = %search.name, "manual run queued");

        let this = self.clone();
        tokio::spawn(async move {
            this.execute(run_id, search).await;
        });
        Ok(run_id)
    }

    pub fn get(&self, run_id: Uuid) -> Option<ManualRun> {
        self.read().get(&run_id).cloned()
    }

    /// Registered runs, most recent first.
    pub fn list(&self) -> Vec<ManualRun> {
        self.read().values().rev().cloned().collect()
    }

    async fn execute(&self, run_id: Uuid, search: SavedSearch) {
        let _permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                self.update(run_id, |run| {
                    run.status = RunStatus::Failed;
                    run.error = Some(format!("run executor closed: {e}"));
                });
                return;
            }
        };

        let started_at = self.ingestor.now();
        self.update(run_id, |run| {
            run.status = RunStatus::Running;
            run.started_at = Some(started_at);
        });

        let result = self.ingestor.run_search(&search).await;
        log_run_result(search.id, Trigger::Manual, &result);

        if let Err(e) =
            SavedSearchStore::record_manual_run(self.ingestor.pool(), search.id, started_at).await
        {
            warn!(%run_id, search_id = search.id, error = %e, "failed to update last_executed_at");
        }

        let completed_at = self.ingestor.now();
        self.update(run_id, |run| {
            run.completed_at = Some(completed_at);
            match &result {
                Ok(RunOutcome::Completed { counts, .. }) => {
                    run.status = RunStatus::Completed;
                    run.counts = Some(*counts);
                }
                Ok(RunOutcome::Empty) => {
                    run.status = RunStatus::Completed;
                    run.counts = Some(RunCounts::default());
                }
                Err(e) => {
                    run.status = RunStatus::Failed;
                    run.error = Some(e.to_string());
                }
            }
        });
    }

    /// Add a run, evicting the oldest finished runs to stay within
    /// [`MAX_TRACKED_RUNS`]. Fails when every tracked run is still unfinished.
    fn register(&self, run: ManualRun) -> Result<(), IngestError> {
        let mut runs = self.write();
        while runs.len() >= MAX_TRACKED_RUNS {
            let Some(oldest) = runs
                .iter()
                .find(|(_, r)| r.status.is_finished())
                .map(|(id, _)| *id)
            else {
                warn!(search_id = run.search_id, "manual run rejected, too many unfinished runs");
                return Err(IngestError::TooManyRuns(MAX_TRACKED_RUNS));
            };
            runs.shift_remove(&oldest);
        }
        runs.insert(run.id, run);
        Ok(())
    }

    fn update(&self, run_id: Uuid, f: impl FnOnce(&mut ManualRun)) {
        if let Some(run) = self.write().get_mut(&run_id) {
            f(run);
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, IndexMap<Uuid, ManualRun>> {
        self.runs.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, IndexMap<Uuid, ManualRun>> {
        self.runs.write().unwrap_or_else(|p| p.into_inner())
    }
}
