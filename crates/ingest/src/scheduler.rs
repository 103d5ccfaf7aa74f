//! Interval-driven scheduler loop for automatic saved searches.
//!
//! Every wake it writes the service heartbeat, selects automatic searches
//! whose `next_execution_at` is unset or past, and runs them one after the
//! other. A failing search is logged and rescheduled like any other, so it
//! cannot stall the loop or retry in a tight loop.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use bugwatch_core::config::SchedulerConfig;
use bugwatch_core::schedule::next_execution;
use bugwatch_storage::{HeartbeatStore, SavedSearch, SavedSearchStore};

use crate::pipeline::{log_run_result, Ingestor, RunOutcome, Trigger};

/// What one scheduler cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub due: usize,
    pub completed: usize,
    pub empty: usize,
    pub failed: usize,
}

pub struct Scheduler {
    ingestor: Arc<Ingestor>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(ingestor: Arc<Ingestor>, config: SchedulerConfig) -> Self {
        Self { ingestor, config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Wake on the configured interval until `shutdown` resolves.
    ///
    /// A cycle in progress always finishes; shutdown is only observed between
    /// cycles.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let wake = self.config.wake_interval();
        info!(
            service = %self.config.service_name,
            wake_secs = wake.as_secs(),
            "scheduler started"
        );

        let mut ticker = tokio::time::interval(wake);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
            }
        }
        info!(service = %self.config.service_name, "scheduler stopped");
    }

    /// One wake: heartbeat first, then every due search.
    pub async fn run_cycle(&self) -> CycleReport {
        let pool = self.ingestor.pool();
        let now = self.ingestor.now();
        let mut report = CycleReport::default();

        if let Err(e) = HeartbeatStore::beat(pool, &self.config.service_name, now).await {
            warn!(service = %self.config.service_name, error = %e, "scheduler: heartbeat write failed");
        }

        let due = match SavedSearchStore::find_due(pool, now).await {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "scheduler: failed to query due searches");
                return report;
            }
        };
        report.due = due.len();
        debug!(due = report.due, "scheduler: woke");

        for search in due {
            match self.execute(&search).await {
                Some(RunOutcome::Completed { .. }) => report.completed += 1,
                Some(RunOutcome::Empty) => report.empty += 1,
                None => report.failed += 1,
            }
        }

        if report.due > 0 {
            info!(
                due = report.due,
                completed = report.completed,
                empty = report.empty,
                failed = report.failed,
                "scheduler: cycle finished"
            );
        }
        report
    }

    /// Run one search and advance its schedule whatever the outcome.
    async fn execute(&self, search: &SavedSearch) -> Option<RunOutcome> {
        let started_at = self.ingestor.now();
        info!(search_id = search.id, search = %search.name, "scheduler: running search");

        let result = self.ingestor.run_search(search).await;
        log_run_result(search.id, Trigger::Scheduled, &result);

        let next = next_execution(search.next_execution_at, started_at, search.interval_hours);
        if let Err(e) = SavedSearchStore::record_scheduled_run(
            self.ingestor.pool(),
            search.id,
            started_at,
            search.next_execution_at,
            next,
        )
        .await
        {
            warn!(search_id = search.id, error = %e, "scheduler: failed to update run timestamps");
        }

        result.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{automatic_search, fixture, search_request, t0, Fixture};
    use bugwatch_core::schedule::FAR_FUTURE_DAYS;
    use bugwatch_core::ScheduleMode;
    use bugwatch_storage::{ExecutionStore, HistoryStore, SavedSearchStore};
    use chrono::Duration;
    use serde_json::json;

    fn scheduler(ingestor: Arc<Ingestor>) -> Scheduler {
        Scheduler::new(ingestor, SchedulerConfig::default())
    }

    #[tokio::test]
    async fn heartbeat_is_written_even_when_nothing_is_due() {
        let Fixture { pool, ingestor, .. } = fixture().await;
        let report = scheduler(ingestor).run_cycle().await;
        assert_eq!(report, CycleReport::default());

        let hb = HeartbeatStore::get(&pool, "scheduler").await.unwrap().unwrap();
        assert_eq!(hb.last_heartbeat, t0());
    }

    #[tokio::test]
    async fn empty_first_run_records_attempt_without_execution_record() {
        let Fixture { pool, ingestor, clock, .. } = fixture().await;
        // Created a day ago with a 24h interval: due exactly now.
        clock.set(t0() - Duration::hours(24));
        let search = SavedSearchStore::create(
            &pool,
            search_request("daily", None, ScheduleMode::Automatic, Some(24.0)),
            t0() - Duration::hours(24),
        )
        .await
        .unwrap();
        clock.set(t0());

        let report = scheduler(ingestor).run_cycle().await;
        assert_eq!(report.empty, 1);

        let after = SavedSearchStore::require(&pool, search.id).await.unwrap();
        assert_eq!(after.last_executed_at, Some(t0()));
        assert_eq!(after.next_execution_at, Some(t0() + Duration::hours(24)));
        assert_eq!(ExecutionStore::count_for_search(&pool, search.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failing_search_does_not_stop_the_others() {
        let Fixture { pool, tracker, ingestor, .. } = fixture().await;
        let broken = automatic_search(&pool, "broken", None, None).await;
        let healthy = automatic_search(&pool, "healthy", None, None).await;
        tracker.fail_search(&broken.query_url, "boom");
        tracker.set_search(&healthy.query_url, vec![7]);
        tracker.set_record(7, json!({"status": "NEW"}));

        let report = scheduler(ingestor).run_cycle().await;
        assert_eq!(report, CycleReport { due: 2, completed: 1, empty: 0, failed: 1 });

        // The failed search was still marked attempted and pushed out.
        let after = SavedSearchStore::require(&pool, broken.id).await.unwrap();
        assert_eq!(after.last_executed_at, Some(t0()));
        assert_eq!(after.next_execution_at, Some(t0() + Duration::days(FAR_FUTURE_DAYS)));
        assert_eq!(ExecutionStore::count_for_search(&pool, healthy.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_interval_is_not_due_again_in_the_same_cycle() {
        let Fixture { pool, ingestor, .. } = fixture().await;
        automatic_search(&pool, "no-interval", None, Some(0.0)).await;
        let sched = scheduler(ingestor);

        assert_eq!(sched.run_cycle().await.due, 1);
        assert_eq!(sched.run_cycle().await.due, 0);
    }

    #[tokio::test]
    async fn schedule_does_not_drift_with_wake_jitter() {
        let Fixture { pool, ingestor, clock, .. } = fixture().await;
        let search = automatic_search(&pool, "hourly", None, Some(1.0)).await;
        let initial = search.next_execution_at.unwrap();
        let sched = scheduler(ingestor);

        for n in 1..=6i32 {
            let jitter = Duration::seconds(i64::from(n) * 7);
            clock.set(initial + Duration::hours(i64::from(n - 1)) + jitter);
            assert_eq!(sched.run_cycle().await.due, 1);

            let after = SavedSearchStore::require(&pool, search.id).await.unwrap();
            assert_eq!(after.next_execution_at, Some(initial + Duration::hours(i64::from(n))));
        }
    }

    #[tokio::test]
    async fn manual_searches_are_never_picked_up() {
        let Fixture { pool, ingestor, .. } = fixture().await;
        SavedSearchStore::create(&pool, search_request("adhoc", None, ScheduleMode::Manual, Some(1.0)), t0())
            .await
            .unwrap();
        assert_eq!(scheduler(ingestor).run_cycle().await.due, 0);
    }

    #[tokio::test]
    async fn repeated_runs_keep_latest_view_stable() {
        let Fixture { pool, tracker, ingestor, clock } = fixture().await;
        let search = automatic_search(&pool, "stable", None, None).await;
        tracker.set_search(&search.query_url, vec![1]);
        tracker.set_record(1, json!({"status": "NEW"}));

        ingestor.run(search.id).await.unwrap();
        clock.advance(Duration::minutes(1));
        ingestor.run(search.id).await.unwrap();

        assert_eq!(HistoryStore::snapshot_count(&pool).await.unwrap(), 2);
        let history = HistoryStore::field_history(&pool, 1, "status").await.unwrap();
        assert!(history.iter().all(|h| h.field_value == "NEW"));
    }

    #[tokio::test]
    async fn loop_runs_a_cycle_and_stops_on_shutdown() {
        let Fixture { pool, ingestor, .. } = fixture().await;
        let sched = Arc::new(scheduler(ingestor));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn({
            let sched = sched.clone();
            async move {
                sched
                    .run_until(async {
                        let _ = rx.await;
                    })
                    .await
            }
        });

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        tx.send(()).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();

        assert!(HeartbeatStore::get(&pool, "scheduler").await.unwrap().is_some());
    }
}
