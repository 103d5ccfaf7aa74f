//! The ingestion pipeline: one saved search in, one batch of snapshots out.
//!
//! 1. Resolve the search's query to remote item ids.
//! 2. Fetch every configured column's remote field (plus the identity field)
//!    for all ids in batched calls.
//! 3. Append one snapshot per (item, present column), refresh the search's
//!    item associations and write the execution record, in one transaction.
//!
//! A search that matches nothing writes nothing.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use bugwatch_connector::{RemoteError, RemoteRecord, RemoteTracker};
use bugwatch_core::Clock;
use bugwatch_storage::{
    CatalogStore, Column, HistoryStore, ItemObservation, RunCounts, SavedSearch, SavedSearchStore,
};

use crate::error::IngestError;

/// How a run was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Scheduled,
    Manual,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Scheduled => "scheduled",
            Trigger::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Items were found and persisted.
    Completed { counts: RunCounts, execution_id: i64 },
    /// The search matched no items; nothing was written.
    Empty,
}

/// Runs saved searches against a remote tracker into the history store.
pub struct Ingestor {
    pool: SqlitePool,
    tracker: Arc<dyn RemoteTracker>,
    clock: Arc<dyn Clock>,
}

impl Ingestor {
    pub fn new(pool: SqlitePool, tracker: Arc<dyn RemoteTracker>, clock: Arc<dyn Clock>) -> Self {
        Self { pool, tracker, clock }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Load a saved search by id and run it.
    pub async fn run(&self, search_id: i64) -> Result<RunOutcome, IngestError> {
        let search = SavedSearchStore::get(&self.pool, search_id)
            .await?
            .ok_or(IngestError::SearchNotFound(search_id))?;
        self.run_search(&search).await
    }

    pub async fn run_search(&self, search: &SavedSearch) -> Result<RunOutcome, IngestError> {
        let ids = self
            .tracker
            .search(&search.query_url)
            .await
            .map_err(|source| IngestError::SearchFailed { search_id: search.id, source })?;
        let ids = dedup_ids(ids);

        if ids.is_empty() {
            info!(search_id = search.id, search = %search.name, "search matched no items");
            return Ok(RunOutcome::Empty);
        }

        let columns = CatalogStore::list_columns(&self.pool).await?;
        let identity = self.tracker.identity_field();
        let fields = requested_fields(&columns, identity);

        let records = self
            .tracker
            .fetch_fields(&ids, &fields)
            .await
            .map_err(|source| IngestError::FetchFailed { search_id: search.id, source })?;

        let observations = observations(&records, &columns, identity);
        if observations.len() < records.len() {
            warn!(
                search_id = search.id,
                skipped = records.len() - observations.len(),
                "dropped records without a usable identity field"
            );
        }

        let captured_at = self.clock.now();
        let (counts, record) =
            HistoryStore::append_run(&self.pool, search.id, &observations, captured_at).await?;

        info!(
            search_id = search.id,
            search = %search.name,
            matched = ids.len(),
            processed = counts.total_processed,
            new = counts.new_items,
            existing = counts.existing_items,
            "ingestion run persisted"
        );
        Ok(RunOutcome::Completed { counts, execution_id: record.id })
    }

    /// Run only the remote search for a descriptor; nothing is stored.
    pub async fn test_query(&self, query: &str) -> Result<Vec<i64>, RemoteError> {
        self.tracker.search(query).await.map(dedup_ids)
    }
}

/// Shared logging for run results, so scheduled and manual failures land in
/// the same place.
pub(crate) fn log_run_result(
    search_id: i64,
    trigger: Trigger,
    result: &Result<RunOutcome, IngestError>,
) {
    match result {
        Ok(RunOutcome::Completed { counts, .. }) => info!(
            search_id,
            trigger = trigger.as_str(),
            processed = counts.total_processed,
            "run completed"
        ),
        Ok(RunOutcome::Empty) => info!(search_id, trigger = trigger.as_str(), "run completed with no items"),
        Err(e) => error!(search_id, trigger = trigger.as_str(), error = %e, "run failed"),
    }
}

fn dedup_ids(ids: Vec<i64>) -> Vec<i64> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

/// Union of the columns' remote fields and the identity field, in column order.
pub(crate) fn requested_fields(columns: &[Column], identity: &str) -> Vec<String> {
    let mut fields = vec![identity.to_string()];
    for column in columns {
        if !fields.iter().any(|f| f == &column.remote_field) {
            fields.push(column.remote_field.clone());
        }
    }
    fields
}

/// One observation per distinct item; snapshot names are column names.
fn observations(records: &[RemoteRecord], columns: &[Column], identity: &str) -> Vec<ItemObservation> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter_map(|record| {
            let item_id = record.get(identity).and_then(item_id)?;
            if !seen.insert(item_id) {
                return None;
            }
            let fields = columns
                .iter()
                .filter_map(|column| {
                    record
                        .get(&column.remote_field)
                        .map(|value| (column.name.clone(), stringify(value)))
                })
                .collect();
            Some(ItemObservation { item_id, fields })
        })
        .collect()
}

fn item_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Text form of a remote field value.
///
/// Strings are stored as-is, lists of scalars are joined with ", ", null is
/// the empty string and anything else is its JSON text.
pub(crate) fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) if items.iter().all(|v| !v.is_array() && !v.is_object()) => items
            .iter()
            .map(stringify)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{column, fixture, Fixture};
    use bugwatch_storage::ExecutionStore;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn stringify_values() {
        assert_eq!(stringify(&json!("open")), "open");
        assert_eq!(stringify(&json!(42)), "42");
        assert_eq!(stringify(&json!(true)), "true");
        assert_eq!(stringify(&json!(null)), "");
        assert_eq!(stringify(&json!(["crash", "regression"])), "crash, regression");
        assert_eq!(stringify(&json!({"name": "dev"})), r#"{"name":"dev"}"#);
    }

    #[test]
    fn requested_fields_are_deduplicated_and_include_identity() {
        let columns = vec![
            column(1, "Status", "status"),
            column(2, "State", "status"),
            column(3, "Priority", "priority"),
            column(4, "Bug", "id"),
        ];
        assert_eq!(requested_fields(&columns, "id"), vec!["id", "status", "priority"]);
    }

    #[tokio::test]
    async fn run_persists_snapshots_and_execution_record() {
        let Fixture { pool, tracker, ingestor, .. } = fixture().await;
        let search = crate::test_support::automatic_search(&pool, "core", None, Some(24.0)).await;
        tracker.set_search(&search.query_url, vec![1, 2]);
        tracker.set_record(1, json!({"status": "NEW", "priority": "P1"}));
        tracker.set_record(2, json!({"status": "ASSIGNED"}));

        let outcome = ingestor.run(search.id).await.unwrap();
        let RunOutcome::Completed { counts, .. } = outcome else {
            panic!("expected a completed run, got {outcome:?}");
        };
        assert_eq!(counts, RunCounts { total_processed: 2, new_items: 2, existing_items: 0 });
        // Item 2 has no priority: only present fields are captured.
        assert_eq!(HistoryStore::snapshot_count(&pool).await.unwrap(), 3);
        assert_eq!(ExecutionStore::count_for_search(&pool, search.id).await.unwrap(), 1);
        assert_eq!(tracker.fetch_calls(), 1);
        assert_eq!(tracker.last_fields(), vec!["id", "status", "priority"]);
    }

    #[tokio::test]
    async fn empty_search_writes_nothing() {
        let Fixture { pool, tracker, ingestor, .. } = fixture().await;
        let search = crate::test_support::automatic_search(&pool, "empty", None, Some(24.0)).await;

        let outcome = ingestor.run(search.id).await.unwrap();
        assert_eq!(outcome, RunOutcome::Empty);
        assert_eq!(tracker.fetch_calls(), 0);
        assert_eq!(ExecutionStore::count_for_search(&pool, search.id).await.unwrap(), 0);
        assert_eq!(HistoryStore::snapshot_count(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn remote_failures_are_typed() {
        let Fixture { pool, tracker, ingestor, .. } = fixture().await;
        let search = crate::test_support::automatic_search(&pool, "broken", None, None).await;

        tracker.fail_search(&search.query_url, "product does not exist");
        let err = ingestor.run(search.id).await.unwrap_err();
        assert!(matches!(err, IngestError::SearchFailed { search_id, .. } if search_id == search.id));

        tracker.set_search(&search.query_url, vec![5]);
        tracker.fail_fetch(Some("timeout"));
        let err = ingestor.run(search.id).await.unwrap_err();
        assert!(matches!(err, IngestError::FetchFailed { .. }), "got: {err:?}");
        assert_eq!(ExecutionStore::count_for_search(&pool, search.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_search_is_not_found() {
        let Fixture { ingestor, .. } = fixture().await;
        let err = ingestor.run(404).await.unwrap_err();
        assert!(matches!(err, IngestError::SearchNotFound(404)));
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn second_run_counts_existing_items() {
        let Fixture { pool, tracker, ingestor, clock } = fixture().await;
        let search = crate::test_support::automatic_search(&pool, "core", None, Some(1.0)).await;
        tracker.set_search(&search.query_url, vec![1, 2, 2]);
        tracker.set_record(1, json!({"status": "NEW"}));
        tracker.set_record(2, json!({"status": "NEW"}));
        ingestor.run(search.id).await.unwrap();

        clock.advance(Duration::hours(1));
        tracker.set_search(&search.query_url, vec![2, 3]);
        tracker.set_record(3, json!({"status": "NEW"}));
        let outcome = ingestor.run(search.id).await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Completed {
                counts: RunCounts { total_processed: 2, new_items: 1, existing_items: 1 },
                execution_id: 2,
            }
        );
    }

    #[tokio::test]
    async fn test_query_does_not_store() {
        let Fixture { pool, tracker, ingestor, .. } = fixture().await;
        tracker.set_search("product=Core", vec![3, 1, 3]);
        let ids = ingestor.test_query("product=Core").await.unwrap();
        assert_eq!(ids, vec![3, 1]);
        assert_eq!(HistoryStore::snapshot_count(&pool).await.unwrap(), 0);
    }
}
