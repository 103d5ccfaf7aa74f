//! Append-only field history and the latest-value reads built on it.
//!
//! Snapshots are never updated or deleted. The current value of a field is
//! the snapshot with the greatest `(captured_at, id)` for its item and field,
//! so ties on the capture timestamp resolve to the later write.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use crate::error::StoreError;
use crate::types::{
    ExecutionRecord, FieldSnapshot, ItemLastUpdate, ItemObservation, ItemWorkplace, LatestValue,
    RunCounts, SearchMembership, TrackedItem,
};

/// Snapshot rows per multi-row insert (4 bound parameters each).
const SNAPSHOT_INSERT_CHUNK: usize = 500;

/// Items reachable from the searches a workplace owns.
const WORKPLACE_ITEMS: &str = "SELECT DISTINCT si.item_id
    FROM search_items si
    JOIN saved_searches s ON s.id = si.search_id
    WHERE s.workplace_id = ?1";

/// Stateless store for tracked items, snapshots and search associations.
pub struct HistoryStore;

impl HistoryStore {
    /// Persist everything one pipeline run produced, atomically.
    ///
    /// Each observed item is counted as new if this run created its tracked
    /// row, existing otherwise. The search/item associations are refreshed
    /// and one execution record is written. Nothing is visible to readers
    /// until the whole run commits.
    pub async fn append_run(
        pool: &SqlitePool,
        search_id: i64,
        observations: &[ItemObservation],
        captured_at: DateTime<Utc>,
    ) -> Result<(RunCounts, ExecutionRecord), StoreError> {
        let mut tx = pool.begin().await?;
        let mut counts = RunCounts::default();

        for obs in observations {
            let created = sqlx::query(
                "INSERT INTO tracked_items (item_id, first_seen_at, last_touched_at)
                 VALUES (?1, ?2, ?2)
                 ON CONFLICT(item_id) DO NOTHING",
            )
            .bind(obs.item_id)
            .bind(captured_at)
            .execute(&mut *tx)
            .await?
            .rows_affected()
                == 1;

            if created {
                counts.new_items += 1;
            } else {
                counts.existing_items += 1;
                sqlx::query("UPDATE tracked_items SET last_touched_at = ?2 WHERE item_id = ?1")
                    .bind(obs.item_id)
                    .bind(captured_at)
                    .execute(&mut *tx)
                    .await?;
            }

            sqlx::query(
                "INSERT INTO search_items (search_id, item_id, first_seen_at, last_seen_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(search_id, item_id) DO UPDATE SET last_seen_at = excluded.last_seen_at",
            )
            .bind(search_id)
            .bind(obs.item_id)
            .bind(captured_at)
            .execute(&mut *tx)
            .await?;
        }
        counts.total_processed = counts.new_items + counts.existing_items;

        let snapshots: Vec<(i64, &str, &str)> = observations
            .iter()
            .flat_map(|obs| {
                obs.fields
                    .iter()
                    .map(move |(name, value)| (obs.item_id, name.as_str(), value.as_str()))
            })
            .collect();
        for chunk in snapshots.chunks(SNAPSHOT_INSERT_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO field_snapshots (item_id, field_name, field_value, captured_at) ",
            );
            builder.push_values(chunk, |mut row, (item_id, name, value)| {
                row.push_bind(*item_id)
                    .push_bind(*name)
                    .push_bind(*value)
                    .push_bind(captured_at);
            });
            builder.build().execute(&mut *tx).await?;
        }

        let record = sqlx::query_as::<_, ExecutionRecord>(
            "INSERT INTO execution_records (search_id, executed_at, total_processed, new_items, existing_items)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING id, search_id, executed_at, total_processed, new_items, existing_items",
        )
        .bind(search_id)
        .bind(captured_at)
        .bind(counts.total_processed)
        .bind(counts.new_items)
        .bind(counts.existing_items)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((counts, record))
    }

    pub async fn tracked_item(
        pool: &SqlitePool,
        item_id: i64,
    ) -> Result<Option<TrackedItem>, StoreError> {
        let row = sqlx::query_as::<_, TrackedItem>(
            "SELECT item_id, first_seen_at, last_touched_at FROM tracked_items WHERE item_id = ?1",
        )
        .bind(item_id)
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    /// Full history of one field of one item, newest first.
    pub async fn field_history(
        pool: &SqlitePool,
        item_id: i64,
        field_name: &str,
    ) -> Result<Vec<FieldSnapshot>, StoreError> {
        let rows = sqlx::query_as::<_, FieldSnapshot>(
            "SELECT id, item_id, field_name, field_value, captured_at
             FROM field_snapshots
             WHERE item_id = ?1 AND field_name = ?2
             ORDER BY captured_at DESC, id DESC",
        )
        .bind(item_id)
        .bind(field_name)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    pub async fn snapshot_count(pool: &SqlitePool) -> Result<i64, StoreError> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM field_snapshots")
            .fetch_one(pool)
            .await?;
        Ok(n)
    }

    /// `(search, item)` pairs for every search the workplace owns, ordered
    /// by search id then item id.
    pub async fn workplace_memberships(
        conn: &mut SqliteConnection,
        workplace_id: i64,
    ) -> Result<Vec<SearchMembership>, StoreError> {
        let rows = sqlx::query_as::<_, SearchMembership>(
            "SELECT si.search_id, si.item_id
             FROM search_items si
             JOIN saved_searches s ON s.id = si.search_id
             WHERE s.workplace_id = ?1
             ORDER BY si.search_id, si.item_id",
        )
        .bind(workplace_id)
        .fetch_all(conn)
        .await?;
        Ok(rows)
    }

    /// Current value of every visible column for every item in the workplace,
    /// in one ranked query.
    pub async fn latest_values(
        conn: &mut SqliteConnection,
        workplace_id: i64,
    ) -> Result<Vec<LatestValue>, StoreError> {
        let rows = sqlx::query_as::<_, LatestValue>(&format!(
            "WITH ranked AS (
                 SELECT fs.item_id, fs.field_name, fs.field_value, fs.captured_at,
                        ROW_NUMBER() OVER (
                            PARTITION BY fs.item_id, fs.field_name
                            ORDER BY fs.captured_at DESC, fs.id DESC
                        ) AS rn
                 FROM field_snapshots fs
                 WHERE fs.item_id IN ({WORKPLACE_ITEMS})
                   AND fs.field_name IN (
                       SELECT c.name
                       FROM bug_columns c
                       JOIN workplace_columns wc ON wc.column_id = c.id
                       WHERE wc.workplace_id = ?1 AND wc.is_visible = 1
                   )
             )
             SELECT item_id, field_name, field_value, captured_at
             FROM ranked
             WHERE rn = 1"
        ))
        .bind(workplace_id)
        .fetch_all(conn)
        .await?;
        Ok(rows)
    }

    /// Most recent capture time across all fields, per item in the workplace.
    pub async fn last_updated(
        conn: &mut SqliteConnection,
        workplace_id: i64,
    ) -> Result<Vec<ItemLastUpdate>, StoreError> {
        let rows = sqlx::query_as::<_, ItemLastUpdate>(&format!(
            "SELECT fs.item_id, MAX(fs.captured_at) AS last_updated
             FROM field_snapshots fs
             WHERE fs.item_id IN ({WORKPLACE_ITEMS})
             GROUP BY fs.item_id"
        ))
        .bind(workplace_id)
        .fetch_all(conn)
        .await?;
        Ok(rows)
    }

    /// Every workplace that owns a search containing each item, across all
    /// workplaces, for the items visible in `workplace_id`.
    pub async fn item_workplaces(
        conn: &mut SqliteConnection,
        workplace_id: i64,
    ) -> Result<Vec<ItemWorkplace>, StoreError> {
        let rows = sqlx::query_as::<_, ItemWorkplace>(&format!(
            "SELECT DISTINCT si.item_id, w.id AS workplace_id, w.name AS workplace_name
             FROM search_items si
             JOIN saved_searches s ON s.id = si.search_id
             JOIN workplaces w ON w.id = s.workplace_id
             WHERE si.item_id IN ({WORKPLACE_ITEMS})
             ORDER BY si.item_id, w.id"
        ))
        .bind(workplace_id)
        .fetch_all(conn)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;
    use crate::searches::{SavedSearchRequest, SavedSearchStore};
    use crate::CatalogStore;
    use bugwatch_core::ScheduleMode;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn obs(item_id: i64, fields: &[(&str, &str)]) -> ItemObservation {
        ItemObservation {
            item_id,
            fields: fields.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    async fn search(pool: &SqlitePool, name: &str, workplace_id: Option<i64>) -> i64 {
        SavedSearchStore::create(
            pool,
            SavedSearchRequest {
                name: name.into(),
                query_url: format!("product={name}"),
                details: String::new(),
                workplace_id,
                mode: ScheduleMode::Manual,
                run_hour: None,
                run_timezone: None,
                interval_hours: None,
            },
            t0(),
        )
        .await
        .unwrap()
        .id
    }

    async fn visible(pool: &SqlitePool, workplace_id: i64, names: &[&str]) {
        for (pos, name) in names.iter().enumerate() {
            let col = CatalogStore::create_column(pool, name, name, "char").await.unwrap();
            CatalogStore::set_column_visibility(pool, workplace_id, col.id, true, pos as i64)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn append_run_counts_new_and_existing() {
        let pool = connect_in_memory().await.unwrap();
        let s = search(&pool, "core", None).await;

        let (first, rec) = HistoryStore::append_run(
            &pool,
            s,
            &[obs(1, &[("status", "NEW")]), obs(2, &[("status", "NEW")])],
            t0(),
        )
        .await
        .unwrap();
        assert_eq!(first, RunCounts { total_processed: 2, new_items: 2, existing_items: 0 });
        assert_eq!(rec.executed_at, t0());

        let later = t0() + Duration::hours(1);
        let (second, _) = HistoryStore::append_run(
            &pool,
            s,
            &[obs(2, &[("status", "ASSIGNED")]), obs(3, &[("status", "NEW")])],
            later,
        )
        .await
        .unwrap();
        assert_eq!(second, RunCounts { total_processed: 2, new_items: 1, existing_items: 1 });

        let item = HistoryStore::tracked_item(&pool, 2).await.unwrap().unwrap();
        assert_eq!(item.first_seen_at, t0());
        assert_eq!(item.last_touched_at, later);
        assert_eq!(HistoryStore::snapshot_count(&pool).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn snapshots_are_appended_never_replaced() {
        let pool = connect_in_memory().await.unwrap();
        let s = search(&pool, "core", None).await;
        for (i, status) in ["NEW", "ASSIGNED", "RESOLVED"].iter().enumerate() {
            HistoryStore::append_run(&pool, s, &[obs(42, &[("status", status)])], t0() + Duration::minutes(i as i64))
                .await
                .unwrap();
        }
        let history = HistoryStore::field_history(&pool, 42, "status").await.unwrap();
        let values: Vec<&str> = history.iter().map(|h| h.field_value.as_str()).collect();
        assert_eq!(values, vec!["RESOLVED", "ASSIGNED", "NEW"]);
    }

    #[tokio::test]
    async fn latest_value_tie_breaks_on_insertion_order() {
        let pool = connect_in_memory().await.unwrap();
        let w = CatalogStore::create_workplace(&pool, "triage").await.unwrap();
        visible(&pool, w.id, &["status"]).await;
        let s = search(&pool, "core", Some(w.id)).await;

        HistoryStore::append_run(&pool, s, &[obs(7, &[("status", "NEW")])], t0()).await.unwrap();
        HistoryStore::append_run(&pool, s, &[obs(7, &[("status", "FIXED")])], t0()).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let latest = HistoryStore::latest_values(&mut conn, w.id).await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].field_value, "FIXED");
    }

    #[tokio::test]
    async fn latest_values_only_cover_visible_columns_of_workplace_items() {
        let pool = connect_in_memory().await.unwrap();
        let w = CatalogStore::create_workplace(&pool, "triage").await.unwrap();
        let other = CatalogStore::create_workplace(&pool, "other").await.unwrap();
        visible(&pool, w.id, &["status"]).await;
        let mine = search(&pool, "mine", Some(w.id)).await;
        let theirs = search(&pool, "theirs", Some(other.id)).await;

        HistoryStore::append_run(&pool, mine, &[obs(1, &[("status", "NEW"), ("priority", "P1")])], t0())
            .await
            .unwrap();
        HistoryStore::append_run(&pool, theirs, &[obs(2, &[("status", "NEW")])], t0())
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let latest = HistoryStore::latest_values(&mut conn, w.id).await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!((latest[0].item_id, latest[0].field_name.as_str()), (1, "status"));

        let memberships = HistoryStore::workplace_memberships(&mut conn, w.id).await.unwrap();
        assert_eq!(memberships, vec![SearchMembership { search_id: mine, item_id: 1 }]);
    }

    #[tokio::test]
    async fn last_updated_is_max_capture_across_fields() {
        let pool = connect_in_memory().await.unwrap();
        let w = CatalogStore::create_workplace(&pool, "triage").await.unwrap();
        let s = search(&pool, "core", Some(w.id)).await;
        HistoryStore::append_run(&pool, s, &[obs(1, &[("status", "NEW")])], t0()).await.unwrap();
        let later = t0() + Duration::hours(3);
        HistoryStore::append_run(&pool, s, &[obs(1, &[("priority", "P2")])], later).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let updates = HistoryStore::last_updated(&mut conn, w.id).await.unwrap();
        assert_eq!(updates, vec![ItemLastUpdate { item_id: 1, last_updated: later }]);
    }

    #[tokio::test]
    async fn item_workplaces_lists_every_owner() {
        let pool = connect_in_memory().await.unwrap();
        let a = CatalogStore::create_workplace(&pool, "a").await.unwrap();
        let b = CatalogStore::create_workplace(&pool, "b").await.unwrap();
        let sa = search(&pool, "sa", Some(a.id)).await;
        let sb = search(&pool, "sb", Some(b.id)).await;
        HistoryStore::append_run(&pool, sa, &[obs(9, &[("status", "NEW")])], t0()).await.unwrap();
        HistoryStore::append_run(&pool, sb, &[obs(9, &[("status", "NEW")])], t0()).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let owners = HistoryStore::item_workplaces(&mut conn, a.id).await.unwrap();
        let names: Vec<&str> = owners.iter().map(|o| o.workplace_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn failed_run_leaves_no_partial_state() {
        let pool = connect_in_memory().await.unwrap();
        // Search 999 does not exist: the association insert violates its foreign key.
        let err = HistoryStore::append_run(&pool, 999, &[obs(1, &[("status", "NEW")])], t0())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
        assert!(HistoryStore::tracked_item(&pool, 1).await.unwrap().is_none());
        assert_eq!(HistoryStore::snapshot_count(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn large_runs_are_chunked() {
        let pool = connect_in_memory().await.unwrap();
        let s = search(&pool, "big", None).await;
        let observations: Vec<_> = (1..=300)
            .map(|id| obs(id, &[("status", "NEW"), ("priority", "P3"), ("summary", "x")]))
            .collect();
        let (counts, _) = HistoryStore::append_run(&pool, s, &observations, t0()).await.unwrap();
        assert_eq!(counts.new_items, 300);
        assert_eq!(HistoryStore::snapshot_count(&pool).await.unwrap(), 900);
    }
}
