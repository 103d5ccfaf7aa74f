//! CRUD and schedule bookkeeping for the `saved_searches` table.
//!
//! Every write that touches the schedule keeps one invariant: a search in
//! manual mode never carries a `next_execution_at`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{SqliteConnection, SqlitePool};

use bugwatch_core::schedule::{initial_next_execution, interval_duration, MAX_INTERVAL_HOURS};
use bugwatch_core::ScheduleMode;

use crate::error::{is_foreign_key_violation, map_unique_violation, StoreError};
use crate::types::SavedSearch;

const COLUMNS: &str = "id, name, query_url, details, workplace_id, mode, run_hour, run_timezone,
                       interval_hours, last_executed_at, next_execution_at, created_at";

/// Request body for creating or replacing a saved search.
#[derive(Debug, Clone, Deserialize)]
pub struct SavedSearchRequest {
    pub name: String,
    pub query_url: String,
    #[serde(default)]
    pub details: String,
    pub workplace_id: Option<i64>,
    #[serde(default)]
    pub mode: ScheduleMode,
    pub run_hour: Option<i64>,
    pub run_timezone: Option<String>,
    pub interval_hours: Option<f64>,
}

impl SavedSearchRequest {
    fn validate(&self) -> Result<(), StoreError> {
        if self.name.trim().is_empty() {
            return Err(StoreError::Invalid("name must not be empty".into()));
        }
        if self.query_url.trim().is_empty() {
            return Err(StoreError::Invalid("query_url must not be empty".into()));
        }
        if let Some(hour) = self.run_hour {
            if !(0..=23).contains(&hour) {
                return Err(StoreError::InvalidSchedule(format!(
                    "run_hour must be between 0 and 23, got {hour}"
                )));
            }
        }
        if let Some(interval) = self.interval_hours {
            if !interval.is_finite() {
                return Err(StoreError::InvalidSchedule("interval_hours must be a finite number".into()));
            }
            if interval > MAX_INTERVAL_HOURS {
                return Err(StoreError::InvalidSchedule(format!(
                    "interval_hours must be at most {MAX_INTERVAL_HOURS}, got {interval}"
                )));
            }
        }
        if self.mode == ScheduleMode::Automatic && interval_duration(self.interval_hours).is_none() {
            tracing::warn!(
                name = %self.name,
                interval_hours = ?self.interval_hours,
                "automatic search without a positive interval will run once and then idle"
            );
        }
        Ok(())
    }
}

/// Stateless store for `saved_searches`.
pub struct SavedSearchStore;

impl SavedSearchStore {
    pub async fn create(
        pool: &SqlitePool,
        req: SavedSearchRequest,
        now: DateTime<Utc>,
    ) -> Result<SavedSearch, StoreError> {
        req.validate()?;
        let next = initial_next_execution(req.mode, req.interval_hours, now);

        let result = sqlx::query_as::<_, SavedSearch>(&format!(
            "INSERT INTO saved_searches
                (name, query_url, details, workplace_id, mode, run_hour, run_timezone,
                 interval_hours, next_execution_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             RETURNING {COLUMNS}"
        ))
        .bind(req.name.trim())
        .bind(req.query_url.trim())
        .bind(&req.details)
        .bind(req.workplace_id)
        .bind(req.mode.as_str())
        .bind(req.run_hour)
        .bind(&req.run_timezone)
        .bind(req.interval_hours)
        .bind(next)
        .bind(now)
        .fetch_one(pool)
        .await;

        result.map_err(|e| map_write_error(e, &req))
    }

    pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<SavedSearch>, StoreError> {
        let row = sqlx::query_as::<_, SavedSearch>(&format!(
            "SELECT {COLUMNS} FROM saved_searches WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    /// Fetch a search or fail with `NotFound`.
    pub async fn require(pool: &SqlitePool, id: i64) -> Result<SavedSearch, StoreError> {
        Self::get(pool, id)
            .await?
            .ok_or_else(|| StoreError::not_found("saved search", id))
    }

    pub async fn list(pool: &SqlitePool) -> Result<Vec<SavedSearch>, StoreError> {
        let rows = sqlx::query_as::<_, SavedSearch>(&format!(
            "SELECT {COLUMNS} FROM saved_searches ORDER BY id"
        ))
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    pub async fn list_for_workplace(
        conn: &mut SqliteConnection,
        workplace_id: i64,
    ) -> Result<Vec<SavedSearch>, StoreError> {
        let rows = sqlx::query_as::<_, SavedSearch>(&format!(
            "SELECT {COLUMNS} FROM saved_searches WHERE workplace_id = ?1 ORDER BY id"
        ))
        .bind(workplace_id)
        .fetch_all(conn)
        .await?;
        Ok(rows)
    }

    /// Replace a search's definition and reschedule it.
    ///
    /// Changing the schedule restarts the cadence from `now`; switching to
    /// manual clears `next_execution_at`. Run history is untouched.
    pub async fn update(
        pool: &SqlitePool,
        id: i64,
        req: SavedSearchRequest,
        now: DateTime<Utc>,
    ) -> Result<SavedSearch, StoreError> {
        req.validate()?;
        let next = initial_next_execution(req.mode, req.interval_hours, now);

        let result = sqlx::query_as::<_, SavedSearch>(&format!(
            "UPDATE saved_searches
             SET name = ?2, query_url = ?3, details = ?4, workplace_id = ?5, mode = ?6,
                 run_hour = ?7, run_timezone = ?8, interval_hours = ?9, next_execution_at = ?10
             WHERE id = ?1
             RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(req.name.trim())
        .bind(req.query_url.trim())
        .bind(&req.details)
        .bind(req.workplace_id)
        .bind(req.mode.as_str())
        .bind(req.run_hour)
        .bind(&req.run_timezone)
        .bind(req.interval_hours)
        .bind(next)
        .fetch_optional(pool)
        .await;

        match result {
            Ok(Some(row)) => Ok(row),
            Ok(None) => Err(StoreError::not_found("saved search", id)),
            Err(e) => Err(map_write_error(e, &req)),
        }
    }

    /// Delete a search together with its execution records and item
    /// associations. Tracked items and their snapshots stay.
    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM saved_searches WHERE id = ?1")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("saved search", id));
        }
        Ok(())
    }

    /// Automatic searches whose `next_execution_at` is unset or at/before `now`.
    pub async fn find_due(
        pool: &SqlitePool,
        now: DateTime<Utc>,
    ) -> Result<Vec<SavedSearch>, StoreError> {
        let rows = sqlx::query_as::<_, SavedSearch>(&format!(
            "SELECT {COLUMNS} FROM saved_searches
             WHERE mode = 'automatic'
               AND (next_execution_at IS NULL OR next_execution_at <= ?1)
             ORDER BY id"
        ))
        .bind(now)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// Bookkeeping after a scheduled run.
    ///
    /// `next_execution_at` is only written if it still holds `expected_next`
    /// (the value the scheduler based its computation on) and the search is
    /// still automatic, so a reconfiguration made during the run wins.
    pub async fn record_scheduled_run(
        pool: &SqlitePool,
        id: i64,
        started_at: DateTime<Utc>,
        expected_next: Option<DateTime<Utc>>,
        next: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE saved_searches
             SET last_executed_at = ?2,
                 next_execution_at = CASE
                     WHEN mode = 'automatic' AND next_execution_at IS ?3 THEN ?4
                     ELSE next_execution_at
                 END
             WHERE id = ?1",
        )
        .bind(id)
        .bind(started_at)
        .bind(expected_next)
        .bind(next)
        .execute(pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("saved search", id));
        }
        Ok(())
    }

    /// Bookkeeping after a manual run: only `last_executed_at` moves.
    pub async fn record_manual_run(
        pool: &SqlitePool,
        id: i64,
        started_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE saved_searches SET last_executed_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(started_at)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("saved search", id));
        }
        Ok(())
    }
}

fn map_write_error(e: sqlx::Error, req: &SavedSearchRequest) -> StoreError {
    if is_foreign_key_violation(&e) {
        return StoreError::not_found("workplace", req.workplace_id.unwrap_or_default());
    }
    map_unique_violation(e, req.name.trim())
}
