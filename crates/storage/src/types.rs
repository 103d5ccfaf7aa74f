//! Row types for the history store tables.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use bugwatch_core::ScheduleMode;

/// A persisted query against the tracker plus its schedule.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SavedSearch {
    pub id: i64,
    pub name: String,
    pub query_url: String,
    pub details: String,
    pub workplace_id: Option<i64>,
    #[sqlx(try_from = "String")]
    pub mode: ScheduleMode,
    /// Informational hour-of-day (0..=23); does not drive scheduling.
    pub run_hour: Option<i64>,
    pub run_timezone: Option<String>,
    pub interval_hours: Option<f64>,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub next_execution_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One remote work item, identified by the tracker's numeric id.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct TrackedItem {
    pub item_id: i64,
    pub first_seen_at: DateTime<Utc>,
    pub last_touched_at: DateTime<Utc>,
}

/// An immutable observation of one field of one item at one time.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct FieldSnapshot {
    pub id: i64,
    pub item_id: i64,
    pub field_name: String,
    pub field_value: String,
    pub captured_at: DateTime<Utc>,
}

/// Summary of one pipeline run that found at least one item.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ExecutionRecord {
    pub id: i64,
    pub search_id: i64,
    pub executed_at: DateTime<Utc>,
    pub total_processed: i64,
    pub new_items: i64,
    pub existing_items: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ServiceHeartbeat {
    pub service_name: String,
    pub last_heartbeat: DateTime<Utc>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Workplace {
    pub id: i64,
    pub name: String,
}

/// A configured display column; `name` keys snapshots, `remote_field` is
/// what the tracker calls it.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Column {
    pub id: i64,
    pub name: String,
    pub remote_field: String,
    pub data_type: String,
}

/// A column as configured for one workplace.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct VisibleColumn {
    pub id: i64,
    pub name: String,
    pub remote_field: String,
    pub data_type: String,
    pub position: i64,
}

/// Current value of one field, as chosen by the latest-value ranking.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct LatestValue {
    pub item_id: i64,
    pub field_name: String,
    pub field_value: String,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ItemLastUpdate {
    pub item_id: i64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ItemWorkplace {
    pub item_id: i64,
    pub workplace_id: i64,
    pub workplace_name: String,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct SearchMembership {
    pub search_id: i64,
    pub item_id: i64,
}

/// Field values observed for one item during a run, keyed by column name.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemObservation {
    pub item_id: i64,
    pub fields: Vec<(String, String)>,
}

/// New/existing tally of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub total_processed: i64,
    pub new_items: i64,
    pub existing_items: i64,
}
