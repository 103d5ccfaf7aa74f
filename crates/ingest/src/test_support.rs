use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use sqlx::SqlitePool;

use bugwatch_connector::MockTracker;
use bugwatch_core::{ManualClock, ScheduleMode};
use bugwatch_storage::{
    connect_in_memory, CatalogStore, Column, SavedSearch, SavedSearchRequest, SavedSearchStore,
};

use crate::pipeline::Ingestor;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub struct Fixture {
    pub pool: SqlitePool,
    pub tracker: Arc<MockTracker>,
    pub ingestor: Arc<Ingestor>,
    pub clock: Arc<ManualClock>,
}

/// In-memory store with `status` and `priority` columns, a scripted tracker
/// and a clock frozen at [`t0`].
pub async fn fixture() -> Fixture {
    let pool = connect_in_memory().await.unwrap();
    CatalogStore::create_column(&pool, "status", "status", "char").await.unwrap();
    CatalogStore::create_column(&pool, "priority", "priority", "char").await.unwrap();

    let tracker = Arc::new(MockTracker::new());
    let clock = Arc::new(ManualClock::new(t0()));
    let ingestor = Arc::new(Ingestor::new(pool.clone(), tracker.clone(), clock.clone()));
    Fixture { pool, tracker, ingestor, clock }
}

pub fn column(id: i64, name: &str, remote_field: &str) -> Column {
    Column {
        id,
        name: name.to_string(),
        remote_field: remote_field.to_string(),
        data_type: "char".to_string(),
    }
}

pub fn search_request(
    name: &str,
    workplace_id: Option<i64>,
    mode: ScheduleMode,
    interval_hours: Option<f64>,
) -> SavedSearchRequest {
    SavedSearchRequest {
        name: name.to_string(),
        query_url: format!("https://bugzilla.example.org/buglist.cgi?product={name}"),
        details: String::new(),
        workplace_id,
        mode,
        run_hour: None,
        run_timezone: None,
        interval_hours,
    }
}

/// An automatic search created at [`t0`].
pub async fn automatic_search(
    pool: &SqlitePool,
    name: &str,
    workplace_id: Option<i64>,
    interval_hours: Option<f64>,
) -> SavedSearch {
    SavedSearchStore::create(
        pool,
        search_request(name, workplace_id, ScheduleMode::Automatic, interval_hours),
        t0(),
    )
    .await
    .unwrap()
}
