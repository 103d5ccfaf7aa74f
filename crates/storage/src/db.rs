//! Pool construction and schema setup.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

use bugwatch_core::config::DatabaseConfig;

use crate::error::StoreError;

/// Schema statements, applied in order. Every statement is idempotent.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS workplaces (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS bug_columns (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        remote_field TEXT NOT NULL,
        data_type TEXT NOT NULL DEFAULT 'char'
    )",
    "CREATE TABLE IF NOT EXISTS workplace_columns (
        workplace_id INTEGER NOT NULL REFERENCES workplaces(id) ON DELETE CASCADE,
        column_id INTEGER NOT NULL REFERENCES bug_columns(id) ON DELETE CASCADE,
        is_visible INTEGER NOT NULL DEFAULT 1,
        position INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (workplace_id, column_id)
    )",
    "CREATE TABLE IF NOT EXISTS saved_searches (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        query_url TEXT NOT NULL,
        details TEXT NOT NULL DEFAULT '',
        workplace_id INTEGER REFERENCES workplaces(id) ON DELETE SET NULL,
        mode TEXT NOT NULL DEFAULT 'manual' CHECK (mode IN ('manual', 'automatic')),
        run_hour INTEGER,
        run_timezone TEXT,
        interval_hours REAL,
        last_executed_at TEXT,
        next_execution_at TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_searches_due ON saved_searches(mode, next_execution_at)",
    "CREATE TABLE IF NOT EXISTS tracked_items (
        item_id INTEGER PRIMARY KEY,
        first_seen_at TEXT NOT NULL,
        last_touched_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS field_snapshots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        item_id INTEGER NOT NULL REFERENCES tracked_items(item_id),
        field_name TEXT NOT NULL,
        field_value TEXT NOT NULL,
        captured_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_snapshots_item_field_time
        ON field_snapshots(item_id, field_name, captured_at DESC, id DESC)",
    "CREATE TABLE IF NOT EXISTS search_items (
        search_id INTEGER NOT NULL REFERENCES saved_searches(id) ON DELETE CASCADE,
        item_id INTEGER NOT NULL REFERENCES tracked_items(item_id),
        first_seen_at TEXT NOT NULL,
        last_seen_at TEXT NOT NULL,
        PRIMARY KEY (search_id, item_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_search_items_item ON search_items(item_id)",
    "CREATE TABLE IF NOT EXISTS execution_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        search_id INTEGER NOT NULL REFERENCES saved_searches(id) ON DELETE CASCADE,
        executed_at TEXT NOT NULL,
        total_processed INTEGER NOT NULL,
        new_items INTEGER NOT NULL,
        existing_items INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_executions_search
        ON execution_records(search_id, executed_at DESC)",
    "CREATE TABLE IF NOT EXISTS service_heartbeats (
        service_name TEXT PRIMARY KEY,
        last_heartbeat TEXT NOT NULL,
        status TEXT NOT NULL
    )",
];

/// Open (creating if needed) the database at `config.url` and apply the schema.
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;

    migrate(&pool).await?;
    info!(url = %config.url, "database ready");
    Ok(pool)
}

/// A private in-memory database. Used by tests and throwaway runs.
///
/// The pool is pinned to a single connection that never expires, since every
/// new SQLite memory connection would otherwise see an empty database.
pub async fn connect_in_memory() -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// Apply the schema.
pub async fn migrate(pool: &SqlitePool) -> Result<(), StoreError> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
