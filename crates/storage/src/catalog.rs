//! Workplaces and their column configuration.

use sqlx::{SqliteConnection, SqlitePool};

use crate::error::{is_foreign_key_violation, map_unique_violation, StoreError};
use crate::types::{Column, VisibleColumn, Workplace};

pub struct CatalogStore;

impl CatalogStore {
    pub async fn create_workplace(pool: &SqlitePool, name: &str) -> Result<Workplace, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Invalid("workplace name must not be empty".into()));
        }
        sqlx::query_as::<_, Workplace>("INSERT INTO workplaces (name) VALUES (?1) RETURNING id, name")
            .bind(name)
            .fetch_one(pool)
            .await
            .map_err(|e| map_unique_violation(e, name))
    }

    pub async fn get_workplace(
        conn: &mut SqliteConnection,
        id: i64,
    ) -> Result<Option<Workplace>, StoreError> {
        let row = sqlx::query_as::<_, Workplace>("SELECT id, name FROM workplaces WHERE id = ?1")
            .bind(id)
            .fetch_optional(conn)
            .await?;
        Ok(row)
    }

    pub async fn list_workplaces(pool: &SqlitePool) -> Result<Vec<Workplace>, StoreError> {
        let rows = sqlx::query_as::<_, Workplace>("SELECT id, name FROM workplaces ORDER BY id")
            .fetch_all(pool)
            .await?;
        Ok(rows)
    }

    /// Register a column. `name` keys the stored snapshots; `remote_field`
    /// is the field requested from the tracker.
    pub async fn create_column(
        pool: &SqlitePool,
        name: &str,
        remote_field: &str,
        data_type: &str,
    ) -> Result<Column, StoreError> {
        if name.trim().is_empty() || remote_field.trim().is_empty() {
            return Err(StoreError::Invalid("column name and remote field must not be empty".into()));
        }
        sqlx::query_as::<_, Column>(
            "INSERT INTO bug_columns (name, remote_field, data_type) VALUES (?1, ?2, ?3)
             RETURNING id, name, remote_field, data_type",
        )
        .bind(name.trim())
        .bind(remote_field.trim())
        .bind(data_type)
        .fetch_one(pool)
        .await
        .map_err(|e| map_unique_violation(e, name.trim()))
    }

    /// All configured columns; this is the field set the pipeline captures.
    pub async fn list_columns(pool: &SqlitePool) -> Result<Vec<Column>, StoreError> {
        let rows = sqlx::query_as::<_, Column>(
            "SELECT id, name, remote_field, data_type FROM bug_columns ORDER BY id",
        )
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    pub async fn set_column_visibility(
        pool: &SqlitePool,
        workplace_id: i64,
        column_id: i64,
        visible: bool,
        position: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO workplace_columns (workplace_id, column_id, is_visible, position)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(workplace_id, column_id) DO UPDATE
             SET is_visible = excluded.is_visible, position = excluded.position",
        )
        .bind(workplace_id)
        .bind(column_id)
        .bind(visible)
        .bind(position)
        .execute(pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                StoreError::Invalid(format!(
                    "unknown workplace {workplace_id} or column {column_id}"
                ))
            } else {
                StoreError::Database(e)
            }
        })?;
        Ok(())
    }

    /// Visible columns of a workplace, ordered by position then id.
    pub async fn visible_columns(
        conn: &mut SqliteConnection,
        workplace_id: i64,
    ) -> Result<Vec<VisibleColumn>, StoreError> {
        let rows = sqlx::query_as::<_, VisibleColumn>(
            "SELECT c.id, c.name, c.remote_field, c.data_type, wc.position
             FROM workplace_columns wc
             JOIN bug_columns c ON c.id = wc.column_id
             WHERE wc.workplace_id = ?1 AND wc.is_visible = 1
             ORDER BY wc.position, c.id",
        )
        .bind(workplace_id)
        .fetch_all(conn)
        .await?;
        Ok(rows)
    }
}
