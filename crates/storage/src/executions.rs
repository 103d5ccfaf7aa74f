use sqlx::SqlitePool;

use crate::error::StoreError;
use crate::types::ExecutionRecord;

pub struct ExecutionStore;

impl ExecutionStore {
    /// Execution records of one search, newest first.
    pub async fn list_for_search(
        pool: &SqlitePool,
        search_id: i64,
        limit: i64,
    ) -> Result<Vec<ExecutionRecord>, StoreError> {
        let rows = sqlx::query_as::<_, ExecutionRecord>(
            "SELECT id, search_id, executed_at, total_processed, new_items, existing_items
             FROM execution_records
             WHERE search_id = ?1
             ORDER BY executed_at DESC, id DESC
             LIMIT ?2",
        )
        .bind(search_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    pub async fn count_for_search(pool: &SqlitePool, search_id: i64) -> Result<i64, StoreError> {
        let n = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM execution_records WHERE search_id = ?1",
        )
        .bind(search_id)
        .fetch_one(pool)
        .await?;
        Ok(n)
    }
}
