use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use bugwatch_core::ServiceState;

use crate::error::StoreError;
use crate::types::ServiceHeartbeat;

pub struct HeartbeatStore;

impl HeartbeatStore {
    /// Insert or refresh the heartbeat row for `service_name`. The stored
    /// status is informational; liveness is derived from the timestamp.
    pub async fn beat(
        pool: &SqlitePool,
        service_name: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO service_heartbeats (service_name, last_heartbeat, status)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(service_name) DO UPDATE
             SET last_heartbeat = excluded.last_heartbeat, status = excluded.status",
        )
        .bind(service_name)
        .bind(at)
        .bind(ServiceState::Online.as_str())
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn get(
        pool: &SqlitePool,
        service_name: &str,
    ) -> Result<Option<ServiceHeartbeat>, StoreError> {
        let row = sqlx::query_as::<_, ServiceHeartbeat>(
            "SELECT service_name, last_heartbeat, status FROM service_heartbeats WHERE service_name = ?1",
        )
        .bind(service_name)
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }
}
