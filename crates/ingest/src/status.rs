use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use bugwatch_core::liveness::liveness;
use bugwatch_core::ServiceState;
use bugwatch_storage::{HeartbeatStore, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStatus {
    pub service_name: String,
    pub status: ServiceState,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

/// Liveness of a background service, inferred from its last heartbeat.
pub async fn service_status(
    pool: &SqlitePool,
    service_name: &str,
    wake_interval: Duration,
    now: DateTime<Utc>,
) -> Result<ServiceStatus, StoreError> {
    let last_heartbeat = HeartbeatStore::get(pool, service_name)
        .await?
        .map(|hb| hb.last_heartbeat);
    Ok(ServiceStatus {
        service_name: service_name.to_string(),
        status: liveness(last_heartbeat, now, wake_interval),
        last_heartbeat,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::t0;
    use bugwatch_storage::connect_in_memory;
    use chrono::Duration as ChronoDuration;

    const WAKE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn heartbeat_age_decides_status() {
        let pool = connect_in_memory().await.unwrap();
        HeartbeatStore::beat(&pool, "scheduler", t0()).await.unwrap();

        let fresh = service_status(&pool, "scheduler", WAKE, t0() + ChronoDuration::seconds(30))
            .await
            .unwrap();
        assert_eq!(fresh.status, ServiceState::Online);
        assert_eq!(fresh.last_heartbeat, Some(t0()));

        let stale = service_status(&pool, "scheduler", WAKE, t0() + ChronoDuration::seconds(200))
            .await
            .unwrap();
        assert_eq!(stale.status, ServiceState::Offline);
    }

    #[tokio::test]
    async fn unknown_service_is_offline() {
        let pool = connect_in_memory().await.unwrap();
        let status = service_status(&pool, "ghost", WAKE, t0()).await.unwrap();
        assert_eq!(status.status, ServiceState::Offline);
        assert_eq!(status.last_heartbeat, None);
    }
}
