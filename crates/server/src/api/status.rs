use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde_json::Value;

use crate::state::AppState;

use super::{store_err, to_json, ApiError};

/// Online/offline status of a background service from its heartbeat.
#[utoipa::path(
    get,
    path = "/api/service-status/{name}",
    tag = "Health",
    params(("name" = String, Path, description = "Service name, e.g. `scheduler`")),
    responses((status = 200, description = "Service status", body = Object))
)]
pub async fn service_status(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let status = bugwatch_ingest::service_status(
        &state.pool,
        &name,
        state.config.scheduler.wake_interval(),
        state.ingestor.now(),
    )
    .await
    .map_err(store_err)?;
    Ok(to_json(status))
}
