use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde_json::Value;
use uuid::Uuid;

use crate::state::AppState;

use super::{error_response, to_json, ApiError};

/// Manually triggered runs, most recent first.
#[utoipa::path(
    get,
    path = "/api/runs",
    tag = "Runs",
    responses((status = 200, description = "Manual runs", body = Object))
)]
pub async fn runs_list(State(state): State<Arc<AppState>>) -> Json<Value> {
    to_json(state.dispatcher.list())
}

#[utoipa::path(
    get,
    path = "/api/runs/{id}",
    tag = "Runs",
    params(("id" = String, Path, description = "Run id (uuid)")),
    responses(
        (status = 200, description = "Run status", body = Object),
        (status = 404, description = "Unknown run", body = Object)
    )
)]
pub async fn runs_get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    state
        .dispatcher
        .get(id)
        .map(to_json)
        .ok_or_else(|| error_response(404, format!("run not found: {id}")))
}
