use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Liveness of the HTTP process itself.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses((status = 200, description = "Server is up", body = Object))
)]
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// Effective configuration with secrets removed.
#[utoipa::path(
    get,
    path = "/api/config",
    tag = "Health",
    responses((status = 200, description = "Redacted configuration", body = Object))
)]
pub async fn app_config(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(state.config.redacted_summary())
}
