//! Saved-search configuration, run-now, execution history and query test.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use bugwatch_ingest::IngestError;
use bugwatch_storage::{ExecutionStore, SavedSearchRequest, SavedSearchStore};

use crate::state::AppState;

use super::{error_response, store_err, to_json, ApiError};

const DEFAULT_EXECUTION_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct ExecutionsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TestQueryRequest {
    pub query_url: String,
}

fn ingest_err(e: IngestError) -> ApiError {
    error_response(e.status_code(), e)
}

/// List every saved search.
#[utoipa::path(
    get,
    path = "/api/searches",
    tag = "Saved Searches",
    responses((status = 200, description = "Saved searches ordered by id", body = Object))
)]
pub async fn searches_list(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let searches = SavedSearchStore::list(&state.pool).await.map_err(store_err)?;
    Ok(to_json(searches))
}

/// Create a saved search. Automatic searches with an interval are scheduled
/// one interval from now.
#[utoipa::path(
    post,
    path = "/api/searches",
    tag = "Saved Searches",
    request_body(content = Object, description = "Saved search definition"),
    responses(
        (status = 201, description = "Saved search created", body = Object),
        (status = 400, description = "Invalid schedule or definition", body = Object),
        (status = 409, description = "Name already in use", body = Object)
    )
)]
pub async fn searches_create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SavedSearchRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let search = SavedSearchStore::create(&state.pool, req, state.ingestor.now())
        .await
        .map_err(store_err)?;
    tracing::info!(search_id = search.id, name = %search.name, mode = %search.mode, "saved search created");
    Ok((StatusCode::CREATED, to_json(search)))
}

#[utoipa::path(
    get,
    path = "/api/searches/{id}",
    tag = "Saved Searches",
    params(("id" = i64, Path, description = "Saved search id")),
    responses(
        (status = 200, description = "Saved search", body = Object),
        (status = 404, description = "Not found", body = Object)
    )
)]
pub async fn searches_get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let search = SavedSearchStore::require(&state.pool, id).await.map_err(store_err)?;
    Ok(to_json(search))
}

/// Replace a saved search's definition and schedule.
#[utoipa::path(
    put,
    path = "/api/searches/{id}",
    tag = "Saved Searches",
    params(("id" = i64, Path, description = "Saved search id")),
    request_body(content = Object, description = "Saved search definition"),
    responses(
        (status = 200, description = "Updated saved search", body = Object),
        (status = 400, description = "Invalid schedule or definition", body = Object),
        (status = 404, description = "Not found", body = Object),
        (status = 409, description = "Name already in use", body = Object)
    )
)]
pub async fn searches_update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<SavedSearchRequest>,
) -> Result<Json<Value>, ApiError> {
    let search = SavedSearchStore::update(&state.pool, id, req, state.ingestor.now())
        .await
        .map_err(store_err)?;
    Ok(to_json(search))
}

/// Delete a saved search. Item history is kept.
#[utoipa::path(
    delete,
    path = "/api/searches/{id}",
    tag = "Saved Searches",
    params(("id" = i64, Path, description = "Saved search id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found", body = Object)
    )
)]
pub async fn searches_delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    SavedSearchStore::delete(&state.pool, id).await.map_err(store_err)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Run a saved search now. Returns as soon as the run is queued.
#[utoipa::path(
    post,
    path = "/api/searches/{id}/execute",
    tag = "Saved Searches",
    params(("id" = i64, Path, description = "Saved search id")),
    responses(
        (status = 202, description = "Run queued", body = Object),
        (status = 404, description = "Not found", body = Object),
        (status = 429, description = "Too many unfinished manual runs", body = Object)
    )
)]
pub async fn searches_execute(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let run_id = state.dispatcher.trigger(id).await.map_err(ingest_err)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "run_id": run_id, "search_id": id, "status": "pending" })),
    ))
}

#[utoipa::path(
    get,
    path = "/api/searches/{id}/executions",
    tag = "Saved Searches",
    params(
        ("id" = i64, Path, description = "Saved search id"),
        ("limit" = Option<i64>, Query, description = "Maximum records (default 50)")
    ),
    responses(
        (status = 200, description = "Execution records, newest first", body = Object),
        (status = 404, description = "Not found", body = Object)
    )
)]
pub async fn searches_executions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(q): Query<ExecutionsQuery>,
) -> Result<Json<Value>, ApiError> {
    SavedSearchStore::require(&state.pool, id).await.map_err(store_err)?;
    let limit = q.limit.unwrap_or(DEFAULT_EXECUTION_LIMIT).clamp(1, 1000);
    let records = ExecutionStore::list_for_search(&state.pool, id, limit)
        .await
        .map_err(store_err)?;
    Ok(to_json(records))
}

/// Run only the remote search for a query URL; nothing is stored.
#[utoipa::path(
    post,
    path = "/api/searches/test",
    tag = "Saved Searches",
    request_body(content = Object, description = "{\"query_url\": \"...\"}"),
    responses(
        (status = 200, description = "Matching ids", body = Object),
        (status = 400, description = "Remote search failed", body = Object)
    )
)]
pub async fn searches_test(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TestQueryRequest>,
) -> Result<Json<Value>, ApiError> {
    let ids = state
        .ingestor
        .test_query(&req.query_url)
        .await
        .map_err(|e| error_response(400, e))?;
    Ok(Json(json!({ "count": ids.len(), "ids": ids })))
}
