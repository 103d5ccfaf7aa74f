use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use bugwatch_ingest::build_view;
use bugwatch_storage::{CatalogStore, HistoryStore};

use crate::state::AppState;

use super::{error_response, store_err, to_json, ApiError};

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub field: String,
}

/// Latest value of every visible column for every item, one section per
/// saved search of the workplace.
#[utoipa::path(
    get,
    path = "/api/workplaces/{id}/view",
    tag = "Views",
    params(("id" = i64, Path, description = "Workplace id")),
    responses(
        (status = 200, description = "Sectioned latest-value view", body = Object),
        (status = 404, description = "Unknown workplace", body = Object)
    )
)]
pub async fn workplace_view(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let view = build_view(&state.pool, id)
        .await
        .map_err(|e| error_response(e.status_code(), e))?;
    Ok(to_json(view))
}

#[utoipa::path(
    get,
    path = "/api/columns",
    tag = "Views",
    responses((status = 200, description = "Configured columns", body = Object))
)]
pub async fn columns_list(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let columns = CatalogStore::list_columns(&state.pool).await.map_err(store_err)?;
    Ok(to_json(columns))
}

/// Every captured value of one field of one item, newest first.
#[utoipa::path(
    get,
    path = "/api/items/{id}/history",
    tag = "Views",
    params(
        ("id" = i64, Path, description = "Remote item id"),
        ("field" = String, Query, description = "Column name")
    ),
    responses(
        (status = 200, description = "Snapshots, newest first", body = Object),
        (status = 404, description = "Item never observed", body = Object)
    )
)]
pub async fn item_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    if HistoryStore::tracked_item(&state.pool, id).await.map_err(store_err)?.is_none() {
        return Err(error_response(404, format!("item not tracked: {id}")));
    }
    let history = HistoryStore::field_history(&state.pool, id, &q.field)
        .await
        .map_err(store_err)?;
    Ok(to_json(history))
}
