//! HTTP handlers, grouped by resource.
//!
//! Shared error mapping lives here: every handler fails with
//! `(StatusCode, Json<{"error": ...}>)`.

pub mod doc;
mod health;
mod runs;
mod searches;
mod status;
mod views;

use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

pub use health::{app_config, health};
pub use runs::{runs_get, runs_list};
pub use searches::{
    searches_create, searches_delete, searches_execute, searches_executions, searches_get,
    searches_list, searches_test, searches_update,
};
pub use status::service_status;
pub use views::{columns_list, item_history, workplace_view};

pub(crate) type ApiError = (StatusCode, Json<Value>);

pub(crate) fn error_response(code: u16, message: impl std::fmt::Display) -> ApiError {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "error": message.to_string() })))
}

/// Map a StoreError to an HTTP response.
pub(crate) fn store_err(e: bugwatch_storage::StoreError) -> ApiError {
    if e.status_code() >= 500 {
        tracing::error!(error = %e, "store error");
    }
    error_response(e.status_code(), e)
}

pub(crate) fn to_json<T: serde::Serialize>(value: T) -> Json<Value> {
    Json(serde_json::to_value(value).unwrap_or_default())
}
