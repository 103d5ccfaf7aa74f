//! HTTP router construction.
//!
//! Assembles all Axum routes, middleware, and OpenAPI docs into a single `Router`.

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::api;
use crate::state::AppState;

/// Build the complete application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origin);

    Router::new()
        .route("/health", get(api::health))
        .route("/api/config", get(api::app_config))
        .route("/api/service-status/{name}", get(api::service_status))
        .route(
            "/api/searches",
            get(api::searches_list).post(api::searches_create),
        )
        // /test MUST precede /{id}
        .route("/api/searches/test", post(api::searches_test))
        .route(
            "/api/searches/{id}",
            get(api::searches_get)
                .put(api::searches_update)
                .delete(api::searches_delete),
        )
        .route("/api/searches/{id}/execute", post(api::searches_execute))
        .route("/api/searches/{id}/executions", get(api::searches_executions))
        .route("/api/runs", get(api::runs_list))
        .route("/api/runs/{id}", get(api::runs_get))
        .route("/api/workplaces/{id}/view", get(api::workplace_view))
        .route("/api/columns", get(api::columns_list))
        .route("/api/items/{id}/history", get(api::item_history))
        .layer(cors)
        .with_state(state)
        .merge(Scalar::with_url("/docs", api::doc::ApiDoc::openapi()))
}

fn cors_layer(origin: &str) -> CorsLayer {
    if origin.trim() == "*" {
        return CorsLayer::permissive();
    }
    match HeaderValue::from_str(origin.trim()) {
        Ok(value) => CorsLayer::new()
            .allow_origin(value)
            .allow_methods(Any)
            .allow_headers(Any),
        Err(e) => {
            tracing::warn!(origin, error = %e, "invalid CORS_ORIGIN, allowing any origin");
            CorsLayer::permissive()
        }
    }
}
