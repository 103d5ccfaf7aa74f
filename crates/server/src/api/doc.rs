//! OpenAPI documentation aggregator, served via Scalar UI at `/docs`.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "bugwatch API",
        version = "0.1.0",
        description = "Scheduled tracker searches, field history and latest-value views.",
    ),
    tags(
        (name = "Health", description = "Server and background service liveness"),
        (name = "Saved Searches", description = "Search definitions, schedules, run-now and execution history"),
        (name = "Runs", description = "Manually triggered runs"),
        (name = "Views", description = "Latest-value views, columns and item history"),
    ),
    paths(
        crate::api::health::health,
        crate::api::health::app_config,
        crate::api::status::service_status,
        crate::api::searches::searches_list,
        crate::api::searches::searches_create,
        crate::api::searches::searches_get,
        crate::api::searches::searches_update,
        crate::api::searches::searches_delete,
        crate::api::searches::searches_execute,
        crate::api::searches::searches_executions,
        crate::api::searches::searches_test,
        crate::api::runs::runs_list,
        crate::api::runs::runs_get,
        crate::api::views::workplace_view,
        crate::api::views::columns_list,
        crate::api::views::item_history,
    )
)]
pub struct ApiDoc;
