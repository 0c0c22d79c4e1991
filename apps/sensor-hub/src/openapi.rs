use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "sensor-hub",
        description = "Environmental sensor ingest, history and live viewer feed"
    ),
    paths(
        crate::routes::health::healthz_handler,
        crate::routes::data::post_data,
        crate::routes::data::get_data,
        crate::routes::history::get_history,
        crate::routes::live::ws_handler,
        crate::routes::live::events_handler
    ),
    components(schemas(
        crate::routes::health::HealthResponse,
        crate::routes::data::SaveResponse,
        crate::error::ErrorBody
    )),
    tags(
        (name = "data", description = "Reading ingest and latest readings"),
        (name = "history", description = "Time-window queries"),
        (name = "live", description = "Live reading feeds")
    )
)]
pub struct ApiDoc;

pub fn openapi_json() -> serde_json::Value {
    serde_json::to_value(ApiDoc::openapi()).unwrap_or_else(|err| {
        tracing::error!(error = %err, "failed to render OpenAPI document");
        serde_json::Value::Null
    })
}

async fn openapi_handler() -> Json<serde_json::Value> {
    Json(openapi_json())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_handler))
}
