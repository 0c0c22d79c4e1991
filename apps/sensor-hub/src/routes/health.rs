use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::live::SessionRegistry;
use crate::state::AppState;
use crate::store::StoreHandle;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub readings: i64,
    pub last_id: Option<i64>,
    pub viewers: usize,
}

#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "OK", body = HealthResponse),
        (status = 500, description = "Store unreachable", body = crate::error::ErrorBody)
    )
)]
pub(crate) async fn healthz_handler(
    State(store): State<StoreHandle>,
    State(sessions): State<Arc<SessionRegistry>>,
) -> AppResult<Json<HealthResponse>> {
    let stats = store
        .stats()
        .await
        .map_err(|err| AppError::storage(&err, "Failed to read store"))?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        readings: stats.readings,
        last_id: stats.last_id,
        viewers: sessions.session_count(),
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/healthz", get(healthz_handler))
}
