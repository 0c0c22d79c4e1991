use axum::extract::{RawQuery, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use url::form_urlencoded;

use crate::error::{AppError, AppResult};
use crate::history::{ChartPoint, HistoryRequest, HistoryResult, HistoryView, TimeRange};
use crate::reading::Reading;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub range: TimeRange,
    #[serde(with = "crate::reading::created_at_format")]
    pub since: DateTime<Utc>,
    pub view: HistoryView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    pub empty: bool,
    pub readings: Vec<Reading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<ChartPoint>>,
}

impl From<HistoryResult> for HistoryResponse {
    fn from(result: HistoryResult) -> Self {
        Self {
            empty: result.is_empty(),
            range: result.range,
            since: result.since,
            view: result.view,
            metric: result.metric,
            readings: result.readings,
            points: result.points,
        }
    }
}

fn parse_request(raw: Option<&str>) -> HistoryRequest {
    let mut range = None;
    let mut view = None;
    let mut request = HistoryRequest::default();
    let Some(raw) = raw else {
        return request;
    };
    for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
        let value = value.trim();
        match key.as_ref() {
            "range" => range = Some(value.to_string()),
            "view" => view = Some(value.to_string()),
            "metric" if !value.is_empty() => request.metric = Some(value.to_string()),
            "device_id" if !value.is_empty() => request.device_id = Some(value.to_string()),
            "after_id" => request.after_id = value.parse::<i64>().ok().filter(|id| *id > 0),
            _ => {}
        }
    }
    request.range = TimeRange::parse(range.as_deref());
    request.view = HistoryView::parse(view.as_deref());
    request
}

/// Readings inside a recent time window, for charts and the history table.
#[utoipa::path(
    get,
    path = "/api/history",
    tag = "history",
    params(
        ("range" = Option<String>, Query, description = "1h, 6h, 24h (default) or 7d"),
        ("metric" = Option<String>, Query, description = "Metric to extract as a chart series"),
        ("device_id" = Option<String>, Query, description = "Only readings from this device"),
        ("view" = Option<String>, Query, description = "chart (oldest first) or table (newest first)"),
        ("after_id" = Option<i64>, Query, description = "Only readings with a larger id")
    ),
    responses(
        (status = 200, description = "History window; `empty` is true when nothing matched"),
        (status = 500, description = "Storage failure", body = crate::error::ErrorBody)
    )
)]
pub(crate) async fn get_history(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> AppResult<Json<HistoryResponse>> {
    let request = parse_request(raw.as_deref());
    let result = state
        .history
        .fetch(&request)
        .await
        .map_err(|err| AppError::storage(&err, "Failed to retrieve data"))?;
    Ok(Json(result.into()))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/history", get(get_history))
}
