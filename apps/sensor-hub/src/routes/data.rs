use axum::extract::{FromRequest, RawQuery, Request, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use url::form_urlencoded;

use crate::error::{AppError, AppResult};
use crate::reading::Reading;
use crate::state::AppState;
use crate::store::{QueryOrder, ReadingFilter, StoreHandle};

/// Any JSON document; unreadable bodies are answered as `400 {"error": ...}`.
pub(crate) struct ReadingBody(pub Value);

impl<S: Send + Sync> FromRequest<S> for ReadingBody {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(body) = Json::<Value>::from_request(req, state).await?;
        Ok(Self(body))
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct SaveResponse {
    pub success: bool,
    pub message: String,
    pub id: i64,
}

/// Accepts one reading from a device.
///
/// The body is a flat JSON object: `device_id`, optional `timestamp`
/// (device milliseconds), optional `device_class`, plus numeric metrics.
#[utoipa::path(
    post,
    path = "/api/data",
    tag = "data",
    responses(
        (status = 201, description = "Reading stored", body = SaveResponse),
        (status = 400, description = "Invalid reading", body = crate::error::ErrorBody),
        (status = 500, description = "Storage failure", body = crate::error::ErrorBody)
    )
)]
pub(crate) async fn post_data(
    State(state): State<AppState>,
    ReadingBody(body): ReadingBody,
) -> AppResult<(StatusCode, Json<SaveResponse>)> {
    let reading = state.ingest.admit(body).await?;
    Ok((
        StatusCode::CREATED,
        Json(SaveResponse {
            success: true,
            message: "Data saved successfully".to_string(),
            id: reading.id,
        }),
    ))
}

/// Most recent readings first, optionally for one device.
#[utoipa::path(
    get,
    path = "/api/data",
    tag = "data",
    params(
        ("limit" = Option<i64>, Query, description = "Maximum rows (default 100, capped at 1000)"),
        ("device_id" = Option<String>, Query, description = "Only readings from this device")
    ),
    responses(
        (status = 200, description = "Readings, newest first"),
        (status = 500, description = "Storage failure", body = crate::error::ErrorBody)
    )
)]
pub(crate) async fn get_data(
    State(store): State<StoreHandle>,
    RawQuery(raw): RawQuery,
) -> AppResult<Json<Vec<Reading>>> {
    let mut limit: Option<i64> = None;
    let mut device_id: Option<String> = None;
    if let Some(raw) = raw {
        for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
            match key.as_ref() {
                // Garbage limits fall back to the default rather than failing.
                "limit" => limit = value.trim().parse::<i64>().ok(),
                "device_id" => {
                    let value = value.trim();
                    device_id = (!value.is_empty()).then(|| value.to_string());
                }
                _ => {}
            }
        }
    }

    let filter = ReadingFilter {
        device_id,
        ..ReadingFilter::default()
    };
    let readings = store
        .query(filter, limit, QueryOrder::Descending)
        .await
        .map_err(|err| AppError::storage(&err, "Failed to retrieve data"))?;
    Ok(Json(readings))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/data", get(get_data).post(post_data))
}

#[cfg(test)]
mod tests {
    use crate::test_support::test_hub;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post(body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/data")
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn environment(device_id: &str, timestamp: i64, temperature: f64) -> String {
        json!({
            "device_id": device_id,
            "timestamp": timestamp,
            "temperature": temperature,
            "humidity": 40.0,
            "light": 300.0,
        })
        .to_string()
    }

    #[tokio::test]
    async fn accepted_reading_returns_created_with_id() {
        let hub = test_hub();
        let app = hub.router();

        let (status, body) = send(&app, post(environment("A", 1_000, 21.5))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Data saved successfully");
        assert_eq!(body["id"], 1);

        let (status, rows) = send(&app, get("/api/data")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rows[0]["device_id"], "A");
        assert_eq!(rows[0]["temperature"], 21.5);
        assert_eq!(rows[0]["timestamp"], 1_000);
        assert!(rows[0]["created_at"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn missing_metric_is_rejected_and_not_stored() {
        let hub = test_hub();
        let app = hub.router();

        let body = json!({"device_id": "A", "temperature": 20.0, "humidity": 50.0}).to_string();
        let (status, body) = send(&app, post(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing required sensor data: light");

        let (_, rows) = send(&app, get("/api/data")).await;
        assert_eq!(rows, json!([]));
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let hub = test_hub();
        let app = hub.router();

        let (status, body) = send(&app, post("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn storage_failure_is_an_opaque_server_error() {
        let hub = test_hub();
        let app = hub.router();
        send(&app, post(environment("A", 500, 19.0))).await;
        rusqlite::Connection::open(hub.database_path())
            .unwrap()
            .execute_batch("DROP TABLE reading_metrics;")
            .unwrap();

        let (status, body) = send(&app, post(environment("A", 1_000, 21.5))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to save data");

        let (status, body) = send(&app, get("/api/data")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to retrieve data");
    }

    #[tokio::test]
    async fn lists_newest_device_time_first_and_filters_by_device() {
        let hub = test_hub();
        let app = hub.router();

        // Arrives first, but was measured later.
        send(&app, post(environment("B", 2_000, 22.0))).await;
        send(&app, post(environment("A", 1_000, 20.0))).await;
        send(&app, post(environment("A", 3_000, 24.0))).await;

        let (_, rows) = send(&app, get("/api/data")).await;
        let order: Vec<i64> = rows
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row["timestamp"].as_i64().unwrap())
            .collect();
        assert_eq!(order, vec![3_000, 2_000, 1_000]);

        let (_, rows) = send(&app, get("/api/data?device_id=A&limit=1")).await;
        assert_eq!(rows.as_array().unwrap().len(), 1);
        assert_eq!(rows[0]["timestamp"], 3_000);
    }

    #[tokio::test]
    async fn only_accepted_postings_reach_live_viewers() {
        let hub = test_hub();
        let app = hub.router();
        let mut viewer = hub.state.sessions.connect();

        let rejected = json!({"device_id": "B", "temperature": 20.0}).to_string();
        let (status, _) = send(&app, post(rejected)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, body) = send(&app, post(environment("A", 1_000, 21.5))).await;
        assert_eq!(status, StatusCode::CREATED);

        let delivered = tokio::time::timeout(Duration::from_secs(5), viewer.recv())
            .await
            .expect("live update in time")
            .expect("session open");
        assert_eq!(delivered.id, body["id"].as_i64().unwrap());
        assert_eq!(delivered.device_id, "A");
        assert_eq!(delivered.metric("temperature"), Some(21.5));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(viewer.try_recv().is_none());
    }

    #[tokio::test]
    async fn unparseable_limit_uses_the_default() {
        let hub = test_hub();
        let app = hub.router();
        for ts in 1..=3 {
            send(&app, post(environment("A", ts, 20.0))).await;
        }

        for uri in ["/api/data?limit=abc", "/api/data?limit=-4", "/api/data?limit=0"] {
            let (status, rows) = send(&app, get(uri)).await;
            assert_eq!(status, StatusCode::OK, "{uri}");
            assert_eq!(rows.as_array().unwrap().len(), 3, "{uri}");
        }
    }
}
