//! The served application: API routes, the dashboard fallback, and the
//! per-client POST rate limit and CORS policy taken from [`HubConfig`].
//!
//! [`HubConfig`]: crate::config::HubConfig

use anyhow::{Context, Result};
use axum::Router;
use std::time::Duration;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::CorsLayer;

use crate::state::AppState;
use crate::{routes, static_assets};

const LIMITER_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Time for one request slot to come back when each client may send
/// `per_second` requests per second.
fn replenish_period(per_second: u64) -> Duration {
    Duration::from_nanos((1_000_000_000 / per_second.max(1)).max(1))
}

/// Builds the router. Must run inside a tokio runtime when rate limiting is
/// on: the limiter's sweep task stops with `state.shutdown`.
pub fn build(state: AppState) -> Result<Router> {
    let config = state.config.clone();
    let shutdown = state.shutdown.clone();

    let mut app = routes::router(state)
        .fallback_service(static_assets::service(config.static_root.clone())?);

    if config.rate_limit_per_second > 0 {
        let governor_conf = GovernorConfigBuilder::default()
            .period(replenish_period(config.rate_limit_per_second))
            .burst_size(config.rate_limit_burst)
            .methods(vec![axum::http::Method::POST])
            .use_headers()
            .finish()
            .context("failed to build rate limiter config")?;

        let limiter = governor_conf.limiter().clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(LIMITER_SWEEP_INTERVAL) => limiter.retain_recent(),
                }
            }
        });
        app = app.layer(GovernorLayer::new(governor_conf));
    }
    if config.cors_allow_any {
        app = app.layer(CorsLayer::permissive());
    }
    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_hub_with;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode};
    use std::net::SocketAddr;
    use tower::ServiceExt;

    const DEVICE: &str = "192.168.1.40:50123";

    fn from_device(method: &str, uri: &str, body: Body) -> Request<Body> {
        let peer: SocketAddr = DEVICE.parse().unwrap();
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .header("origin", "http://dashboard.local")
            .extension(ConnectInfo(peer))
            .body(body)
            .unwrap()
    }

    fn reading() -> Body {
        Body::from(r#"{"device_id":"A","temperature":20.5,"humidity":41.0,"light":12.0}"#)
    }

    async fn post_status(app: &Router) -> StatusCode {
        app.clone()
            .oneshot(from_device("POST", "/api/data", reading()))
            .await
            .unwrap()
            .status()
    }

    #[test]
    fn replenish_period_is_the_inverse_of_the_rate() {
        assert_eq!(replenish_period(1), Duration::from_secs(1));
        assert_eq!(replenish_period(20), Duration::from_millis(50));
        assert_eq!(replenish_period(0), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn post_limit_refills_at_the_configured_rate() {
        let hub = test_hub_with(|config| {
            config.rate_limit_per_second = 20;
            config.rate_limit_burst = 1;
        });
        let app = build(hub.state.clone()).unwrap();

        assert_eq!(post_status(&app).await, StatusCode::CREATED);
        assert_eq!(post_status(&app).await, StatusCode::TOO_MANY_REQUESTS);

        // One slot comes back every 50ms.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(post_status(&app).await, StatusCode::CREATED);

        // Reads are never limited.
        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(from_device("GET", "/api/data", Body::empty()))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn zero_rate_disables_the_limit() {
        let hub = test_hub_with(|config| {
            config.rate_limit_per_second = 0;
            config.rate_limit_burst = 1;
        });
        let app = build(hub.state.clone()).unwrap();
        for _ in 0..5 {
            assert_eq!(post_status(&app).await, StatusCode::CREATED);
        }
    }

    #[tokio::test]
    async fn cors_follows_config() {
        for allow_any in [true, false] {
            let hub = test_hub_with(|config| config.cors_allow_any = allow_any);
            let response = build(hub.state.clone())
                .unwrap()
                .oneshot(from_device("GET", "/healthz", Body::empty()))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                response.headers().contains_key("access-control-allow-origin"),
                allow_any
            );
        }
    }

    #[tokio::test]
    async fn unknown_paths_fall_back_to_the_dashboard() {
        let hub = test_hub_with(|_| {});
        let response = build(hub.state.clone())
            .unwrap()
            .oneshot(from_device("GET", "/charts", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
