pub mod data;
pub mod health;
pub mod history;
pub mod live;

use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(live::router())
        .nest(
            "/api",
            Router::new()
                .merge(data::router())
                .merge(history::router())
                .merge(live::api_router())
                .merge(crate::openapi::router()),
        )
        .with_state(state)
}
