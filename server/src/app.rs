use std::time::Duration;

use axum::{
    Router,
    http::{Method, header},
    routing::{get, post},
};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};

use crate::routes;
use crate::state::AppState;

pub(crate) fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::IF_NONE_MATCH])
        .expose_headers([header::ETAG])
        .allow_origin(Any)
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/api/board", get(routes::api::get_board))
        .route("/api/snapshot", get(routes::api::get_snapshot))
        .route("/api/roster", get(routes::api::get_roster))
        .route("/api/refresh", post(routes::api::post_refresh))
        .route("/api/refresh/pause", post(routes::api::pause_refresh))
        .route("/api/refresh/resume", post(routes::api::resume_refresh))
        .route("/api/events", get(routes::sse::board_events))
        .route("/api/health", get(routes::api::health))
        .route("/api/metrics", get(routes::api::metrics))
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}
