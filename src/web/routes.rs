use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use crate::state::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::index))
        .route("/Raw_Capture", get(handlers::raw_capture))
        .route("/video_feed", get(handlers::video_feed))
        .route("/shutdown", get(handlers::shutdown))
        .route("/reboot", get(handlers::reboot))
        .route("/test_connection", get(handlers::test_connection))
        .route("/update_data", post(handlers::update_data))
        .route("/status", get(handlers::status))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
