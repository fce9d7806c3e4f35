//! Route definitions for the status endpoint

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::handlers::{get_status, health_check};

pub fn status_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
