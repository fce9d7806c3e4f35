use axum::{extract::State, Json};

use crate::app_state::{AppState, StatusReport};
use crate::models::ApiResponse;

pub async fn health_check() -> &'static str {
    "OK"
}

pub async fn get_status(State(state): State<AppState>) -> Json<ApiResponse<StatusReport>> {
    Json(ApiResponse::ok(state.snapshot().await))
}
