use axum::{extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::{AppState, utils::success_to_api_response};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    /// 服务器时间
    pub timestamp: i64,
    pub live_subscribers: usize,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        success_to_api_response(HealthResponse {
            status: "ok".to_string(),
            timestamp: chrono::Utc::now().timestamp(),
            live_subscribers: state.live.subscriber_count(),
        }),
    )
}
