use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// `live` when an upstream credential is configured, `demo` otherwise.
    pub provider: String,
    pub timestamp: String,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let provider = if state.config.football.is_demo() {
        "demo"
    } else {
        "live"
    };

    let response = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        provider: provider.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(response))
}
