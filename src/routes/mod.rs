use std::sync::Arc;

use axum::{routing::get, Router};

use crate::AppState;

pub mod auth;
pub mod calendar;
pub mod feed;
pub mod health;
pub mod subscriptions;

/// Authenticated API plus health check. The public feed is mounted
/// separately so it can carry its own rate limit.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/calendar", calendar::router())
        .nest("/api/subscriptions", subscriptions::router())
}
