use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use crate::db::UserRepository;
use crate::error::{AppError, AppResult};
use crate::AppState;

/// Public calendar feed, mounted under `/sync`. Calendar clients poll it
/// without credentials.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/:filename", get(get_feed))
}

async fn get_feed(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> AppResult<Response> {
    let username = filename
        .strip_suffix(".ics")
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AppError::BadRequest("Feed path must be <username>.ics".to_string()))?;

    let user = UserRepository::find_by_username(&state.db, username)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", username)))?;

    let text = state.feeds.feed_for(&user.id).await?;
    let disposition = format!(
        "attachment; filename={}_{}.ics",
        user.username, state.config.server.app_name
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        text,
    )
        .into_response())
}
