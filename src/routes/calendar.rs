use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{AppError, AppErrorWithDetails, AppResult};
use crate::routes::auth::AuthUser;
use crate::services::football::{Fixture, TeamInfo};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/add", post(add_fixtures))
        .route("/events", get(list_events))
        .route("/events/:fixture_id", delete(remove_event))
        .route("/clear", delete(clear_calendar))
}

#[derive(Debug, Deserialize)]
pub struct AddFixturesRequest {
    #[serde(default)]
    pub fixtures: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct SavedEvent {
    pub id: String,
    pub fixture_id: i64,
    pub home: TeamInfo,
    pub away: TeamInfo,
    pub date: String,
    pub league: String,
    pub status: String,
    pub added_at: String,
}

/// Validate every submitted match before saving any of them.
fn parse_fixtures(raw: Vec<Value>) -> Result<Vec<Fixture>, AppErrorWithDetails> {
    if raw.is_empty() {
        return Err(AppError::Validation("No fixtures provided".to_string()).into());
    }

    raw.into_iter()
        .enumerate()
        .map(|(index, value)| {
            serde_json::from_value::<Fixture>(value).map_err(|e| {
                AppError::Validation(format!("Fixture at index {} is invalid", index))
                    .with_details(json!({ "index": index, "reason": e.to_string() }))
            })
        })
        .collect()
}

async fn add_fixtures(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<AddFixturesRequest>,
) -> Result<Json<Value>, AppErrorWithDetails> {
    let fixtures = parse_fixtures(request.fixtures)?;
    let added = state.sync.add_fixtures(&user.id, &fixtures).await?;

    tracing::info!("User {} saved {} new fixture(s)", user.id, added);

    Ok(Json(json!({
        "message": format!("Saved {} fixtures", added),
        "added": added,
        "feed_url": state.config.feed_url(&user.username),
    })))
}

async fn list_events(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<SavedEvent>>> {
    let saved = state.fixtures.list(&user.id).await?;

    let events = saved
        .into_iter()
        .filter_map(|record| match record.payload() {
            Ok(fixture) => Some(SavedEvent {
                id: record.id,
                fixture_id: record.fixture_id,
                home: fixture.teams.home,
                away: fixture.teams.away,
                date: fixture.fixture.date.to_rfc3339(),
                league: fixture.league.name,
                status: fixture.fixture.status.short,
                added_at: record.added_at.and_utc().to_rfc3339(),
            }),
            Err(e) => {
                tracing::warn!("Skipping saved fixture in listing: {}", e);
                None
            }
        })
        .collect();

    Ok(Json(events))
}

async fn remove_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(fixture_id): Path<i64>,
) -> AppResult<Json<Value>> {
    let removed = state.sync.remove_fixture(&user.id, fixture_id).await?;
    Ok(Json(json!({ "removed": removed })))
}

async fn clear_calendar(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Value>> {
    let removed = state.sync.clear(&user.id).await?;
    tracing::info!("User {} cleared {} saved fixture(s)", user.id, removed);
    Ok(Json(json!({ "removed": removed })))
}
