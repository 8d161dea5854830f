use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::{CreateSubscription, Subscription};
use crate::error::{AppError, AppResult};
use crate::routes::auth::AuthUser;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_subscriptions).post(subscribe))
        .route("/sync", post(resync))
        .route("/matches", get(upcoming_matches))
        .route("/:team_id", delete(unsubscribe))
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub team_id: i64,
    pub team_name: String,
    pub team_logo: Option<String>,
    pub filters: Option<Vec<String>>,
}

impl SubscribeRequest {
    fn validate(self) -> AppResult<CreateSubscription> {
        if self.team_id <= 0 {
            return Err(AppError::Validation("team_id must be positive".to_string()));
        }
        let team_name = self.team_name.trim().to_string();
        if team_name.is_empty() {
            return Err(AppError::Validation("team_name is required".to_string()));
        }

        let filters = match self.filters {
            Some(keywords) => {
                let keywords: Vec<String> = keywords
                    .into_iter()
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect();
                (!keywords.is_empty()).then_some(keywords)
            }
            None => None,
        };

        Ok(CreateSubscription {
            team_id: self.team_id,
            team_name,
            team_logo: self.team_logo.filter(|l| !l.trim().is_empty()),
            filters,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub team_id: i64,
    pub team_name: String,
    pub team_logo: Option<String>,
    pub filters: Option<Vec<String>>,
    pub created_at: String,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(sub: Subscription) -> Self {
        let filters = sub.filter_spec().unwrap_or_else(|e| {
            tracing::warn!("Ignoring unreadable filters: {}", e);
            None
        });
        Self {
            team_id: sub.team_id,
            team_name: sub.team_name,
            team_logo: sub.team_logo,
            filters,
            created_at: sub.created_at.and_utc().to_rfc3339(),
        }
    }
}

async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<SubscriptionResponse>>> {
    let subscriptions = state.subscriptions.list(&user.id).await?;
    Ok(Json(subscriptions.into_iter().map(Into::into).collect()))
}

async fn subscribe(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<SubscribeRequest>,
) -> AppResult<Json<Value>> {
    let create = request.validate()?;
    let (subscription, added) = state.sync.subscribe(&user.id, create).await?;

    Ok(Json(json!({
        "subscription": SubscriptionResponse::from(subscription),
        "added": added,
        "feed_url": state.config.feed_url(&user.username),
    })))
}

async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(team_id): Path<i64>,
) -> AppResult<Json<Value>> {
    let removed = state.sync.remove_subscription(&user.id, team_id).await?;
    Ok(Json(json!({ "removed_fixtures": removed })))
}

async fn resync(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Value>> {
    let added = state.sync.manual_resync(&user.id).await?;
    Ok(Json(json!({
        "message": format!("Synced {} new fixtures", added),
        "added": added,
    })))
}

/// Next matches of every subscribed team, without saving them.
async fn upcoming_matches(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Value>> {
    let matches = state.sync.upcoming_matches(&user.id).await?;
    Ok(Json(json!({ "matches": matches })))
}
