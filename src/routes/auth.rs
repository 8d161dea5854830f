use std::sync::Arc;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::db::{User, UserRepository};
use crate::error::AppError;
use crate::AppState;

/// Bearer token claims. Tokens are issued elsewhere; this service only
/// verifies them.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

/// Decode and validate a JWT, returning the claims
fn decode_jwt(state: &Arc<AppState>, token: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.config.jwt.secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

async fn get_user_from_token(state: &Arc<AppState>, token: &str) -> Result<User, AppError> {
    let claims = decode_jwt(state, token)?;
    UserRepository::find_by_id(&state.db, &claims.sub)
        .await?
        .ok_or(AppError::Unauthorized)
}

// ============================================================================
// Auth Extractor
// ============================================================================

/// Extractor for authenticated user
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                tracing::debug!("Missing or invalid Authorization header");
                AppError::Unauthorized
            })?;

        if !auth_header.to_ascii_lowercase().starts_with("bearer ") {
            tracing::debug!("Authorization header doesn't start with 'Bearer '");
            return Err(AppError::Unauthorized);
        }

        let token = auth_header[7..].trim();
        if token.is_empty() {
            tracing::debug!("Empty bearer token in Authorization header");
            return Err(AppError::Unauthorized);
        }

        let user = get_user_from_token(state, token).await.map_err(|e| {
            tracing::debug!("Failed to get user from token: {:?}", e);
            e
        })?;

        Ok(AuthUser(user))
    }
}
