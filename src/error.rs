use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// Network, timeout or parse failure talking to the fixture provider.
    #[error("Upstream unavailable: {0}")]
    Upstream(String),

    /// A stored record whose payload no longer parses.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// Failure of a non-database store (feed cache files).
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Storage failures abort the enclosing operation; everything else is per-item.
    pub fn is_persistence(&self) -> bool {
        matches!(self, AppError::Database(_) | AppError::Persistence(_))
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
                msg.clone(),
            ),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Jwt(e) => {
                tracing::warn!("JWT error: {:?}", e);
                (
                    StatusCode::UNAUTHORIZED,
                    "INVALID_TOKEN",
                    "Invalid or expired token".to_string(),
                )
            }
            AppError::Upstream(msg) => {
                tracing::error!("Upstream error: {}", msg);
                (StatusCode::BAD_GATEWAY, "UPSTREAM_UNAVAILABLE", msg.clone())
            }
            AppError::MalformedRecord(msg) => {
                tracing::error!("Malformed record: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "MALFORMED_RECORD",
                    "A stored record could not be read".to_string(),
                )
            }
            AppError::Persistence(msg) => {
                tracing::error!("Persistence error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "PERSISTENCE_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Config(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIG_ERROR",
                    "Server configuration error".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl AppError {
    pub fn with_details(self, details: serde_json::Value) -> AppErrorWithDetails {
        AppErrorWithDetails {
            error: self,
            details: Some(details),
        }
    }
}

pub struct AppErrorWithDetails {
    error: AppError,
    details: Option<serde_json::Value>,
}

impl IntoResponse for AppErrorWithDetails {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self.error {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                self.error.to_string(),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
                msg.clone(),
            ),
            // Everything else keeps the plain mapping (and its logging).
            _ => return self.error.into_response(),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details: self.details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<AppError> for AppErrorWithDetails {
    fn from(error: AppError) -> Self {
        AppErrorWithDetails {
            error,
            details: None,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
