use sqlx::SqlitePool;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// User Repository
// ============================================================================

pub struct UserRepository;

impl UserRepository {
    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, created_at, updated_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_by_username(pool: &SqlitePool, username: &str) -> AppResult<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, created_at, updated_at
            FROM users
            WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Accounts are provisioned by the identity service; only tests create them.
    #[cfg(test)]
    pub async fn create(pool: &SqlitePool, username: &str, email: &str) -> AppResult<User> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().naive_utc();

        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, email, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, username, email, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(username)
        .bind(email)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }
}
