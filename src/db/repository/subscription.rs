use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{CreateSubscription, Subscription};
use crate::error::{AppError, AppResult};

/// Repository for the `subscriptions` table. Rows are unique per
/// (user_id, team_id).
pub struct SubscriptionRepository;

impl SubscriptionRepository {
    pub async fn find_by_user_id(pool: &SqlitePool, user_id: &str) -> AppResult<Vec<Subscription>> {
        sqlx::query_as::<_, Subscription>(
            r#"
            SELECT id, user_id, team_id, team_name, team_logo, filters, created_at, updated_at
            FROM subscriptions
            WHERE user_id = ?
            ORDER BY created_at ASC, team_id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Create a subscription, or update name/logo/filters of the existing one.
    pub async fn upsert(
        pool: &SqlitePool,
        user_id: &str,
        create: CreateSubscription,
    ) -> AppResult<Subscription> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();
        let filters = create
            .filters
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| AppError::Internal(e.into()))?;

        sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions (
                id, user_id, team_id, team_name, team_logo, filters, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, team_id) DO UPDATE SET
                team_name = excluded.team_name,
                team_logo = excluded.team_logo,
                filters = excluded.filters,
                updated_at = excluded.updated_at
            RETURNING id, user_id, team_id, team_name, team_logo, filters, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(create.team_id)
        .bind(create.team_name)
        .bind(create.team_logo)
        .bind(filters)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn delete(pool: &SqlitePool, user_id: &str, team_id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE user_id = ? AND team_id = ?")
            .bind(user_id)
            .bind(team_id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::pool_with_user;

    fn create(team_id: i64, filters: Option<Vec<&str>>) -> CreateSubscription {
        CreateSubscription {
            team_id,
            team_name: format!("Team {}", team_id),
            team_logo: None,
            filters: filters.map(|f| f.into_iter().map(str::to_string).collect()),
        }
    }

    #[tokio::test]
    async fn resubscribing_updates_in_place() {
        let (pool, user) = pool_with_user("alice").await;

        let first = SubscriptionRepository::upsert(&pool, &user.id, create(604, None))
            .await
            .unwrap();
        let mut again = create(604, Some(vec!["Cup"]));
        again.team_name = "Renamed".to_string();
        let second = SubscriptionRepository::upsert(&pool, &user.id, again).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.team_name, "Renamed");
        assert_eq!(second.filter_spec().unwrap(), Some(vec!["Cup".to_string()]));

        let all = SubscriptionRepository::find_by_user_id(&pool, &user.id).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn delete_reports_whether_a_row_existed() {
        let (pool, user) = pool_with_user("alice").await;
        SubscriptionRepository::upsert(&pool, &user.id, create(33, None))
            .await
            .unwrap();

        assert!(SubscriptionRepository::delete(&pool, &user.id, 33).await.unwrap());
        assert!(!SubscriptionRepository::delete(&pool, &user.id, 33).await.unwrap());
        assert!(SubscriptionRepository::find_by_user_id(&pool, &user.id)
            .await
            .unwrap()
            .is_empty());
    }
}
