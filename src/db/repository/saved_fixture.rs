use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::SavedFixture;
use crate::error::{AppError, AppResult};
use crate::services::football::Fixture;

/// Repository for the `saved_fixtures` table. Rows are unique per
/// (user_id, fixture_id).
pub struct SavedFixtureRepository;

impl SavedFixtureRepository {
    /// All saved fixtures of a user, most recently added first.
    pub async fn find_by_user_id(pool: &SqlitePool, user_id: &str) -> AppResult<Vec<SavedFixture>> {
        sqlx::query_as::<_, SavedFixture>(
            r#"
            SELECT id, user_id, fixture_id, fixture_data, added_at, updated_at
            FROM saved_fixtures
            WHERE user_id = ?
            ORDER BY added_at DESC, fixture_id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn exists(pool: &SqlitePool, user_id: &str, fixture_id: i64) -> AppResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM saved_fixtures WHERE user_id = ? AND fixture_id = ?",
        )
        .bind(user_id)
        .bind(fixture_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.is_some())
    }

    /// Insert fixtures in one transaction, skipping ones the user already has.
    ///
    /// Returns the number of rows actually inserted. Nothing is written if any
    /// statement or the commit fails.
    pub async fn insert_many(
        pool: &SqlitePool,
        user_id: &str,
        fixtures: &[Fixture],
    ) -> AppResult<u64> {
        let now = Utc::now().naive_utc();
        let mut tx = pool.begin().await.map_err(AppError::Database)?;
        let mut inserted = 0;

        for fixture in fixtures {
            let payload =
                serde_json::to_string(fixture).map_err(|e| AppError::Internal(e.into()))?;

            let result = sqlx::query(
                r#"
                INSERT INTO saved_fixtures (id, user_id, fixture_id, fixture_data, added_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(user_id, fixture_id) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(user_id)
            .bind(fixture.id())
            .bind(payload)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

            inserted += result.rows_affected();
        }

        tx.commit().await.map_err(AppError::Database)?;
        Ok(inserted)
    }

    /// Overwrite the stored payload with a fresher copy of the same match.
    pub async fn update_payload(
        pool: &SqlitePool,
        user_id: &str,
        fixture: &Fixture,
    ) -> AppResult<()> {
        let now = Utc::now().naive_utc();
        let payload = serde_json::to_string(fixture).map_err(|e| AppError::Internal(e.into()))?;

        sqlx::query(
            r#"
            UPDATE saved_fixtures
            SET fixture_data = ?,
                updated_at = ?
            WHERE user_id = ? AND fixture_id = ?
            "#,
        )
        .bind(payload)
        .bind(now)
        .bind(user_id)
        .bind(fixture.id())
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    pub async fn delete(pool: &SqlitePool, user_id: &str, fixture_id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM saved_fixtures WHERE user_id = ? AND fixture_id = ?")
            .bind(user_id)
            .bind(fixture_id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_many(
        pool: &SqlitePool,
        user_id: &str,
        fixture_ids: &[i64],
    ) -> AppResult<u64> {
        let mut tx = pool.begin().await.map_err(AppError::Database)?;
        let mut deleted = 0;

        for fixture_id in fixture_ids {
            let result =
                sqlx::query("DELETE FROM saved_fixtures WHERE user_id = ? AND fixture_id = ?")
                    .bind(user_id)
                    .bind(fixture_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(AppError::Database)?;
            deleted += result.rows_affected();
        }

        tx.commit().await.map_err(AppError::Database)?;
        Ok(deleted)
    }

    pub async fn delete_all_for_user(pool: &SqlitePool, user_id: &str) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM saved_fixtures WHERE user_id = ?")
            .bind(user_id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fixture, pool_with_user};

    #[tokio::test]
    async fn insert_many_skips_existing_rows() {
        let (pool, user) = pool_with_user("alice").await;

        let first = SavedFixtureRepository::insert_many(&pool, &user.id, &[fixture(1), fixture(2)])
            .await
            .unwrap();
        let second = SavedFixtureRepository::insert_many(&pool, &user.id, &[fixture(2), fixture(3)])
            .await
            .unwrap();

        assert_eq!(first, 2);
        assert_eq!(second, 1);
        let rows = SavedFixtureRepository::find_by_user_id(&pool, &user.id).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert!(SavedFixtureRepository::exists(&pool, &user.id, 3).await.unwrap());
        assert!(!SavedFixtureRepository::exists(&pool, &user.id, 4).await.unwrap());
    }

    #[tokio::test]
    async fn rows_are_scoped_to_their_owner() {
        let (pool, alice) = pool_with_user("alice").await;
        let bob = crate::db::UserRepository::create(&pool, "bob", "bob@example.com")
            .await
            .unwrap();

        SavedFixtureRepository::insert_many(&pool, &alice.id, &[fixture(1)]).await.unwrap();
        SavedFixtureRepository::insert_many(&pool, &bob.id, &[fixture(1)]).await.unwrap();

        assert_eq!(SavedFixtureRepository::delete_all_for_user(&pool, &alice.id).await.unwrap(), 1);
        assert!(SavedFixtureRepository::exists(&pool, &bob.id, 1).await.unwrap());
    }

    #[tokio::test]
    async fn update_payload_replaces_stored_json() {
        let (pool, user) = pool_with_user("alice").await;
        SavedFixtureRepository::insert_many(&pool, &user.id, &[fixture(1)]).await.unwrap();

        let mut fresh = fixture(1);
        fresh.fixture.status.short = "FT".to_string();
        SavedFixtureRepository::update_payload(&pool, &user.id, &fresh).await.unwrap();

        let rows = SavedFixtureRepository::find_by_user_id(&pool, &user.id).await.unwrap();
        assert_eq!(rows[0].payload().unwrap(), fresh);
    }

    #[tokio::test]
    async fn deletes_are_idempotent() {
        let (pool, user) = pool_with_user("alice").await;
        SavedFixtureRepository::insert_many(&pool, &user.id, &[fixture(1), fixture(2)])
            .await
            .unwrap();

        assert!(SavedFixtureRepository::delete(&pool, &user.id, 1).await.unwrap());
        assert!(!SavedFixtureRepository::delete(&pool, &user.id, 1).await.unwrap());
        assert_eq!(
            SavedFixtureRepository::delete_many(&pool, &user.id, &[1, 2, 3]).await.unwrap(),
            1
        );
    }
}
