//! Keyed record stores used by the sync engine and the feed cache.
//!
//! The services only see these traits; production wires the SQLite
//! implementations below, tests use in-memory doubles.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::db::models::{CreateSubscription, SavedFixture, Subscription};
use crate::db::repository::{SavedFixtureRepository, SubscriptionRepository};
use crate::error::AppResult;
use crate::services::football::Fixture;

/// Per-owner saved matches, unique per (owner, fixture id).
#[async_trait]
pub trait FixtureStore: Send + Sync {
    async fn list(&self, owner: &str) -> AppResult<Vec<SavedFixture>>;

    async fn exists(&self, owner: &str, fixture_id: i64) -> AppResult<bool>;

    /// Insert all fixtures atomically, skipping ones already saved. Returns
    /// how many were new.
    async fn insert_many(&self, owner: &str, fixtures: &[Fixture]) -> AppResult<u64>;

    async fn update_payload(&self, owner: &str, fixture: &Fixture) -> AppResult<()>;

    async fn delete(&self, owner: &str, fixture_id: i64) -> AppResult<bool>;

    async fn delete_many(&self, owner: &str, fixture_ids: &[i64]) -> AppResult<u64>;

    async fn clear(&self, owner: &str) -> AppResult<u64>;
}

/// Per-owner team subscriptions, unique per (owner, team id).
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn list(&self, owner: &str) -> AppResult<Vec<Subscription>>;

    async fn upsert(&self, owner: &str, create: CreateSubscription) -> AppResult<Subscription>;

    async fn delete(&self, owner: &str, team_id: i64) -> AppResult<bool>;
}

#[derive(Clone)]
pub struct SqliteFixtureStore {
    pool: SqlitePool,
}

impl SqliteFixtureStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FixtureStore for SqliteFixtureStore {
    async fn list(&self, owner: &str) -> AppResult<Vec<SavedFixture>> {
        SavedFixtureRepository::find_by_user_id(&self.pool, owner).await
    }

    async fn exists(&self, owner: &str, fixture_id: i64) -> AppResult<bool> {
        SavedFixtureRepository::exists(&self.pool, owner, fixture_id).await
    }

    async fn insert_many(&self, owner: &str, fixtures: &[Fixture]) -> AppResult<u64> {
        SavedFixtureRepository::insert_many(&self.pool, owner, fixtures).await
    }

    async fn update_payload(&self, owner: &str, fixture: &Fixture) -> AppResult<()> {
        SavedFixtureRepository::update_payload(&self.pool, owner, fixture).await
    }

    async fn delete(&self, owner: &str, fixture_id: i64) -> AppResult<bool> {
        SavedFixtureRepository::delete(&self.pool, owner, fixture_id).await
    }

    async fn delete_many(&self, owner: &str, fixture_ids: &[i64]) -> AppResult<u64> {
        SavedFixtureRepository::delete_many(&self.pool, owner, fixture_ids).await
    }

    async fn clear(&self, owner: &str) -> AppResult<u64> {
        SavedFixtureRepository::delete_all_for_user(&self.pool, owner).await
    }
}

#[derive(Clone)]
pub struct SqliteSubscriptionStore {
    pool: SqlitePool,
}

impl SqliteSubscriptionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionStore for SqliteSubscriptionStore {
    async fn list(&self, owner: &str) -> AppResult<Vec<Subscription>> {
        SubscriptionRepository::find_by_user_id(&self.pool, owner).await
    }

    async fn upsert(&self, owner: &str, create: CreateSubscription) -> AppResult<Subscription> {
        SubscriptionRepository::upsert(&self.pool, owner, create).await
    }

    async fn delete(&self, owner: &str, team_id: i64) -> AppResult<bool> {
        SubscriptionRepository::delete(&self.pool, owner, team_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fixture, pool_with_user};

    #[tokio::test]
    async fn sqlite_stores_delegate_to_repositories() {
        let (pool, user) = pool_with_user("alice").await;
        let fixtures = SqliteFixtureStore::new(pool.clone());
        let subscriptions = SqliteSubscriptionStore::new(pool);

        assert_eq!(fixtures.insert_many(&user.id, &[fixture(1), fixture(2)]).await.unwrap(), 2);
        assert_eq!(fixtures.list(&user.id).await.unwrap().len(), 2);
        assert_eq!(fixtures.clear(&user.id).await.unwrap(), 2);

        let sub = subscriptions
            .upsert(
                &user.id,
                CreateSubscription {
                    team_id: 604,
                    team_name: "Manchester United".to_string(),
                    team_logo: None,
                    filters: None,
                },
            )
            .await
            .unwrap();
        let listed = subscriptions.list(&user.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, sub.id);
    }
}
