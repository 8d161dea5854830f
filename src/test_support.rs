//! Shared helpers for unit tests: an in-memory SQLite pool with the real
//! migrations, in-memory store doubles and scriptable fixture providers.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::db::models::{CreateSubscription, SavedFixture, Subscription, User};
use crate::db::repository::UserRepository;
use crate::db::store::{FixtureStore, SubscriptionStore};
use crate::error::{AppError, AppResult};
use crate::services::feed_cache::{CacheEntry, CacheStore, MemoryCacheStore};
use crate::services::football::{
    demo_fixtures, Fixture, FixtureProvider, FixtureWindow, UpstreamFixtures,
};

// ============================================================================
// Database
// ============================================================================

/// Single-connection in-memory database; every connection to
/// `sqlite::memory:` is a separate database, so the pool must never recycle.
pub async fn memory_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("memory url")
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .expect("in-memory sqlite");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");

    pool
}

pub async fn pool_with_user(username: &str) -> (SqlitePool, User) {
    let pool = memory_pool().await;
    let user = UserRepository::create(&pool, username, &format!("{}@example.com", username))
        .await
        .expect("create user");
    (pool, user)
}

// ============================================================================
// Fixtures
// ============================================================================

/// The demo fixture with a different match id.
pub fn fixture(id: i64) -> Fixture {
    let mut f = demo_fixtures().remove(0);
    f.fixture.id = id;
    f
}

pub fn competition_fixture(id: i64, home: i64, away: i64, league: &str, kind: &str) -> Fixture {
    let mut f = fixture(id);
    f.teams.home.id = home;
    f.teams.away.id = away;
    f.league.name = league.to_string();
    f.league.kind = Some(kind.to_string());
    f
}

pub fn subscription_request(team_id: i64, filters: Option<&[&str]>) -> CreateSubscription {
    CreateSubscription {
        team_id,
        team_name: format!("Team {}", team_id),
        team_logo: None,
        filters: filters.map(|f| f.iter().map(|k| k.to_string()).collect()),
    }
}

// ============================================================================
// In-memory stores
// ============================================================================

#[derive(Default)]
pub struct MemoryFixtureStore {
    rows: Mutex<Vec<SavedFixture>>,
    fail_writes: AtomicBool,
}

impl MemoryFixtureStore {
    /// Every subsequent insert fails as if the commit was rejected.
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Store a raw payload without validation.
    pub fn seed_raw(&self, owner: &str, fixture_id: i64, payload: &str) {
        let now = Utc::now().naive_utc();
        self.rows.lock().unwrap().push(SavedFixture {
            id: Uuid::new_v4().to_string(),
            user_id: owner.to_string(),
            fixture_id,
            fixture_data: payload.to_string(),
            added_at: now,
            updated_at: now,
        });
    }

    pub fn ids(&self, owner: &str) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == owner)
            .map(|r| r.fixture_id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl FixtureStore for MemoryFixtureStore {
    async fn list(&self, owner: &str) -> AppResult<Vec<SavedFixture>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == owner)
            .cloned()
            .collect())
    }

    async fn exists(&self, owner: &str, fixture_id: i64) -> AppResult<bool> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.user_id == owner && r.fixture_id == fixture_id))
    }

    async fn insert_many(&self, owner: &str, fixtures: &[Fixture]) -> AppResult<u64> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Persistence("commit rejected".to_string()));
        }

        let mut inserted = 0;
        for f in fixtures {
            if self.exists(owner, f.id()).await? {
                continue;
            }
            self.seed_raw(owner, f.id(), &serde_json::to_string(f).unwrap());
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn update_payload(&self, owner: &str, fixture: &Fixture) -> AppResult<()> {
        let payload = serde_json::to_string(fixture).unwrap();
        for row in self.rows.lock().unwrap().iter_mut() {
            if row.user_id == owner && row.fixture_id == fixture.id() {
                row.fixture_data = payload.clone();
            }
        }
        Ok(())
    }

    async fn delete(&self, owner: &str, fixture_id: i64) -> AppResult<bool> {
        Ok(self.delete_many(owner, &[fixture_id]).await? > 0)
    }

    async fn delete_many(&self, owner: &str, fixture_ids: &[i64]) -> AppResult<u64> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| !(r.user_id == owner && fixture_ids.contains(&r.fixture_id)));
        Ok((before - rows.len()) as u64)
    }

    async fn clear(&self, owner: &str) -> AppResult<u64> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| r.user_id != owner);
        Ok((before - rows.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemorySubscriptionStore {
    rows: Mutex<Vec<Subscription>>,
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn list(&self, owner: &str) -> AppResult<Vec<Subscription>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.user_id == owner)
            .cloned()
            .collect())
    }

    async fn upsert(&self, owner: &str, create: CreateSubscription) -> AppResult<Subscription> {
        let now = Utc::now().naive_utc();
        let filters = create.filters.map(|f| serde_json::to_string(&f).unwrap());
        let mut rows = self.rows.lock().unwrap();

        if let Some(existing) = rows
            .iter_mut()
            .find(|s| s.user_id == owner && s.team_id == create.team_id)
        {
            existing.team_name = create.team_name;
            existing.team_logo = create.team_logo;
            existing.filters = filters;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let sub = Subscription {
            id: Uuid::new_v4().to_string(),
            user_id: owner.to_string(),
            team_id: create.team_id,
            team_name: create.team_name,
            team_logo: create.team_logo,
            filters,
            created_at: now,
            updated_at: now,
        };
        rows.push(sub.clone());
        Ok(sub)
    }

    async fn delete(&self, owner: &str, team_id: i64) -> AppResult<bool> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|s| !(s.user_id == owner && s.team_id == team_id));
        Ok(rows.len() < before)
    }
}

impl MemorySubscriptionStore {
    /// Overwrite the stored filter JSON of a subscription.
    pub fn corrupt_filters(&self, owner: &str, team_id: i64, raw: &str) {
        for sub in self.rows.lock().unwrap().iter_mut() {
            if sub.user_id == owner && sub.team_id == team_id {
                sub.filters = Some(raw.to_string());
            }
        }
    }
}

/// Memory cache whose removals can be switched to fail.
#[derive(Default)]
pub struct FlakyCacheStore {
    inner: MemoryCacheStore,
    fail_removes: AtomicBool,
}

impl FlakyCacheStore {
    pub fn fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl CacheStore for FlakyCacheStore {
    async fn get(&self, owner: &str) -> AppResult<Option<CacheEntry>> {
        self.inner.get(owner).await
    }

    async fn put(&self, owner: &str, entry: CacheEntry) -> AppResult<()> {
        self.inner.put(owner, entry).await
    }

    async fn remove(&self, owner: &str) -> AppResult<()> {
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(AppError::Persistence("cache volume read-only".to_string()));
        }
        self.inner.remove(owner).await
    }
}

// ============================================================================
// Scriptable provider
// ============================================================================

/// Serves whatever fixtures a test registered. Teams marked as failing, and
/// by-id lookups while `by_ids_down` is set, return the fallback payload.
#[derive(Default)]
pub struct FakeProvider {
    schedules: Mutex<HashMap<i64, Vec<Fixture>>>,
    catalog: Mutex<HashMap<i64, Fixture>>,
    failing_teams: Mutex<HashSet<i64>>,
    by_ids_down: AtomicBool,
    pub by_ids_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn set_schedule(&self, team_id: i64, fixtures: Vec<Fixture>) {
        let mut catalog = self.catalog.lock().unwrap();
        for f in &fixtures {
            catalog.insert(f.id(), f.clone());
        }
        self.schedules.lock().unwrap().insert(team_id, fixtures);
    }

    /// Replace the upstream view of one match.
    pub fn update(&self, fixture: Fixture) {
        self.catalog.lock().unwrap().insert(fixture.id(), fixture);
    }

    pub fn fail_team(&self, team_id: i64) {
        self.failing_teams.lock().unwrap().insert(team_id);
    }

    pub fn set_by_ids_down(&self, down: bool) {
        self.by_ids_down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl FixtureProvider for FakeProvider {
    async fn fixtures_for_team(&self, team_id: i64, _window: FixtureWindow) -> UpstreamFixtures {
        if self.failing_teams.lock().unwrap().contains(&team_id) {
            return UpstreamFixtures::fallback();
        }
        let fixtures = self
            .schedules
            .lock()
            .unwrap()
            .get(&team_id)
            .cloned()
            .unwrap_or_default();
        UpstreamFixtures::live(fixtures)
    }

    async fn fixtures_by_ids(&self, ids: &[i64]) -> UpstreamFixtures {
        self.by_ids_calls.fetch_add(1, Ordering::SeqCst);
        if self.by_ids_down.load(Ordering::SeqCst) {
            return UpstreamFixtures::fallback();
        }
        let catalog = self.catalog.lock().unwrap();
        UpstreamFixtures::live(ids.iter().filter_map(|id| catalog.get(id).cloned()).collect())
    }
}

/// Wraps a [`FakeProvider`]; once armed, the next by-id lookup signals
/// `entered` and then waits for `release` before answering.
pub struct GatedProvider {
    pub inner: Arc<FakeProvider>,
    pub entered: Notify,
    pub release: Notify,
    armed: AtomicBool,
}

impl GatedProvider {
    pub fn new(inner: Arc<FakeProvider>) -> Self {
        Self {
            inner,
            entered: Notify::new(),
            release: Notify::new(),
            armed: AtomicBool::new(false),
        }
    }

    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl FixtureProvider for GatedProvider {
    async fn fixtures_for_team(&self, team_id: i64, window: FixtureWindow) -> UpstreamFixtures {
        self.inner.fixtures_for_team(team_id, window).await
    }

    async fn fixtures_by_ids(&self, ids: &[i64]) -> UpstreamFixtures {
        let result = self.inner.fixtures_by_ids(ids).await;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        result
    }
}
