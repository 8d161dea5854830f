//! Initialization helpers for the application:
//! - database connection + migrations
//! - feed cache storage selection
//! - wiring of the provider, stores, feed cache and sync engine

use std::{path::Path, sync::Arc};

use anyhow::Result;

use crate::config::Config;
use crate::db::{SqliteFixtureStore, SqliteSubscriptionStore};
use crate::services::feed_cache::{CacheStore, FeedCache, FileCacheStore, MemoryCacheStore};
use crate::services::football::FootballService;
use crate::services::ics::IcsRenderer;
use crate::services::sync::SyncEngine;

/// Redact potentially sensitive information from a database URL before logging.
///
/// Attempts to parse the URL and remove userinfo (username:password) components.
/// Falls back to removing everything before '@' or returning "(redacted)".
pub fn redact_db_url(db_url: &str) -> String {
    if let Ok(url) = url::Url::parse(db_url) {
        let scheme = url.scheme();
        let host = url.host_str().unwrap_or("");
        let port_part = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
        let path = url.path();
        format!("{}://{}{}{}", scheme, host, port_part, path)
    } else {
        if let Some(at_pos) = db_url.find('@') {
            let without_creds = &db_url[at_pos + 1..];
            return format!("(redacted){}", without_creds);
        }
        "(redacted)".to_string()
    }
}

/// Initialize SQLite database connection and run migrations.
///
/// Creates the parent directory for the database file (if applicable),
/// opens a connection pool using `create_if_missing(true)` and runs migrations.
pub async fn init_db(config: &Config) -> Result<sqlx::SqlitePool> {
    let db_url = &config.database.url;
    tracing::info!("Connecting to database: {}", redact_db_url(db_url));

    let db_path = db_url.strip_prefix("sqlite://").unwrap_or(db_url);
    let db_file_path = Path::new(db_path);

    if let Some(parent) = db_file_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                )
            })?;
        }
    }

    let existed = db_file_path.exists();

    let connect_options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect_with(connect_options)
        .await?;

    if existed {
        tracing::info!("Connected to database file: {}", db_file_path.display());
    } else {
        tracing::info!("Database file created: {}", db_file_path.display());
    }

    tracing::info!("Running database migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// File-backed cache when a directory is configured, otherwise in-memory.
pub fn cache_store(config: &Config) -> Arc<dyn CacheStore> {
    match &config.feed.cache_dir {
        Some(dir) => {
            tracing::info!("Feed cache stored in {}", dir.display());
            Arc::new(FileCacheStore::new(dir.clone()))
        }
        None => {
            tracing::info!("Feed cache kept in memory");
            Arc::new(MemoryCacheStore::new())
        }
    }
}

/// Shared services built once at startup.
pub struct Services {
    pub fixtures: Arc<SqliteFixtureStore>,
    pub subscriptions: Arc<SqliteSubscriptionStore>,
    pub feeds: Arc<FeedCache>,
    pub sync: Arc<SyncEngine>,
}

pub fn build_services(config: &Config, pool: &sqlx::SqlitePool) -> Result<Services> {
    let provider = Arc::new(FootballService::new(&config.football)?);
    let fixtures = Arc::new(SqliteFixtureStore::new(pool.clone()));
    let subscriptions = Arc::new(SqliteSubscriptionStore::new(pool.clone()));

    let renderer = IcsRenderer::new(
        &config.server.app_name,
        chrono::Duration::minutes(config.feed.event_duration_minutes),
    );
    let ttl = chrono::Duration::seconds(
        i64::try_from(config.feed.cache_ttl_seconds).unwrap_or(i64::MAX / 1000),
    );

    let feeds = Arc::new(FeedCache::new(
        provider.clone(),
        fixtures.clone(),
        cache_store(config),
        renderer,
        ttl,
    ));

    let sync = Arc::new(SyncEngine::new(
        provider,
        fixtures.clone(),
        subscriptions.clone(),
        feeds.clone(),
        config.sync.fixtures_per_team,
    ));

    Ok(Services {
        fixtures,
        subscriptions,
        feeds,
        sync,
    })
}
