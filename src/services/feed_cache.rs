//! Per-owner cache of rendered calendar feeds.
//!
//! Entries are derived data: they expire lazily after the TTL, are dropped by
//! every mutation path through [`FeedCache::invalidate`], and can be rebuilt
//! from the fixture store plus the provider at any time. A render that was
//! started before an invalidation is returned to its caller but never stored.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::db::store::FixtureStore;
use crate::error::{AppError, AppResult};
use crate::services::football::{Fixture, FixtureProvider};
use crate::services::ics::{FeedEntry, IcsRenderer};

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub text: String,
    pub generated_at: DateTime<Utc>,
}

/// Storage for rendered feeds, keyed by owner id.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, owner: &str) -> AppResult<Option<CacheEntry>>;

    async fn put(&self, owner: &str, entry: CacheEntry) -> AppResult<()>;

    /// Removing a missing entry is not an error.
    async fn remove(&self, owner: &str) -> AppResult<()>;
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, owner: &str) -> AppResult<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(owner).cloned())
    }

    async fn put(&self, owner: &str, entry: CacheEntry) -> AppResult<()> {
        self.entries.write().await.insert(owner.to_string(), entry);
        Ok(())
    }

    async fn remove(&self, owner: &str) -> AppResult<()> {
        self.entries.write().await.remove(owner);
        Ok(())
    }
}

// ============================================================================
// File store
// ============================================================================

/// One `.ics` file per owner; the file's modification time is the
/// generation timestamp.
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, owner: &str) -> PathBuf {
        self.dir.join(format!("{}.ics", urlencoding::encode(owner)))
    }
}

fn io_error(action: &str, path: &std::path::Path, e: std::io::Error) -> AppError {
    AppError::Persistence(format!("Failed to {} {}: {}", action, path.display(), e))
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn get(&self, owner: &str) -> AppResult<Option<CacheEntry>> {
        let path = self.path_for(owner);

        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error("read", &path, e)),
        };

        let modified = tokio::fs::metadata(&path)
            .await
            .and_then(|m| m.modified())
            .map_err(|e| io_error("stat", &path, e))?;

        Ok(Some(CacheEntry {
            text,
            generated_at: DateTime::<Utc>::from(modified),
        }))
    }

    async fn put(&self, owner: &str, entry: CacheEntry) -> AppResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error("create", &self.dir, e))?;

        let path = self.path_for(owner);
        tokio::fs::write(&path, entry.text.as_bytes())
            .await
            .map_err(|e| io_error("write", &path, e))
    }

    async fn remove(&self, owner: &str) -> AppResult<()> {
        let path = self.path_for(owner);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("remove", &path, e)),
        }
    }
}

// ============================================================================
// Feed cache
// ============================================================================

/// Invalidation bookkeeping for one owner.
#[derive(Debug, Default)]
struct OwnerSlot {
    /// Bumped by every invalidation; a render is only stored if the
    /// generation it started from is still current.
    generation: u64,
    /// Set when removing the stored entry failed; the entry must not be
    /// served until a newer render replaces it.
    untrusted: bool,
}

pub struct FeedCache {
    provider: Arc<dyn FixtureProvider>,
    fixtures: Arc<dyn FixtureStore>,
    store: Arc<dyn CacheStore>,
    renderer: IcsRenderer,
    ttl: Duration,
    slots: RwLock<HashMap<String, Arc<Mutex<OwnerSlot>>>>,
}

impl FeedCache {
    pub fn new(
        provider: Arc<dyn FixtureProvider>,
        fixtures: Arc<dyn FixtureStore>,
        store: Arc<dyn CacheStore>,
        renderer: IcsRenderer,
        ttl: Duration,
    ) -> Self {
        Self {
            provider,
            fixtures,
            store,
            renderer,
            ttl,
            slots: RwLock::new(HashMap::new()),
        }
    }

    async fn slot(&self, owner: &str) -> Arc<Mutex<OwnerSlot>> {
        if let Some(slot) = self.slots.read().await.get(owner) {
            return slot.clone();
        }
        self.slots
            .write()
            .await
            .entry(owner.to_string())
            .or_default()
            .clone()
    }

    /// Return the owner's feed, regenerating it when missing or expired.
    ///
    /// Upstream data refreshes stored payloads when it differs; if upstream is
    /// unavailable the stored payloads are rendered as they are.
    pub async fn feed_for(&self, owner: &str) -> AppResult<String> {
        let now = Utc::now();
        let slot = self.slot(owner).await;
        let (generation, untrusted) = {
            let state = slot.lock().await;
            (state.generation, state.untrusted)
        };

        if !untrusted {
            match self.store.get(owner).await {
                Ok(Some(entry)) if now - entry.generated_at < self.ttl => {
                    debug!("Serving cached feed for {}", owner);
                    return Ok(entry.text);
                }
                Ok(_) => {}
                Err(e) => warn!("Failed to read cached feed for {}: {}", owner, e),
            }
        }

        let saved = self.fixtures.list(owner).await?;
        if saved.is_empty() {
            debug!("No saved fixtures for {}; serving empty calendar", owner);
            return Ok(self.renderer.render_empty());
        }

        let ids: Vec<i64> = saved.iter().map(|s| s.fixture_id).collect();
        let upstream = self.provider.fixtures_by_ids(&ids).await;
        let fresh: HashMap<i64, Fixture> = if upstream.is_fallback() {
            warn!(
                "Upstream unavailable while building feed for {}; using stored payloads",
                owner
            );
            HashMap::new()
        } else {
            upstream
                .fixtures
                .into_iter()
                .map(|f| (f.id(), f))
                .collect()
        };

        let mut entries = Vec::with_capacity(saved.len());
        let mut refreshed = 0usize;

        for record in saved {
            match fresh.get(&record.fixture_id) {
                Some(fixture) => {
                    let changed = record.payload().map_or(true, |stored| &stored != fixture);
                    if changed {
                        match self.fixtures.update_payload(owner, fixture).await {
                            Ok(()) => refreshed += 1,
                            Err(e) => warn!(
                                "Failed to refresh stored fixture {} for {}: {}",
                                record.fixture_id, owner, e
                            ),
                        }
                    }
                    entries.push(FeedEntry::Parsed(fixture.clone()));
                }
                None => entries.push(FeedEntry::Stored {
                    record_id: record.id,
                    payload: record.fixture_data,
                }),
            }
        }

        let text = self.renderer.render(&entries, now);

        {
            let mut state = slot.lock().await;
            if state.generation != generation {
                debug!(
                    "Feed for {} was invalidated during regeneration; not caching",
                    owner
                );
            } else {
                let entry = CacheEntry {
                    text: text.clone(),
                    generated_at: now,
                };
                match self.store.put(owner, entry).await {
                    Ok(()) => state.untrusted = false,
                    Err(e) => warn!("Failed to cache feed for {}: {}", owner, e),
                }
            }
        }

        info!(
            "Generated feed for {} ({} fixture(s), {} refreshed)",
            owner,
            entries.len(),
            refreshed
        );

        Ok(text)
    }

    /// Drop the owner's cached feed. Renders already in flight will not be
    /// stored. A failure to remove the entry is logged and the entry is
    /// ignored until a new render replaces it.
    pub async fn invalidate(&self, owner: &str) {
        let slot = self.slot(owner).await;
        let mut state = slot.lock().await;
        state.generation += 1;

        match self.store.remove(owner).await {
            Ok(()) => {
                state.untrusted = false;
                debug!("Invalidated feed cache for {}", owner);
            }
            Err(e) => {
                state.untrusted = true;
                warn!("Failed to remove cached feed for {}: {}", owner, e);
            }
        }
    }
}
