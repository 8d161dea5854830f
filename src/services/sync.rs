//! Keeps each user's saved fixtures in step with their team subscriptions.
//!
//! Every mutation of saved fixtures invalidates the owner's cached feed before
//! returning, so the next feed request reflects it. A mutation that committed
//! is reported as successful even if dropping the cached feed failed.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::db::models::{CreateSubscription, Subscription};
use crate::db::store::{FixtureStore, SubscriptionStore};
use crate::error::AppResult;
use crate::services::feed_cache::FeedCache;
use crate::services::filter;
use crate::services::football::{Fixture, FixtureProvider, FixtureWindow};

pub struct SyncEngine {
    provider: Arc<dyn FixtureProvider>,
    fixtures: Arc<dyn FixtureStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
    feeds: Arc<FeedCache>,
    fixtures_per_team: u32,
}

impl SyncEngine {
    pub fn new(
        provider: Arc<dyn FixtureProvider>,
        fixtures: Arc<dyn FixtureStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
        feeds: Arc<FeedCache>,
        fixtures_per_team: u32,
    ) -> Self {
        Self {
            provider,
            fixtures,
            subscriptions,
            feeds,
            fixtures_per_team,
        }
    }

    /// Save the team's upcoming fixtures that pass the subscription's filters
    /// and are not saved yet. Returns how many were added.
    ///
    /// Provider failures count as zero fixtures. Errors are storage failures
    /// or a subscription whose stored filters no longer parse.
    pub async fn auto_sync(&self, subscription: &Subscription) -> AppResult<u64> {
        let owner = subscription.user_id.as_str();
        let filters = subscription.filter_spec()?;

        let upstream = self
            .provider
            .fixtures_for_team(
                subscription.team_id,
                FixtureWindow::Next(self.fixtures_per_team),
            )
            .await;

        if upstream.is_fallback() {
            warn!(
                "Upstream unavailable for team {}; nothing synced for {}",
                subscription.team_id, owner
            );
            return Ok(0);
        }

        let mut candidates: Vec<Fixture> = Vec::new();
        for fixture in upstream.fixtures {
            if !filter::include(&fixture, filters.as_deref()) {
                continue;
            }
            if candidates.iter().any(|c| c.id() == fixture.id()) {
                continue;
            }
            if self.fixtures.exists(owner, fixture.id()).await? {
                continue;
            }
            candidates.push(fixture);
        }

        if candidates.is_empty() {
            debug!(
                "No new fixtures for team {} ({})",
                subscription.team_id, owner
            );
            return Ok(0);
        }

        let added = self.fixtures.insert_many(owner, &candidates).await?;
        if added > 0 {
            self.feeds.invalidate(owner).await;
        }

        info!(
            "Auto-synced {} fixture(s) for team {} ({})",
            added, subscription.team_id, owner
        );
        Ok(added)
    }

    /// Re-run auto-sync for every subscription of `owner`, one after another.
    ///
    /// A subscription that fails for a non-storage reason is logged and
    /// skipped; a storage failure aborts the whole resync.
    pub async fn manual_resync(&self, owner: &str) -> AppResult<u64> {
        let subscriptions = self.subscriptions.list(owner).await?;
        let mut total = 0;
        let mut failed = 0usize;

        for subscription in &subscriptions {
            match self.auto_sync(subscription).await {
                Ok(added) => total += added,
                Err(e) if e.is_persistence() => return Err(e),
                Err(e) => {
                    failed += 1;
                    warn!(
                        "Resync of team {} failed for {}: {}",
                        subscription.team_id, owner, e
                    );
                }
            }
        }

        info!(
            "Resynced {} subscription(s) for {}: {} added, {} failed",
            subscriptions.len(),
            owner,
            total,
            failed
        );
        Ok(total)
    }

    /// Upcoming matches of every subscribed team, merged and ordered by
    /// kickoff. Nothing is saved. Teams whose schedule cannot be fetched are
    /// left out.
    pub async fn upcoming_matches(&self, owner: &str) -> AppResult<Vec<Fixture>> {
        let subscriptions = self.subscriptions.list(owner).await?;
        let mut matches: Vec<Fixture> = Vec::new();

        for subscription in &subscriptions {
            let upstream = self
                .provider
                .fixtures_for_team(
                    subscription.team_id,
                    FixtureWindow::Next(self.fixtures_per_team),
                )
                .await;

            if upstream.is_fallback() {
                warn!(
                    "Upstream unavailable for team {}; left out of upcoming matches for {}",
                    subscription.team_id, owner
                );
                continue;
            }

            for fixture in upstream.fixtures {
                if !matches.iter().any(|m| m.id() == fixture.id()) {
                    matches.push(fixture);
                }
            }
        }

        matches.sort_by_key(|f| (f.fixture.date, f.id()));
        debug!(
            "{} upcoming match(es) across {} subscription(s) for {}",
            matches.len(),
            subscriptions.len(),
            owner
        );
        Ok(matches)
    }

    /// Create or update a subscription, then auto-sync it.
    pub async fn subscribe(
        &self,
        owner: &str,
        create: CreateSubscription,
    ) -> AppResult<(Subscription, u64)> {
        let subscription = self.subscriptions.upsert(owner, create).await?;
        let added = self.auto_sync(&subscription).await?;
        Ok((subscription, added))
    }

    /// Drop a subscription and every saved fixture involving that team.
    /// Returns how many fixtures were removed; unsubscribing twice is a no-op.
    pub async fn remove_subscription(&self, owner: &str, team_id: i64) -> AppResult<u64> {
        if !self.subscriptions.delete(owner, team_id).await? {
            debug!("{} was not subscribed to team {}", owner, team_id);
            return Ok(0);
        }

        let doomed: Vec<i64> = self
            .fixtures
            .list(owner)
            .await?
            .iter()
            .filter_map(|record| match record.payload() {
                Ok(fixture) if fixture.involves_team(team_id) => Some(record.fixture_id),
                Ok(_) => None,
                Err(e) => {
                    warn!("Skipping during cleanup: {}", e);
                    None
                }
            })
            .collect();

        let removed = if doomed.is_empty() {
            0
        } else {
            self.fixtures.delete_many(owner, &doomed).await?
        };

        self.feeds.invalidate(owner).await;
        info!(
            "Unsubscribed {} from team {}; removed {} fixture(s)",
            owner, team_id, removed
        );
        Ok(removed)
    }

    /// Save explicitly chosen fixtures. Already saved ones are skipped.
    pub async fn add_fixtures(&self, owner: &str, fixtures: &[Fixture]) -> AppResult<u64> {
        let added = self.fixtures.insert_many(owner, fixtures).await?;
        if added > 0 {
            self.feeds.invalidate(owner).await;
        }
        Ok(added)
    }

    pub async fn remove_fixture(&self, owner: &str, fixture_id: i64) -> AppResult<bool> {
        let removed = self.fixtures.delete(owner, fixture_id).await?;
        self.feeds.invalidate(owner).await;
        Ok(removed)
    }

    pub async fn clear(&self, owner: &str) -> AppResult<u64> {
        let removed = self.fixtures.clear(owner).await?;
        self.feeds.invalidate(owner).await;
        Ok(removed)
    }
}
