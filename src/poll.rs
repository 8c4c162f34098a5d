//! Background feed polling.
//!
//! A single task runs poll cycles back to back, sleeping the configured
//! interval between them.  One cycle:
//!
//! 1. snapshots the categories anyone is subscribed to,
//! 2. fetches all of them concurrently (no lock held),
//! 3. under the seen-set lock, diffs each feed against the previous cycle's
//!    identifiers, replaces the set with this cycle's identifiers and
//!    persists it,
//! 4. hands the new listings, oldest first, to the [`Notifier`].
//!
//! ## For contributors
//!
//! The diff assumes feeds are ordered newest first: scanning stops at the
//! first identifier already seen, and everything after it counts as old.
//! A category whose fetch fails contributes no identifiers to the new set,
//! so its listings are treated as new again once it recovers (bounded by the
//! scan stopping at the first known identifier).  Categories bootstrapped
//! while a cycle is fetching are not in that cycle's snapshot; their seeds
//! are carried over by [`SeenStore::advance`].

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{SubscribeError, SubscriptionError};
use crate::extract::AttributeExtractor;
use crate::notify::Notifier;
use crate::seen::SeenStore;
use crate::source::{Category, FeedSource, Listing, RawListing};
use crate::subscriptions::SubscriptionStore;

/// A listing detected as new during a cycle, with its category.
pub type NewListing = (Category, Listing);

pub struct PollEngine {
    feeds: Arc<dyn FeedSource>,
    seen: Arc<SeenStore>,
    subscriptions: Arc<SubscriptionStore>,
    extractor: AttributeExtractor,
}

impl PollEngine {
    pub fn new(
        feeds: Arc<dyn FeedSource>,
        seen: Arc<SeenStore>,
        subscriptions: Arc<SubscriptionStore>,
        extractor: AttributeExtractor,
    ) -> Self {
        Self {
            feeds,
            seen,
            subscriptions,
            extractor,
        }
    }

    pub fn feeds(&self) -> &dyn FeedSource {
        self.feeds.as_ref()
    }

    /// Run one poll cycle and return the new listings in delivery order.
    pub async fn run_cycle(&self) -> Result<Vec<NewListing>> {
        let categories = self.subscriptions.categories().await;
        if categories.is_empty() {
            return Ok(Vec::new());
        }

        let mut fetched = self.fetch_all(&categories).await;

        let next: BTreeSet<String> = fetched
            .values()
            .flatten()
            .map(|item| item.id().to_string())
            .collect();

        let fresh = self
            .seen
            .advance(next, |seen| {
                categories
                    .iter()
                    .filter_map(|category| {
                        let items = fetched.remove(category)?;
                        Some((category, new_items(items, seen)))
                    })
                    .flat_map(|(category, items)| {
                        items.into_iter().map(move |raw| (category.clone(), raw))
                    })
                    .collect::<Vec<_>>()
            })
            .await?;

        tracing::info!(
            categories = categories.len(),
            new = fresh.len(),
            "poll cycle finished"
        );

        Ok(fresh
            .into_iter()
            .map(|(category, raw)| (category, Listing::from_raw(raw, &self.extractor)))
            .collect())
    }

    /// Fetch every category concurrently.  Failed categories are logged and
    /// left out of the result.
    async fn fetch_all(
        &self,
        categories: &BTreeSet<Category>,
    ) -> HashMap<Category, Vec<RawListing>> {
        let mut tasks = JoinSet::new();
        for category in categories {
            let feeds = Arc::clone(&self.feeds);
            let category = category.clone();
            tasks.spawn(async move {
                let result = feeds.fetch_category(&category).await;
                (category, result)
            });
        }

        let mut fetched = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((category, Ok(items))) => {
                    fetched.insert(category, items);
                }
                Ok((category, Err(e))) => {
                    tracing::warn!(category = %category, "skipping category this cycle: {e}");
                }
                Err(e) => tracing::error!("fetch task panicked: {e}"),
            }
        }
        fetched
    }

    /// Subscribe `subscriber` to `category`, seeding the seen set first when
    /// nobody monitored the category yet so the backlog is not announced.
    pub async fn subscribe(&self, subscriber: &str, category: &str) -> Result<(), SubscribeError> {
        if self.subscriptions.is_subscribed(subscriber, category).await {
            return Err(SubscriptionError::AlreadySubscribed(category.to_string()).into());
        }
        if !self.subscriptions.is_monitored(category).await {
            self.bootstrap(category).await?;
        }
        self.subscriptions.subscribe(subscriber, category).await?;
        Ok(())
    }

    async fn bootstrap(&self, category: &str) -> Result<(), SubscribeError> {
        let items = self.feeds.fetch_category(category).await?;
        let count = items.len();
        self.seen
            .extend(items.iter().map(|item| item.id().to_string()))
            .await
            .map_err(SubscribeError::Persist)?;
        tracing::info!(category, seeded = count, "seeded new category");
        Ok(())
    }

    /// Poll until `shutdown` fires.  Cancellation is only observed between
    /// cycles, so a running cycle always finishes persisting.
    pub async fn run(
        self: Arc<Self>,
        notifier: Arc<Notifier>,
        interval: Duration,
        shutdown: CancellationToken,
    ) {
        tracing::info!(interval_secs = interval.as_secs(), "poll loop started");

        loop {
            match self.run_cycle().await {
                Ok(fresh) => {
                    for (category, listing) in &fresh {
                        notifier.dispatch(category, listing).await;
                    }
                }
                Err(e) => tracing::error!("poll cycle failed: {e:#}"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        tracing::info!("poll loop stopped");
    }
}

/// Items before the first already-seen identifier, oldest first.
fn new_items(items: Vec<RawListing>, seen: &BTreeSet<String>) -> Vec<RawListing> {
    let mut fresh: Vec<RawListing> = items
        .into_iter()
        .take_while(|item| !seen.contains(item.id()))
        .collect();
    fresh.reverse();
    fresh
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
