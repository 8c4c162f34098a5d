//! Subscribers, their categories and per-category price filters.
//!
//! Persisted as the `"data"` document:
//!
//! ```json
//! { "123456": { "paths": { "transport/cars/honda": { "price_min": 0.0, "price_max": 15000.0 } } } }
//! ```
//!
//! Every mutation holds the lock from validation through persistence, so
//! two commands can never interleave and writes never overlap.  A mutation
//! is applied to a copy of the document, and the copy replaces the live one
//! only once it has been saved.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::SubscriptionError;
use crate::source::Category;
use crate::store::{self, KvStore, DATA_KEY};

/// Opaque, stable subscriber identifier (a chat id).
pub type Subscriber = String;

/// Acceptable price range for one subscription.  `0` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceFilter {
    #[serde(rename = "price_min", default)]
    pub min: f64,
    #[serde(rename = "price_max", default)]
    pub max: f64,
}

impl PriceFilter {
    pub fn new(min: f64, max: f64) -> Result<Self, SubscriptionError> {
        let valid = min.is_finite()
            && max.is_finite()
            && min >= 0.0
            && max >= 0.0
            && (max == 0.0 || max >= min);
        if !valid {
            return Err(SubscriptionError::InvalidFilter { min, max });
        }
        Ok(Self { min, max })
    }

    /// Listings without a price always match; filters only constrain
    /// priced listings.
    pub fn matches(&self, price: Option<f64>) -> bool {
        match price {
            None => true,
            Some(p) => p >= self.min && (self.max == 0.0 || p <= self.max),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SubscriberEntry {
    #[serde(default)]
    paths: IndexMap<Category, PriceFilter>,
}

type Document = IndexMap<Subscriber, SubscriberEntry>;

pub struct SubscriptionStore {
    doc: Mutex<Document>,
    store: Arc<dyn KvStore>,
}

impl SubscriptionStore {
    /// Load the document, starting empty when it was never saved.
    /// Subscribers left without categories are pruned on load.
    pub fn load(store: Arc<dyn KvStore>) -> Result<Self> {
        let mut doc: Document = match store.load(DATA_KEY)? {
            Some(value) => serde_json::from_value(value).context("invalid subscription document")?,
            None => Document::new(),
        };
        doc.retain(|_, entry| !entry.paths.is_empty());
        Ok(Self {
            doc: Mutex::new(doc),
            store,
        })
    }

    pub async fn subscribe(
        &self,
        subscriber: &str,
        category: &str,
    ) -> Result<(), SubscriptionError> {
        let mut doc = self.doc.lock().await;
        let mut candidate = doc.clone();
        let entry = candidate.entry(subscriber.to_string()).or_default();
        if entry.paths.contains_key(category) {
            return Err(SubscriptionError::AlreadySubscribed(category.to_string()));
        }
        entry
            .paths
            .insert(category.to_string(), PriceFilter::default());
        self.persist(&candidate).await?;
        *doc = candidate;
        tracing::info!(subscriber, category, "subscribed");
        Ok(())
    }

    pub async fn unsubscribe(
        &self,
        subscriber: &str,
        category: &str,
    ) -> Result<(), SubscriptionError> {
        let mut doc = self.doc.lock().await;
        let mut candidate = doc.clone();
        let Some(entry) = candidate.get_mut(subscriber) else {
            return Err(SubscriptionError::NotSubscribed(category.to_string()));
        };
        if entry.paths.shift_remove(category).is_none() {
            return Err(SubscriptionError::NotSubscribed(category.to_string()));
        }
        if entry.paths.is_empty() {
            candidate.shift_remove(subscriber);
        }
        self.persist(&candidate).await?;
        *doc = candidate;
        tracing::info!(subscriber, category, "unsubscribed");
        Ok(())
    }

    pub async fn set_filter(
        &self,
        subscriber: &str,
        category: &str,
        min: f64,
        max: f64,
    ) -> Result<(), SubscriptionError> {
        let filter = PriceFilter::new(min, max)?;

        let mut doc = self.doc.lock().await;
        let mut candidate = doc.clone();
        let slot = candidate
            .get_mut(subscriber)
            .and_then(|entry| entry.paths.get_mut(category))
            .ok_or_else(|| SubscriptionError::NotSubscribed(category.to_string()))?;
        *slot = filter;
        self.persist(&candidate).await?;
        *doc = candidate;
        tracing::info!(subscriber, category, min, max, "price filter updated");
        Ok(())
    }

    /// Categories of one subscriber, in the order they were added.
    pub async fn list_categories(&self, subscriber: &str) -> Vec<Category> {
        self.doc
            .lock()
            .await
            .get(subscriber)
            .map(|entry| entry.paths.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn subscribers_for(&self, category: &str) -> Vec<(Subscriber, PriceFilter)> {
        self.doc
            .lock()
            .await
            .iter()
            .filter_map(|(subscriber, entry)| {
                entry
                    .paths
                    .get(category)
                    .map(|filter| (subscriber.clone(), *filter))
            })
            .collect()
    }

    /// Every category at least one subscriber monitors.
    pub async fn categories(&self) -> BTreeSet<Category> {
        self.doc
            .lock()
            .await
            .values()
            .flat_map(|entry| entry.paths.keys().cloned())
            .collect()
    }

    pub async fn is_monitored(&self, category: &str) -> bool {
        self.doc
            .lock()
            .await
            .values()
            .any(|entry| entry.paths.contains_key(category))
    }

    pub async fn is_subscribed(&self, subscriber: &str, category: &str) -> bool {
        self.doc
            .lock()
            .await
            .get(subscriber)
            .is_some_and(|entry| entry.paths.contains_key(category))
    }

    async fn persist(&self, doc: &Document) -> Result<(), SubscriptionError> {
        let value =
            serde_json::to_value(doc).map_err(|e| SubscriptionError::Persist(e.into()))?;
        store::persist(&self.store, DATA_KEY, value)
            .await
            .map_err(SubscriptionError::Persist)
    }
}
