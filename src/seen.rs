//! The persisted set of listing identifiers already announced.
//!
//! Stored as the `"sslv"` document together with the feed root, in the
//! same shape the bot has always used:
//!
//! ```json
//! { "url_base": "https://www.ss.lv/ru/", "last_lookup": ["bxkfe", "..."] }
//! ```
//!
//! The set is global rather than per category.  Each poll cycle replaces it
//! wholesale with the identifiers fetched in that cycle, so a category that
//! fails to fetch drops out of it until its next successful fetch.
//!
//! Identifiers seeded by a bootstrap are also remembered as *pending* until
//! the next replacement.  A cycle that snapshotted its categories before the
//! bootstrap never fetched them, and must carry them over instead of
//! dropping them.
//!
//! Both mutations persist a candidate document first and only commit it in
//! memory once the save succeeded.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::source::DEFAULT_FEED_ROOT;
use crate::store::{self, KvStore, SEEN_KEY};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SeenDocument {
    url_base: String,
    #[serde(default)]
    last_lookup: BTreeSet<String>,
    /// Seeded since the last `advance`.  Already part of `last_lookup`.
    #[serde(skip)]
    pending: BTreeSet<String>,
}

impl Default for SeenDocument {
    fn default() -> Self {
        Self {
            url_base: DEFAULT_FEED_ROOT.to_string(),
            last_lookup: BTreeSet::new(),
            pending: BTreeSet::new(),
        }
    }
}

pub struct SeenStore {
    doc: Mutex<SeenDocument>,
    store: Arc<dyn KvStore>,
}

impl SeenStore {
    /// Load the document, starting empty when it was never saved.
    pub fn load(store: Arc<dyn KvStore>) -> Result<Self> {
        let doc = match store.load(SEEN_KEY)? {
            Some(value) => serde_json::from_value(value).context("invalid seen document")?,
            None => SeenDocument::default(),
        };
        Ok(Self {
            doc: Mutex::new(doc),
            store,
        })
    }

    pub async fn feed_root(&self) -> String {
        self.doc.lock().await.url_base.clone()
    }

    pub async fn snapshot(&self) -> BTreeSet<String> {
        self.doc.lock().await.last_lookup.clone()
    }

    /// Merge identifiers into the set and persist.  Used when a category is
    /// monitored for the first time.
    pub async fn extend<I>(&self, ids: I) -> Result<()>
    where
        I: IntoIterator<Item = String>,
    {
        let ids: Vec<String> = ids.into_iter().collect();
        let mut doc = self.doc.lock().await;
        let mut candidate = doc.clone();
        candidate.last_lookup.extend(ids.iter().cloned());
        candidate.pending.extend(ids);
        self.persist(&candidate).await?;
        *doc = candidate;
        Ok(())
    }

    /// Run `diff` against the current set, replace the set with `next` plus
    /// any pending seeds and persist, all under one lock.  On a failed save
    /// the set is left as it was.
    pub async fn advance<T>(
        &self,
        mut next: BTreeSet<String>,
        diff: impl FnOnce(&BTreeSet<String>) -> T,
    ) -> Result<T> {
        let mut doc = self.doc.lock().await;
        let out = diff(&doc.last_lookup);
        next.extend(doc.pending.iter().cloned());
        let candidate = SeenDocument {
            url_base: doc.url_base.clone(),
            last_lookup: next,
            pending: BTreeSet::new(),
        };
        self.persist(&candidate).await?;
        *doc = candidate;
        Ok(out)
    }

    async fn persist(&self, doc: &SeenDocument) -> Result<()> {
        let value = serde_json::to_value(doc)?;
        store::persist(&self.store, SEEN_KEY, value).await
    }
}
