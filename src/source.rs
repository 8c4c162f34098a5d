//! Feed access layer.
//!
//! This module defines the [`FeedSource`] trait and the listing types.  The
//! concrete HTTP implementation lives in [`client`]; category path handling
//! lives in [`category`].
//!
//! ## For contributors
//!
//! The poll engine only ever talks to `dyn FeedSource`, so tests swap in an
//! in-memory feed.  If the site ever changes its feed layout, only
//! `client.rs` should need to change.

mod category;
mod client;
mod listing;

// Re-export the public API of this module so callers can write
// `use crate::source::{FeedSource, Listing, RawListing};`
pub use category::{resolve_category_path, Category};
pub use client::{FeedClient, DEFAULT_FEED_ROOT};
pub use listing::{Listing, RawListing};

use async_trait::async_trait;

use crate::error::FetchError;

/// Anything that can produce category feeds.
///
/// The poll loop calls [`fetch_category()`](FeedSource::fetch_category)
/// concurrently from several tasks, so implementations must be
/// [`Send`] + [`Sync`].
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch one category's listings, newest first.
    async fn fetch_category(&self, category: &str) -> Result<Vec<RawListing>, FetchError>;

    /// Cheap existence check for a category feed.  Never fails: any error
    /// counts as "not a feed".
    async fn validate_category(&self, category: &str) -> bool;
}
