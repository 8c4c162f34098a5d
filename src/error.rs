//! Error types shared across components.
//!
//! Each failure domain gets its own enum so callers can tell a recoverable
//! fetch failure apart from a user-input mistake.  Application edges
//! (`main`, the poll loop, store I/O) use [`anyhow`] instead.

use thiserror::Error;

/// Fetching or parsing one category feed failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(reqwest::StatusCode),

    #[error("not an RSS feed (content type {0:?})")]
    ContentType(String),

    #[error("failed to parse RSS feed: {0}")]
    Parse(String),
}

/// User input could not be turned into a category path.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidPathError {
    #[error("malformed URL: {0}")]
    MalformedUrl(String),

    #[error("URL does not belong to ss.lv: {0}")]
    ForeignDomain(String),

    #[error("empty category path")]
    Empty,
}

/// Rejected subscription mutation.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("already subscribed to {0}")]
    AlreadySubscribed(String),

    #[error("not subscribed to {0}")]
    NotSubscribed(String),

    #[error("invalid price filter {min} - {max}")]
    InvalidFilter { min: f64, max: f64 },

    #[error("failed to persist subscriptions: {0}")]
    Persist(anyhow::Error),
}

/// Subscribing may also fail while seeding a brand-new category.
#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    #[error("failed to fetch category feed: {0}")]
    Fetch(#[from] FetchError),

    #[error("failed to persist seen listings: {0}")]
    Persist(anyhow::Error),
}

/// A single message delivery failed.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Telegram API error: {0}")]
    Api(String),
}
