//! Listing types shared between the feed client, the poll engine and the
//! notifier.
//!
//! [`RawListing`] is what a feed item looks like straight off the wire.
//! [`Listing`] is the same item after attribute extraction, ready to be
//! formatted for subscribers.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::extract::{AttributeExtractor, Extracted};

/// One `<item>` of a category feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawListing {
    pub title: String,
    pub link: String,
    /// `<pubDate>` exactly as the feed wrote it.
    pub pub_date: String,
    /// `<description>`: an HTML fragment with the listing details.
    pub description: String,
}

impl RawListing {
    /// Stable identifier derived from the link.
    pub fn id(&self) -> &str {
        listing_id(&self.link)
    }
}

/// A new listing with its details extracted.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub id: String,
    pub title: String,
    pub link: String,
    pub pub_date: String,
    pub image_url: Option<String>,
    /// Label → value, display order.
    pub attributes: IndexMap<String, String>,
    pub price: Option<f64>,
}

impl Listing {
    pub fn from_raw(raw: RawListing, extractor: &AttributeExtractor) -> Self {
        let Extracted {
            image_url,
            attributes,
            price,
        } = extractor.parse(&raw.description);

        Self {
            id: raw.id().to_string(),
            title: raw.title,
            link: raw.link,
            pub_date: raw.pub_date,
            image_url,
            attributes,
            price,
        }
    }

    /// Best-effort RFC 2822 parse of the publish date, for display.
    pub fn published(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc2822(self.pub_date.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// `https://www.ss.lv/msg/ru/transport/cars/honda/accord/bxkfe.html` → `bxkfe`.
///
/// The last non-empty path segment, cut at its first `.`.
pub fn listing_id(link: &str) -> &str {
    let segment = link
        .trim()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    segment.split('.').next().unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
