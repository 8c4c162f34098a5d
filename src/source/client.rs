//! HTTP client for ss.lv category feeds.
//!
//! Every category `<path>` has an RSS 2.0 feed at `<root><path>/rss/`.  The
//! feed lists the newest listings first; each `<item>` carries the listing
//! details as an HTML fragment in `<description>`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Response;

use super::listing::{listing_id, RawListing};
use super::FeedSource;
use crate::error::FetchError;

/// Feed root used when none has been persisted yet.
pub const DEFAULT_FEED_ROOT: &str = "https://www.ss.lv/ru/";

/// Content types the site serves feeds with.
const FEED_CONTENT_TYPES: &[&str] = &["text/xml", "application/xml", "application/rss+xml"];

/// Upper bound for the existence check done before subscribing.
const VALIDATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Fetches category feeds over HTTP using [`reqwest`] and parses them with
/// the [`rss`] crate.
pub struct FeedClient {
    client: reqwest::Client,
    root: String,
}

impl FeedClient {
    /// Create a client.
    ///
    /// # Arguments
    ///
    /// * `client` — shared HTTP client; its timeout bounds every fetch.
    /// * `root` — feed root such as `https://www.ss.lv/ru/`.  A missing
    ///   trailing slash is added.
    pub fn new(client: reqwest::Client, root: impl Into<String>) -> Self {
        let mut root = root.into();
        if !root.ends_with('/') {
            root.push('/');
        }
        Self { client, root }
    }

    pub fn feed_url(&self, category: &str) -> String {
        format!("{}{}/rss/", self.root, category.trim_matches('/'))
    }

    /// Parse a feed body into listings, keeping feed order.
    ///
    /// This is a pure function (no I/O) so that tests can exercise the
    /// parsing logic without hitting the network.  Items without a usable
    /// link are dropped since no identifier can be derived for them.
    pub fn parse_feed(body: &[u8]) -> Result<Vec<RawListing>, FetchError> {
        let channel =
            rss::Channel::read_from(body).map_err(|e| FetchError::Parse(e.to_string()))?;

        let listings = channel
            .items()
            .iter()
            .filter_map(|item| {
                let link = item.link()?.trim();
                if listing_id(link).is_empty() {
                    return None;
                }
                Some(RawListing {
                    title: item.title().unwrap_or_default().trim().to_string(),
                    link: link.to_string(),
                    pub_date: item.pub_date().unwrap_or_default().to_string(),
                    description: item.description().unwrap_or_default().to_string(),
                })
            })
            .collect();

        Ok(listings)
    }
}

#[async_trait]
impl FeedSource for FeedClient {
    async fn fetch_category(&self, category: &str) -> Result<Vec<RawListing>, FetchError> {
        let url = self.feed_url(category);
        tracing::debug!("Fetching RSS feed from: {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        let content_type = content_type(&response);
        if !FEED_CONTENT_TYPES.contains(&content_type.as_str()) {
            return Err(FetchError::ContentType(content_type));
        }

        let body = response.bytes().await?;
        let listings = Self::parse_feed(&body)?;

        tracing::debug!("Parsed {} items from {}", listings.len(), url);
        Ok(listings)
    }

    async fn validate_category(&self, category: &str) -> bool {
        let url = self.feed_url(category);
        match self.client.head(&url).timeout(VALIDATE_TIMEOUT).send().await {
            Ok(response) => {
                response.status().is_success()
                    && FEED_CONTENT_TYPES.contains(&content_type(&response).as_str())
            }
            Err(e) => {
                tracing::debug!("Validation request for {} failed: {}", url, e);
                false
            }
        }
    }
}

/// Media type of the response without parameters, lower-cased.
fn content_type(response: &Response) -> String {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{http_response, serve};

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>SS.LV: Honda</title>
    <item>
      <title>Honda Accord, 2008</title>
      <link>https://www.ss.lv/msg/ru/transport/cars/honda/accord/bxkfe.html</link>
      <pubDate>Mon, 06 Jan 2025 10:30:00 +0200</pubDate>
      <description><![CDATA[Год: <b>2008</b><br/>Цена: <b>3,500 €</b>]]></description>
    </item>
    <item>
      <title>No link here</title>
    </item>
    <item>
      <title>Honda Civic</title>
      <link>https://www.ss.lv/msg/ru/transport/cars/honda/civic/aaaaa.html</link>
    </item>
  </channel>
</rss>"#;

    /// Feed root on a local server answering every request with `response`.
    async fn feed_root(response: String) -> String {
        format!("{}/ru/", serve(response).await)
    }

    fn client(root: &str) -> FeedClient {
        FeedClient::new(reqwest::Client::new(), root)
    }

    #[test]
    fn parse_feed_keeps_order_and_drops_linkless_items() {
        let items = FeedClient::parse_feed(FEED.as_bytes()).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id(), "bxkfe");
        assert_eq!(items[0].title, "Honda Accord, 2008");
        assert_eq!(items[0].pub_date, "Mon, 06 Jan 2025 10:30:00 +0200");
        assert!(items[0].description.contains("<b>2008</b>"));

        assert_eq!(items[1].id(), "aaaaa");
        assert_eq!(items[1].pub_date, "");
        assert_eq!(items[1].description, "");
    }

    #[test]
    fn parse_feed_rejects_garbage() {
        assert!(matches!(
            FeedClient::parse_feed(b"<html>not a feed</html>"),
            Err(FetchError::Parse(_))
        ));
    }

    #[test]
    fn feed_url_appends_rss_suffix() {
        let c = client("https://www.ss.lv/ru");
        assert_eq!(
            c.feed_url("transport/cars/honda"),
            "https://www.ss.lv/ru/transport/cars/honda/rss/"
        );
    }

    #[tokio::test]
    async fn fetch_category_parses_feed() {
        let root = feed_root(http_response("200 OK", "text/xml; charset=utf-8", FEED)).await;

        let items = client(&root).fetch_category("transport/cars/honda").await.unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id(), "bxkfe");
    }

    #[tokio::test]
    async fn fetch_category_rejects_error_status() {
        let root = feed_root(http_response("404 Not Found", "text/xml", "")).await;

        let err = client(&root).fetch_category("nope").await.unwrap_err();

        assert!(matches!(err, FetchError::Status(s) if s.as_u16() == 404));
    }

    #[tokio::test]
    async fn fetch_category_rejects_html() {
        let root = feed_root(http_response("200 OK", "text/html", "<html></html>")).await;

        let err = client(&root).fetch_category("transport").await.unwrap_err();

        assert!(matches!(err, FetchError::ContentType(ct) if ct == "text/html"));
    }

    #[tokio::test]
    async fn validate_category_checks_status_and_type() {
        let ok = feed_root(http_response("200 OK", "text/xml", FEED)).await;
        let html = feed_root(http_response("200 OK", "text/html", "")).await;
        let missing = feed_root(http_response("404 Not Found", "text/xml", "")).await;

        assert!(client(&ok).validate_category("transport/cars").await);
        assert!(!client(&html).validate_category("transport/cars").await);
        assert!(!client(&missing).validate_category("transport/cars").await);
    }

    #[tokio::test]
    async fn validate_category_is_false_when_unreachable() {
        // Nothing listens on port 9 of the loopback interface.
        assert!(!client("http://127.0.0.1:9/ru/").validate_category("x").await);
    }
}
