//! Fan-out of new listings to subscribers.
//!
//! For every new listing the notifier looks up who monitors its category,
//! drops subscribers whose price filter rejects it, and sends each remaining
//! subscriber one message: a photo with caption when the listing has an
//! image, plain text otherwise.
//!
//! Deliveries are independent.  A failure for one subscriber is logged and
//! reported in the returned [`Delivery`] list, and never retried.

use std::sync::Arc;

use crate::error::TransportError;
use crate::source::Listing;
use crate::subscriptions::{Subscriber, SubscriptionStore};
use crate::transport::{Transport, CAPTION_LIMIT, TEXT_LIMIT};

const TRUNCATION_MARKER: &str = "…";

/// Result of one delivery attempt.
#[derive(Debug)]
pub struct Delivery {
    pub recipient: Subscriber,
    pub outcome: Result<(), TransportError>,
}

pub struct Notifier {
    subscriptions: Arc<SubscriptionStore>,
    transport: Arc<dyn Transport>,
}

impl Notifier {
    pub fn new(subscriptions: Arc<SubscriptionStore>, transport: Arc<dyn Transport>) -> Self {
        Self {
            subscriptions,
            transport,
        }
    }

    pub async fn dispatch(&self, category: &str, listing: &Listing) -> Vec<Delivery> {
        let recipients = self.subscriptions.subscribers_for(category).await;
        let mut deliveries = Vec::new();

        for (recipient, filter) in recipients {
            if !filter.matches(listing.price) {
                tracing::debug!(
                    recipient = %recipient,
                    listing = %listing.id,
                    "price {:?} outside filter {:?}",
                    listing.price,
                    filter
                );
                continue;
            }

            let outcome = match &listing.image_url {
                Some(image_url) => {
                    let caption = format_listing(category, listing, CAPTION_LIMIT);
                    self.transport
                        .send_photo(&recipient, image_url, &caption)
                        .await
                }
                None => {
                    let text = format_listing(category, listing, TEXT_LIMIT);
                    self.transport.send_text(&recipient, &text).await
                }
            };

            if let Err(e) = &outcome {
                tracing::error!(recipient = %recipient, listing = %listing.id, "delivery failed: {e}");
            }
            deliveries.push(Delivery { recipient, outcome });
        }

        deliveries
    }
}

/// Render a listing as an HTML message of at most `limit` characters.
///
/// Attribute lines are dropped from the end first so the title and the
/// link survive truncation.  Only the plain title is ever cut, before it is
/// escaped and wrapped, so the result always stays well-formed HTML.
pub fn format_listing(category: &str, listing: &Listing, limit: usize) -> String {
    let mut head = vec![format!("Category: <code>{}</code>", escape_html(category))];
    if let Some(published) = listing.published() {
        head.push(format!("Published: {}", published.format("%Y-%m-%d %H:%M")));
    }
    let attrs: Vec<String> = listing
        .attributes
        .iter()
        .map(|(label, value)| format!("<b>{}:</b> {}", escape_html(label), escape_html(value)))
        .collect();
    let link = format!(
        "<a href=\"{}\">Open listing</a>",
        escape_html(&listing.link)
    );

    let title = bold(&escape_html(&listing.title));
    let full: Vec<&str> = std::iter::once(title.as_str())
        .chain(head.iter().map(String::as_str))
        .chain(attrs.iter().map(String::as_str))
        .chain([link.as_str()])
        .collect();
    if joined_len(&full) <= limit {
        return full.join("\n");
    }

    // Whatever the title may use once the fixed lines are in.
    let fixed: Vec<&str> = head
        .iter()
        .map(String::as_str)
        .chain([TRUNCATION_MARKER, link.as_str()])
        .collect();
    let title_budget = limit.saturating_sub(joined_len(&fixed) + 1 + bold("").chars().count());
    let title = bold(&fit_escaped(&listing.title, title_budget));

    let mut lines: Vec<&str> = std::iter::once(title.as_str())
        .chain(head.iter().map(String::as_str))
        .collect();
    let reserved = TRUNCATION_MARKER.chars().count() + link.chars().count() + 2;
    let mut used = joined_len(&lines);
    for attr in &attrs {
        let cost = attr.chars().count() + 1;
        if used + cost + reserved > limit {
            break;
        }
        lines.push(attr);
        used += cost;
    }
    lines.push(TRUNCATION_MARKER);
    lines.push(&link);

    let body = lines.join("\n");
    if body.chars().count() <= limit {
        return body;
    }
    // Category or link alone overflow the limit: the title is all that fits.
    bold(&fit_escaped(
        &listing.title,
        limit.saturating_sub(bold("").chars().count()),
    ))
}

fn bold(html: &str) -> String {
    format!("<b>{html}</b>")
}

/// Escape `text`, cutting it between characters so the escaped form plus
/// the marker stays within `budget`.
fn fit_escaped(text: &str, budget: usize) -> String {
    let escaped = escape_html(text);
    if escaped.chars().count() <= budget {
        return escaped;
    }
    let keep = budget.saturating_sub(TRUNCATION_MARKER.chars().count());
    let mut out = String::new();
    let mut used = 0;
    let mut buf = [0u8; 4];
    for c in text.chars() {
        let piece = escape_html(c.encode_utf8(&mut buf));
        let cost = piece.chars().count();
        if used + cost > keep {
            break;
        }
        out.push_str(&piece);
        used += cost;
    }
    out.push_str(TRUNCATION_MARKER);
    out
}

fn joined_len(lines: &[&str]) -> usize {
    lines.iter().map(|l| l.chars().count()).sum::<usize>() + lines.len().saturating_sub(1)
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::transport::fake::{RecordingTransport, Sent};
    use indexmap::IndexMap;

    fn listing(price: Option<f64>, image: Option<&str>) -> Listing {
        let mut attributes = IndexMap::new();
        attributes.insert("Марка".to_string(), "Honda".to_string());
        attributes.insert("Год".to_string(), "2008".to_string());
        Listing {
            id: "bxkfe".into(),
            title: "Honda <Accord> & co".into(),
            link: "https://www.ss.lv/msg/ru/transport/cars/honda/bxkfe.html".into(),
            pub_date: String::new(),
            image_url: image.map(String::from),
            attributes,
            price,
        }
    }

    async fn setup(
        subs: &[(&str, f64, f64)],
    ) -> (Arc<RecordingTransport>, Notifier) {
        let store = Arc::new(SubscriptionStore::load(Arc::new(MemoryStore::default())).unwrap());
        for (who, min, max) in subs {
            store.subscribe(who, "cars").await.unwrap();
            store.set_filter(who, "cars", *min, *max).await.unwrap();
        }
        let transport = Arc::new(RecordingTransport::default());
        let notifier = Notifier::new(store, transport.clone());
        (transport, notifier)
    }

    #[tokio::test]
    async fn applies_each_subscribers_filter() {
        let (transport, notifier) = setup(&[
            ("open", 0.0, 0.0),
            ("cheap", 0.0, 100.0),
            ("pricey", 200.0, 0.0),
            ("band", 100.0, 200.0),
        ])
        .await;

        let deliveries = notifier.dispatch("cars", &listing(Some(150.0), None)).await;

        let got: Vec<&str> = deliveries.iter().map(|d| d.recipient.as_str()).collect();
        assert_eq!(got, ["open", "band"]);
        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn unpriced_listing_reaches_everyone() {
        let (transport, notifier) = setup(&[("a", 500.0, 900.0), ("b", 0.0, 0.0)]).await;

        notifier.dispatch("cars", &listing(None, None)).await;

        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn other_categories_are_not_notified() {
        let (transport, notifier) = setup(&[("a", 0.0, 0.0)]).await;

        let deliveries = notifier.dispatch("boats", &listing(None, None)).await;

        assert!(deliveries.is_empty());
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn image_listing_is_sent_as_photo() {
        let (transport, notifier) = setup(&[("a", 0.0, 0.0)]).await;

        notifier
            .dispatch("cars", &listing(None, Some("https://i.ss.lv/x.jpg")))
            .await;

        let sent = transport.sent();
        let Sent::Photo { image_url, caption, .. } = &sent[0] else {
            panic!("expected a photo, got {:?}", sent[0]);
        };
        assert_eq!(image_url, "https://i.ss.lv/x.jpg");
        assert!(caption.contains("<b>Марка:</b> Honda"));
    }

    #[tokio::test]
    async fn one_failed_delivery_does_not_stop_the_rest() {
        let (transport, notifier) = setup(&[("a", 0.0, 0.0), ("b", 0.0, 0.0), ("c", 0.0, 0.0)]).await;
        transport.fail_for("b");

        let deliveries = notifier.dispatch("cars", &listing(None, None)).await;

        assert_eq!(deliveries.len(), 3);
        assert!(deliveries[0].outcome.is_ok());
        assert!(matches!(deliveries[1].outcome, Err(TransportError::Api(_))));
        assert!(deliveries[2].outcome.is_ok());
        let recipients: Vec<String> = transport
            .sent()
            .iter()
            .map(|s| s.recipient().to_string())
            .collect();
        assert_eq!(recipients, ["a", "c"]);
    }

    #[test]
    fn message_layout_and_escaping() {
        let text = format_listing("transport/cars", &listing(None, None), TEXT_LIMIT);

        assert_eq!(
            text,
            "<b>Honda &lt;Accord&gt; &amp; co</b>\n\
             Category: <code>transport/cars</code>\n\
             <b>Марка:</b> Honda\n\
             <b>Год:</b> 2008\n\
             <a href=\"https://www.ss.lv/msg/ru/transport/cars/honda/bxkfe.html\">Open listing</a>"
        );
    }

    #[test]
    fn published_date_is_shown_when_parsable() {
        let mut l = listing(None, None);
        l.pub_date = "Mon, 06 Jan 2025 10:30:00 +0000".into();

        let text = format_listing("cars", &l, TEXT_LIMIT);

        assert!(text.contains("\nPublished: 2025-01-06 10:30\n"));
    }

    #[test]
    fn long_caption_drops_attributes_but_keeps_link() {
        let mut l = listing(None, Some("https://i.ss.lv/x.jpg"));
        for i in 0..100 {
            l.attributes.insert(format!("Field {i}"), "x".repeat(30));
        }

        let caption = format_listing("cars", &l, CAPTION_LIMIT);

        assert!(caption.chars().count() <= CAPTION_LIMIT);
        assert!(caption.starts_with("<b>Honda"));
        assert!(caption.contains("<b>Марка:</b> Honda"));
        assert!(caption.ends_with("\">Open listing</a>"));
        assert!(caption.contains("\n…\n<a href"));
        // The same listing fits as plain text with more attributes.
        let text = format_listing("cars", &l, TEXT_LIMIT);
        assert!(text.matches("<b>Field").count() > caption.matches("<b>Field").count());
    }

    #[test]
    fn absurd_title_is_cut_without_breaking_markup() {
        let mut l = listing(None, None);
        l.title = "Tom & Jerry ".repeat(500);

        let text = format_listing("cars", &l, TEXT_LIMIT);

        assert!(text.chars().count() <= TEXT_LIMIT);
        let title_line = text.lines().next().unwrap();
        assert!(title_line.starts_with("<b>Tom &amp; Jerry"));
        assert!(title_line.ends_with("…</b>"));
        // Every ampersand still starts a complete entity.
        assert_eq!(
            title_line.matches('&').count(),
            title_line.matches("&amp;").count()
        );
        assert!(text.contains("Category: <code>cars</code>"));
        assert!(text.ends_with("\">Open listing</a>"));
    }

    #[test]
    fn cut_never_splits_an_entity() {
        for budget in 0..12 {
            let cut = fit_escaped("a&b&c&d", budget);
            assert!(cut.chars().count() <= budget.max(1), "budget {budget}: {cut}");
            assert_eq!(cut.matches('&').count(), cut.matches("&amp;").count());
        }
        assert_eq!(fit_escaped("a&b", 7), "a&amp;b");
    }
}
