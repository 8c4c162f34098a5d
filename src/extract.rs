//! Listing attribute extraction.
//!
//! ss.lv embeds each listing's details in the feed item's description as
//! loosely structured HTML, roughly `Label: <b>Value</b><br/>` repeated.  The
//! field set differs per category, so nothing here knows about concrete
//! labels except the price field.
//!
//! Extraction runs in two passes over a [`markup`] tree:
//!
//! 1. **Labelled values**: every text node ending in `:` is a label; the
//!    value is the first non-empty `<b>`/`<strong>` sibling that follows it,
//!    or failing that the first non-empty plain-text sibling.  A line break
//!    or block element ends the search.
//! 2. **Plain lines**: used only when pass 1 found nothing.  The fragment is
//!    flattened to text lines and every `label: value` line is taken.
//!
//! Extraction never fails.  Anything it cannot make sense of is simply left
//! out of the result.

pub mod markup;

use indexmap::IndexMap;

use markup::Node;

/// Label the Russian-language feed uses for the price attribute.
pub const DEFAULT_PRICE_FIELD: &str = "Цена";

/// Inline elements whose text is taken as a label's value.
const EMPHASIS_TAGS: &[&str] = &["b", "strong"];
/// Elements that end the search for a label's value.
const SEPARATOR_TAGS: &[&str] = &["br", "div", "p"];
/// Joins differing values of a repeated label.
const VALUE_SEPARATOR: &str = " | ";

/// Everything pulled out of one description fragment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extracted {
    pub image_url: Option<String>,
    /// Label → value, in the order the labels first appear.
    pub attributes: IndexMap<String, String>,
    pub price: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct AttributeExtractor {
    price_field: String,
}

impl Default for AttributeExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_PRICE_FIELD)
    }
}

impl AttributeExtractor {
    pub fn new(price_field: impl Into<String>) -> Self {
        Self {
            price_field: price_field.into(),
        }
    }

    pub fn parse(&self, fragment: &str) -> Extracted {
        if fragment.trim().is_empty() {
            return Extracted::default();
        }

        let nodes = markup::parse_fragment(fragment);

        let mut attributes = IndexMap::new();
        collect_labelled(&nodes, &mut attributes);
        if attributes.is_empty() {
            collect_lines(&nodes, &mut attributes);
        }

        let price = attributes
            .get(&self.price_field)
            .and_then(|raw| parse_price(raw));

        Extracted {
            image_url: first_image(&nodes),
            attributes,
            price,
        }
    }
}

/// `src` of the first `<img>` that has a non-empty one.
fn first_image(nodes: &[Node]) -> Option<String> {
    nodes.iter().find_map(|node| match node {
        Node::Text(_) => None,
        Node::Element(el) => {
            if el.tag == "img" {
                if let Some(src) = el.attr("src").map(str::trim).filter(|s| !s.is_empty()) {
                    return Some(src.to_string());
                }
            }
            first_image(&el.children)
        }
    })
}

fn collect_labelled(nodes: &[Node], out: &mut IndexMap<String, String>) {
    for (i, node) in nodes.iter().enumerate() {
        match node {
            Node::Text(text) => {
                let Some(label) = label_of(text) else {
                    continue;
                };
                if let Some(value) = value_after(&nodes[i + 1..]) {
                    insert_value(out, label, value);
                }
            }
            Node::Element(el) => collect_labelled(&el.children, out),
        }
    }
}

/// `"Year: "` → `Some("Year")`.
fn label_of(text: &str) -> Option<&str> {
    let label = text.trim().strip_suffix(':')?.trim();
    (!label.is_empty()).then_some(label)
}

fn value_after(siblings: &[Node]) -> Option<String> {
    let mut plain = None;
    for sibling in siblings {
        match sibling {
            Node::Text(text) => {
                let text = text.trim();
                if plain.is_none() && !text.is_empty() {
                    plain = Some(text.to_string());
                }
            }
            Node::Element(el) if EMPHASIS_TAGS.contains(&el.tag.as_str()) => {
                let text = el.text(" ");
                if !text.is_empty() {
                    return Some(text);
                }
            }
            Node::Element(el) if SEPARATOR_TAGS.contains(&el.tag.as_str()) => break,
            Node::Element(_) => {}
        }
    }
    plain
}

fn insert_value(out: &mut IndexMap<String, String>, label: &str, value: String) {
    match out.get_mut(label) {
        Some(existing) => {
            if !existing.split(VALUE_SEPARATOR).any(|part| part == value) {
                existing.push_str(VALUE_SEPARATOR);
                existing.push_str(&value);
            }
        }
        None => {
            out.insert(label.to_string(), value);
        }
    }
}

fn collect_lines(nodes: &[Node], out: &mut IndexMap<String, String>) {
    let mut texts = Vec::new();
    markup::collect_text(nodes, &mut texts);
    let flattened = texts.join("\n");

    for line in flattened.lines() {
        let Some((label, value)) = line.trim().split_once(':') else {
            continue;
        };
        let (label, value) = (label.trim(), value.trim());
        if label.is_empty() || value.is_empty() {
            continue;
        }
        out.entry(label.to_string())
            .or_insert_with(|| value.to_string());
    }
}

/// `"12 500 €"` → `12500.0`.  Thousands separators and currency are dropped.
fn parse_price(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != ',' && *c != '\u{a0}')
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}
