//! A minimal markup tree.
//!
//! Listing descriptions are parsed with [`scraper`] and immediately lowered
//! into this tree so the extraction rules only deal with two node kinds.

use scraper::{ElementRef, Html};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    Element(Element),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Lower-case tag name.
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Trimmed text of every descendant text node, joined with `sep`.
    /// Whitespace-only nodes are skipped.
    pub fn text(&self, sep: &str) -> String {
        let mut parts = Vec::new();
        collect_text(&self.children, &mut parts);
        parts
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(sep)
    }
}

/// Parse an HTML fragment into top-level nodes.
pub fn parse_fragment(markup: &str) -> Vec<Node> {
    let html = Html::parse_fragment(markup);
    lower_children(html.root_element())
}

/// Every text node under `nodes`, in document order.
pub fn collect_text<'a>(nodes: &'a [Node], out: &mut Vec<&'a str>) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push(text),
            Node::Element(el) => collect_text(&el.children, out),
        }
    }
}

fn lower_children(element: ElementRef<'_>) -> Vec<Node> {
    element
        .children()
        .filter_map(|child| match child.value() {
            scraper::Node::Text(text) => Some(Node::Text(String::from(&**text))),
            scraper::Node::Element(el) => ElementRef::wrap(child).map(|child_ref| {
                Node::Element(Element {
                    tag: el.name().to_ascii_lowercase(),
                    attrs: el
                        .attrs()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                    children: lower_children(child_ref),
                })
            }),
            // Comments, doctypes and processing instructions carry no data.
            _ => None,
        })
        .collect()
}
