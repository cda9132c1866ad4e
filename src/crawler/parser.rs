//! HTML link extraction
//!
//! Pulls the href-bearing elements out of a fetched page for the link
//! filter. Parsing is capped to the first 512 KiB of body text; pages
//! larger than that have their feed links in the head anyway.

use scraper::{Html, Selector};

/// Parse at most this much of an HTML body.
pub const MAX_HTML_PARSE_BYTES: usize = 512 * 1024;

/// One href found in a document, with the `type` attribute when declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink {
    pub href: String,
    pub type_attr: Option<String>,
}

/// Truncates a body to the parse cap on a char boundary.
pub fn html_prefix(text: &str) -> &str {
    let mut end = text.len().min(MAX_HTML_PARSE_BYTES);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Extracts all `<a href>` and `<link href>` elements from a document.
///
/// Malformed HTML yields whatever the parser can recover; a hopeless
/// document simply yields no links.
pub fn extract_links(html: &str) -> Vec<PageLink> {
    let document = Html::parse_document(html_prefix(html));
    let mut links = Vec::new();

    if let Ok(selector) = Selector::parse("a[href], link[href]") {
        for element in document.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            if href.trim().is_empty() {
                continue;
            }
            links.push(PageLink {
                href: href.to_string(),
                type_attr: element.value().attr("type").map(str::to_string),
            });
        }
    }

    links
}
