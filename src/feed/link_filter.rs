//! Link filter
//!
//! Decides which hrefs in a fetched document are worth following and at
//! what priority. Declared feed types are trusted outright; everything else
//! must look feed-like by URL text and survive the deny lists. Candidates
//! are origin-scoped: a cross-origin href is only followed when its host
//! was previously seen as a seed, sitemap, or hub origin.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::crawler::request::{Callback, Request, PRIORITY_FEED_PATH, PRIORITY_FEED_TYPE};
use crate::url::{normalize_href, remove_www};

/// Whole-word feed-likeness probe for URL text.
static FEEDLIKE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(rss|feeds?|atom|json|xml|rdf)\b").expect("valid regex")
});

/// Year-month path segments (`/2019/07/`) generally mean an article page.
static DATE_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(\d{4}/\d{2})/").expect("valid regex"));

/// Substring patterns that mark a URL path as feed-bearing.
const FEED_PATH_PATTERNS: &[&str] = &[
    "rss.xml", "atom.xml", "feeds/", "-feed", "_feed", "rss.", "feed.", "atom.",
];

/// `type` attribute values that declare a feed.
const FEED_TYPE_HINTS: &[&str] = &["rss", "atom", "rdf", "json"];

/// File extensions that never contain a feed.
const INVALID_EXTENSIONS: &[&str] = &[
    "jpeg", "jpg", "png", "gif", "bmp", "mp4", "mp3", "mkv", "md", "css", "avi", "pdf", "js",
    "woff", "woff2", "svg", "ttf", "zip",
];

/// URL fragments that mark a link as noise.
const INVALID_CONTENTS: &[&str] = &[
    "wp-admin",
    "wp-login",
    "wp-includes",
    "wp-content",
    "wp-json",
    "xmlrpc",
    "/amp/",
    "//font.",
];

/// Query keys that mark a link as noise (comment feeds, theme switchers).
const INVALID_QUERY_KEYS: &[&str] = &["comment", "comments", "post", "view", "theme"];

/// Social-network hosts; their links are never feed-bearing for the crawled
/// site.
const SOCIAL_HOSTS: &[&str] = &[
    "facebook.com",
    "twitter.com",
    "x.com",
    "instagram.com",
    "linkedin.com",
    "pinterest.com",
    "tiktok.com",
];

/// URL fragments that demote a candidate to the back of its priority band.
const LOW_PRIORITY_CONTENTS: &[&str] = &["/archive/", "/page/", "forum", "//cdn.", "video"];

/// Link filter for one fetched document.
pub struct LinkFilter<'a> {
    /// Base URL hrefs are resolved against (the response URL)
    base: &'a Url,
    /// Depth of the fetched document; candidates are one deeper
    parent_depth: u32,
    /// Hosts candidates may live on (seed, sitemap, and hub hosts)
    allowed_hosts: &'a HashSet<String>,
}

impl<'a> LinkFilter<'a> {
    pub fn new(base: &'a Url, parent_depth: u32, allowed_hosts: &'a HashSet<String>) -> Self {
        Self {
            base,
            parent_depth,
            allowed_hosts,
        }
    }

    /// Evaluates one href (with its `type` attribute, when present) and
    /// returns the request to enqueue, if the link is worth following.
    pub fn evaluate(&self, href: &str, type_attr: Option<&str>) -> Option<Request> {
        let mut url = normalize_href(href, self.base).ok()?;

        if !self.host_allowed(&url) {
            return None;
        }

        // A declared feed type is followed regardless of the URL text.
        if let Some(declared) = type_attr {
            let declared = declared.to_lowercase();
            if !declared.contains("oembed")
                && FEED_TYPE_HINTS.iter().any(|hint| declared.contains(hint))
            {
                return Some(
                    Request::new(url, Callback::ParseFeed)
                        .with_priority(PRIORITY_FEED_TYPE)
                        .with_depth(self.parent_depth + 1),
                );
            }
        }

        let feedlike_path = is_feedlike(&url);
        let feedlike_query = has_feedlike_query(&url);
        if !feedlike_path && !feedlike_query {
            return None;
        }

        if is_denied(&url) {
            return None;
        }

        // Page-number and tracking queries multiply URLs without adding
        // feeds; only feed-selecting queries survive.
        if !feedlike_query {
            url.set_query(None);
        }

        let mut priority = PRIORITY_FEED_PATH;
        if is_low_priority(&url) {
            priority += 2;
        }

        Some(
            Request::new(url, Callback::ParseFeed)
                .with_priority(priority)
                .with_depth(self.parent_depth + 1),
        )
    }

    fn host_allowed(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = remove_www(host);
        self.allowed_hosts.iter().any(|allowed| {
            let allowed = remove_www(allowed);
            host == allowed || host.ends_with(&format!(".{allowed}"))
        })
    }
}

fn is_feedlike(url: &Url) -> bool {
    let mut without_query = url.clone();
    without_query.set_query(None);
    let text = without_query.as_str().to_lowercase();

    if FEEDLIKE_RE.is_match(&text) {
        return true;
    }
    FEED_PATH_PATTERNS
        .iter()
        .any(|pattern| text.contains(pattern))
}

fn has_feedlike_query(url: &Url) -> bool {
    url.query_pairs()
        .any(|(key, _)| FEEDLIKE_RE.is_match(&key))
}

fn is_denied(url: &Url) -> bool {
    let text = url.as_str().to_lowercase();

    if INVALID_CONTENTS.iter().any(|bad| text.contains(bad)) {
        return true;
    }

    if let Some(host) = url.host_str() {
        let host = remove_www(host).to_lowercase();
        if SOCIAL_HOSTS
            .iter()
            .any(|social| host == *social || host.ends_with(&format!(".{social}")))
        {
            return true;
        }
    }

    let extension = url
        .path()
        .rsplit('/')
        .next()
        .and_then(|segment| segment.rsplit_once('.'))
        .map(|(_, ext)| ext.to_lowercase());
    if let Some(ext) = extension {
        if INVALID_EXTENSIONS.contains(&ext.as_str()) {
            return true;
        }
    }

    url.query_pairs()
        .any(|(key, _)| INVALID_QUERY_KEYS.contains(&key.to_lowercase().as_str()))
}

fn is_low_priority(url: &Url) -> bool {
    let text = url.as_str().to_lowercase();
    LOW_PRIORITY_CONTENTS.iter().any(|frag| text.contains(frag))
        || DATE_PATH_RE.is_match(&text)
}
