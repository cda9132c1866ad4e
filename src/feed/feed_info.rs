//! Discovered-feed and site metadata records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Format of a validated feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedFormat {
    Rss,
    Atom,
    Json,
}

/// Metadata for one validated feed.
///
/// Identity is the canonical feed URL: two FeedInfos are equal iff their
/// URLs are equal, and the result set keeps at most one per URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedInfo {
    /// Canonical feed URL
    pub url: Url,
    /// Feed title
    #[serde(default)]
    pub title: String,
    /// Feed subtitle or description
    #[serde(default)]
    pub description: String,
    /// Version tag, e.g. `rss20`, `atom10`, `json11`
    #[serde(default)]
    pub version: String,
    /// Feed format
    pub format: FeedFormat,
    /// WebSub hub URLs (from the document or `Link` headers)
    #[serde(default)]
    pub hubs: Vec<String>,
    /// `rel=self` URL declared by the feed
    #[serde(default)]
    pub self_url: Option<Url>,
    /// Site the feed belongs to
    #[serde(default)]
    pub site_url: Option<Url>,
    /// Site name from the origin page
    #[serde(default)]
    pub site_name: String,
    /// Favicon URL
    #[serde(default)]
    pub favicon: Option<Url>,
    /// Favicon inlined as a data URI
    #[serde(default)]
    pub favicon_data_uri: String,
    /// Content-Type header of the feed response
    #[serde(default)]
    pub content_type: String,
    /// Size of the feed body in bytes
    #[serde(default)]
    pub content_length: u64,
    /// Most recent (non-future) entry timestamp
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    /// Number of entries
    #[serde(default)]
    pub item_count: u32,
    /// Average entries per day over the observed date range
    #[serde(default)]
    pub velocity: f64,
    /// Feed declares WebSub hubs and a self link
    #[serde(default)]
    pub is_push: bool,
    /// Feed looks like a podcast
    #[serde(default)]
    pub is_podcast: bool,
    /// Parser recovered from malformed data
    #[serde(default)]
    pub bozo: u8,
    /// Relevance score; higher sorts first
    #[serde(default)]
    pub score: i32,
}

impl FeedInfo {
    pub fn new(url: Url, format: FeedFormat) -> Self {
        Self {
            url,
            title: String::new(),
            description: String::new(),
            version: String::new(),
            format,
            hubs: Vec::new(),
            self_url: None,
            site_url: None,
            site_name: String::new(),
            favicon: None,
            favicon_data_uri: String::new(),
            content_type: String::new(),
            content_length: 0,
            last_updated: None,
            item_count: 0,
            velocity: 0.0,
            is_push: false,
            is_podcast: false,
            bozo: 0,
            score: 0,
        }
    }

    /// Copies any fields the other record has that this one is missing.
    /// Later discoveries of the same URL enrich, never duplicate.
    pub fn enrich_from(&mut self, other: &FeedInfo) {
        if self.title.is_empty() {
            self.title = other.title.clone();
        }
        if self.description.is_empty() {
            self.description = other.description.clone();
        }
        if self.site_name.is_empty() {
            self.site_name = other.site_name.clone();
        }
        if self.site_url.is_none() {
            self.site_url = other.site_url.clone();
        }
        if self.favicon.is_none() {
            self.favicon = other.favicon.clone();
        }
        if self.favicon_data_uri.is_empty() {
            self.favicon_data_uri = other.favicon_data_uri.clone();
        }
        if self.last_updated.is_none() {
            self.last_updated = other.last_updated;
        }
        if self.hubs.is_empty() {
            self.hubs = other.hubs.clone();
        }
        if self.self_url.is_none() {
            self.self_url = other.self_url.clone();
        }
    }
}

impl PartialEq for FeedInfo {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for FeedInfo {}

impl std::hash::Hash for FeedInfo {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}

/// Per-origin site metadata, collected once per origin over a crawl.
#[derive(Debug, Clone, Serialize)]
pub struct SiteMeta {
    /// Origin the metadata belongs to
    pub origin: Url,
    /// Canonical site URL (from `rel=canonical` / `og:url`, origin-coerced)
    pub site_url: Url,
    /// Site name
    pub site_name: String,
    /// Site title/description
    pub site_title: String,
    /// Favicon URL declared on the page
    pub favicon: Option<Url>,
    /// Host (without `www.`) used to match feeds to this origin
    pub host: String,
}

/// A favicon discovered on a site, possibly inlined as a data URI.
#[derive(Debug, Clone)]
pub struct Favicon {
    /// URL the icon was declared at
    pub url: Url,
    /// Host (without `www.`) of the declaring site
    pub site_host: String,
    /// Lower values are preferred among a site's icons
    pub priority: u32,
    /// `data:` URI, when the icon bytes were fetched and valid
    pub data_uri: String,
}

impl Favicon {
    /// Whether this icon can serve the given feed host.
    pub fn matches_host(&self, host: &str, requires_data_uri: bool) -> bool {
        if self.site_host.is_empty() || !host.contains(&self.site_host) {
            return false;
        }
        !requires_data_uri || !self.data_uri.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(url: &str) -> FeedInfo {
        FeedInfo::new(Url::parse(url).unwrap(), FeedFormat::Rss)
    }

    #[test]
    fn test_equality_is_by_url() {
        let mut a = feed("https://example.com/feed");
        let b = feed("https://example.com/feed");
        a.title = "Different title".to_string();
        assert_eq!(a, b);

        let c = feed("https://example.com/other");
        assert_ne!(a, c);
    }

    #[test]
    fn test_enrich_fills_missing_fields_only() {
        let mut a = feed("https://example.com/feed");
        a.title = "Kept".to_string();

        let mut b = feed("https://example.com/feed");
        b.title = "Ignored".to_string();
        b.description = "Filled".to_string();
        b.site_name = "Example".to_string();

        a.enrich_from(&b);
        assert_eq!(a.title, "Kept");
        assert_eq!(a.description, "Filled");
        assert_eq!(a.site_name, "Example");
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut info = feed("https://example.com/feed.xml");
        info.title = "Example Feed".to_string();
        info.version = "rss20".to_string();
        info.item_count = 5;
        info.velocity = 0.25;
        info.hubs = vec!["https://hub.example.com/".to_string()];
        info.last_updated = Some(
            chrono::DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        info.score = 22;

        let json = serde_json::to_string(&info).unwrap();
        let back: FeedInfo = serde_json::from_str(&json).unwrap();

        assert_eq!(back.url, info.url);
        assert_eq!(back.title, info.title);
        assert_eq!(back.version, info.version);
        assert_eq!(back.item_count, info.item_count);
        assert_eq!(back.velocity, info.velocity);
        assert_eq!(back.hubs, info.hubs);
        assert_eq!(back.last_updated, info.last_updated);
        assert_eq!(back.score, info.score);
        assert_eq!(back.format, info.format);
    }

    #[test]
    fn test_timestamps_serialize_as_rfc3339() {
        let mut info = feed("https://example.com/feed.xml");
        info.last_updated = Some(
            chrono::DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["last_updated"], "2024-06-01T12:00:00Z");
        assert_eq!(value["url"], "https://example.com/feed.xml");
    }

    #[test]
    fn test_format_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&FeedFormat::Json).unwrap(),
            "\"json\""
        );
        assert_eq!(serde_json::to_string(&FeedFormat::Rss).unwrap(), "\"rss\"");
    }

    #[test]
    fn test_favicon_matches_host() {
        let icon = Favicon {
            url: Url::parse("https://example.com/favicon.ico").unwrap(),
            site_host: "example.com".to_string(),
            priority: 1,
            data_uri: String::new(),
        };
        assert!(icon.matches_host("example.com", false));
        assert!(icon.matches_host("blog.example.com", false));
        assert!(!icon.matches_host("other.com", false));
        assert!(!icon.matches_host("example.com", true));
    }
}
