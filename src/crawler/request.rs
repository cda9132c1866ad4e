//! The unit of work for the crawl engine

use std::time::Duration;
use url::Url;

/// Priority for robots.txt fetches.
pub const PRIORITY_ROBOTS: u32 = 1;
/// Priority for sitemap fetches.
pub const PRIORITY_SITEMAP: u32 = 5;
/// Priority for URLs discovered inside a sitemap, and for hrefs whose `type`
/// attribute declares a feed media type.
pub const PRIORITY_FEED_TYPE: u32 = 10;
/// Priority for URLs whose path or query looks feed-like, and for try-url
/// probes.
pub const PRIORITY_FEED_PATH: u32 = 20;
/// Priority for favicon fetches.
pub const PRIORITY_FAVICON: u32 = 50;
/// Priority for generic discovered URLs and seed pages.
pub const PRIORITY_DEFAULT: u32 = 100;

/// HTTP method of a request. The engine only issues GET and HEAD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
        }
    }
}

/// Which parser handles the response to a request.
///
/// A closed set dispatched by the worker; there is no pluggable callback
/// registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Callback {
    /// Scan HTML for feed links and site metadata; detect inline feeds.
    ParseHtml,
    /// Validate the body as a feed; fall back to the HTML scan otherwise.
    ParseFeed,
    /// Extract `Sitemap:` directives from robots.txt.
    ParseRobots,
    /// Extract feed-like `<loc>` URLs from a sitemap.
    ParseSitemap,
    /// Extract title/description/favicon from a site origin page.
    ParseSiteMeta,
    /// Convert favicon bytes to a data URI.
    ParseFavicon,
}

/// A pending HTTP request.
///
/// Created by the coordinator or by a callback; owned by the queue until
/// popped; consumed exactly once by a worker (retries re-enqueue the same
/// request with an incremented retry count).
#[derive(Debug, Clone)]
pub struct Request {
    /// Canonical request URL
    pub url: Url,
    /// HTTP method
    pub method: Method,
    /// Parser to run on the response
    pub callback: Callback,
    /// Queue priority; lower sorts earlier
    pub priority: u32,
    /// Link depth from the seed (seeds are depth 0)
    pub depth: u32,
    /// Number of times this request has been retried
    pub retries: u32,
    /// Delay before issuing the fetch (retry backoff)
    pub delay: Duration,
    /// Extra headers for this request only
    pub headers: Vec<(String, String)>,
    /// Per-request body size cap override
    pub max_content_length: Option<u64>,
}

impl Request {
    pub fn new(url: Url, callback: Callback) -> Self {
        Self {
            url,
            method: Method::Get,
            callback,
            priority: PRIORITY_DEFAULT,
            depth: 0,
            retries: 0,
            delay: Duration::ZERO,
            headers: Vec::new(),
            max_content_length: None,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_max_content_length(mut self, cap: u64) -> Self {
        self.max_content_length = Some(cap);
        self
    }

    /// Host of the request URL, for throttling.
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_request_defaults() {
        let url = Url::parse("https://example.com/feed").unwrap();
        let req = Request::new(url, Callback::ParseHtml);

        assert_eq!(req.method, Method::Get);
        assert_eq!(req.priority, PRIORITY_DEFAULT);
        assert_eq!(req.depth, 0);
        assert_eq!(req.retries, 0);
        assert!(req.max_content_length.is_none());
    }

    #[test]
    fn test_builder_overrides() {
        let url = Url::parse("https://example.com/favicon.ico").unwrap();
        let req = Request::new(url, Callback::ParseFavicon)
            .with_priority(PRIORITY_FAVICON)
            .with_depth(2)
            .with_max_content_length(100 * 1024);

        assert_eq!(req.priority, PRIORITY_FAVICON);
        assert_eq!(req.depth, 2);
        assert_eq!(req.max_content_length, Some(100 * 1024));
    }

    #[test]
    fn test_host() {
        let url = Url::parse("https://blog.example.com/feed").unwrap();
        let req = Request::new(url, Callback::ParseFeed);
        assert_eq!(req.host(), "blog.example.com");
    }

    #[test]
    fn test_priority_ordering_constants() {
        assert!(PRIORITY_ROBOTS < PRIORITY_SITEMAP);
        assert!(PRIORITY_SITEMAP < PRIORITY_FEED_TYPE);
        assert!(PRIORITY_FEED_TYPE < PRIORITY_FEED_PATH);
        assert!(PRIORITY_FEED_PATH < PRIORITY_FAVICON);
        assert!(PRIORITY_FAVICON < PRIORITY_DEFAULT);
    }
}
