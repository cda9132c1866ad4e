//! Feedscout: a concurrent feed-discovery crawler
//!
//! This crate finds RSS, Atom, and JSON feeds reachable from one or more seed
//! URLs by crawling a website concurrently, scanning HTML for candidate feed
//! links, validating candidates against the feed formats, and returning
//! ranked feed metadata.

pub mod config;
pub mod crawler;
pub mod feed;
pub mod output;
pub mod robots;
pub mod url;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crawler::Coordinator;
pub use crate::crawler::{CrawlStatsSnapshot, ErrorKind};
pub use crate::feed::FeedInfo;

/// Main error type for feedscout operations
#[derive(Debug, Error)]
pub enum FeedscoutError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Output error: {0}")]
    Output(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in configuration: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Host is not a resolvable name: {0}")]
    InvalidHost(String),
}

/// Result type alias for feedscout operations
pub type Result<T> = std::result::Result<T, FeedscoutError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::{SearchConfig, TryUrls};
pub use url::{normalize_href, normalize_seed};

/// Classified failure for a seed URL.
///
/// Never raised: root failures are reported as data on [`SearchResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchError {
    /// The URL that failed
    pub url: String,
    /// Classification of the failure
    pub error_type: ErrorKind,
    /// Human-readable message
    pub message: String,
    /// HTTP status code, when the failure was an HTTP error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl std::fmt::Display for SearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status_code {
            Some(code) => write!(
                f,
                "{}: {} (HTTP {}) - {}",
                self.error_type, self.message, code, self.url
            ),
            None => write!(f, "{}: {} - {}", self.error_type, self.message, self.url),
        }
    }
}

/// Result of a feed search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// Discovered feeds, sorted by score (highest first)
    pub feeds: Vec<FeedInfo>,
    /// Classified failure of the first seed, when every seed failed
    pub root_error: Option<SearchError>,
    /// Crawl statistics, when requested via `include_stats`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<CrawlStatsSnapshot>,
}

/// Searches for feeds reachable from the given seed URLs.
///
/// Returns the discovered feeds sorted by score. Root failures (DNS errors,
/// unreachable hosts, HTTP errors on every seed) yield an empty list; use
/// [`search_with_info`] for the failure classification.
///
/// # Example
///
/// ```no_run
/// # async fn example() {
/// use feedscout::{search, SearchConfig};
///
/// let feeds = search(&["https://example.com"], SearchConfig::default()).await;
/// for feed in feeds {
///     println!("{} ({})", feed.url, feed.score);
/// }
/// # }
/// ```
pub async fn search(urls: &[&str], config: SearchConfig) -> Vec<FeedInfo> {
    search_with_info(urls, config).await.feeds
}

/// Searches for feeds and reports root failures and optional statistics.
///
/// `root_error` is populated with the classification for the first seed only
/// when every seed URL failed; otherwise it is `None` and `feeds` holds
/// whatever was discovered within the crawl budget.
pub async fn search_with_info(urls: &[&str], config: SearchConfig) -> SearchResult {
    let include_stats = config.include_stats;
    let coordinator = Coordinator::new(config);
    coordinator.run(urls).await;

    let feeds = coordinator.ranked_feeds();
    let root_error = coordinator.root_error();
    let stats = include_stats.then(|| coordinator.stats_snapshot());

    SearchResult {
        feeds,
        root_error,
        stats,
    }
}
