//! Search configuration
//!
//! Options controlling one crawl. Defaults match the documented public API;
//! `validate` rejects configurations that would stall or runaway the engine.

use std::time::Duration;

use crate::ConfigError;

/// Common feed paths probed per origin when `try_urls` is enabled without an
/// explicit list.
pub const DEFAULT_TRY_PATHS: &[&str] = &[
    "index.xml",
    "atom.xml",
    "feeds",
    "feeds/default",
    "feed",
    "feed/default",
    "feeds/posts/default",
    "?feed=rss",
    "?feed=atom",
    "?feed=rss2",
    "?feed=rdf",
    "rss",
    "atom",
    "rdf",
    "index.rss",
    "index.rdf",
    "index.atom",
    "data/rss",
    "rss.xml",
    "index.json",
    "about",
    "about/feeds",
    "rss-feeds",
];

/// Whether and how to probe common feed paths on each seed origin.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TryUrls {
    /// No probing
    #[default]
    Disabled,
    /// Probe the built-in [`DEFAULT_TRY_PATHS`]
    Defaults,
    /// Probe the given paths
    Paths(Vec<String>),
}

impl TryUrls {
    /// The paths to probe, if any.
    pub fn paths(&self) -> Option<Vec<String>> {
        match self {
            TryUrls::Disabled => None,
            TryUrls::Defaults => Some(DEFAULT_TRY_PATHS.iter().map(|s| s.to_string()).collect()),
            TryUrls::Paths(paths) => Some(paths.clone()),
        }
    }
}

/// Options for one feed search.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Also fetch the origin page of each seed for site metadata
    pub crawl_hosts: bool,
    /// Probe common feed paths per origin
    pub try_urls: TryUrls,
    /// Worker pool size and in-flight fetch limit
    pub concurrency: usize,
    /// Global crawl deadline
    pub total_timeout: Duration,
    /// Per-request deadline
    pub request_timeout: Duration,
    /// User-Agent header
    pub user_agent: String,
    /// Response body size cap in bytes
    pub max_content_length: u64,
    /// Link depth cap; seeds are depth 0
    pub max_depth: u32,
    /// Extra request headers
    pub headers: Vec<(String, String)>,
    /// Inline favicons as data URIs
    pub favicon_data_uri: bool,
    /// Minimum interval between requests to one host
    pub delay: Duration,
    /// Honor robots.txt disallow rules
    pub respect_robots: bool,
    /// Populate statistics on the search result
    pub include_stats: bool,
    /// Retry budget per request
    pub max_retries: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            crawl_hosts: true,
            try_urls: TryUrls::Disabled,
            concurrency: 10,
            total_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(3),
            user_agent: "Feedsearch Bot".to_string(),
            max_content_length: 10 * 1024 * 1024,
            max_depth: 10,
            headers: Vec::new(),
            favicon_data_uri: true,
            delay: Duration::ZERO,
            respect_robots: true,
            include_stats: false,
            max_retries: 3,
        }
    }
}

impl SearchConfig {
    /// Checks the configuration for values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Validation(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.concurrency > 256 {
            return Err(ConfigError::Validation(format!(
                "concurrency of {} is unreasonably high (max 256)",
                self.concurrency
            )));
        }
        if self.total_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "total_timeout must be positive".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "request_timeout must be positive".to_string(),
            ));
        }
        if self.max_content_length == 0 {
            return Err(ConfigError::Validation(
                "max_content_length must be positive".to_string(),
            ));
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Validation(
                "user_agent must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
