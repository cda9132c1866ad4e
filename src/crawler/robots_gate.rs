//! Robots middleware
//!
//! Maintains the per-host robots.txt cache and readiness signal, and drops
//! requests disallowed for the configured user agent. Robots and sitemap
//! fetches are never gated, so the robots.txt fetch cannot block itself and
//! sitemaps are reachable on hosts that disallow everything else.
//!
//! Ordering guarantee: once a host's robots.txt fetch is pending, no gated
//! request for that host proceeds before the robots response has been
//! observed (or its fetch failed). Waiters are capped so a wedged robots
//! fetch cannot stall the crawl.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use url::Url;

use crate::crawler::middleware::{Middleware, PostAction, PreAction};
use crate::crawler::request::{Callback, Request};
use crate::crawler::response::Response;
use crate::robots::RobotsRules;

/// How long a gated request waits for its host's robots.txt before
/// proceeding as if allowed.
const READINESS_CAP: Duration = Duration::from_secs(5);

struct HostEntry {
    rules: Mutex<Option<RobotsRules>>,
    ready_tx: watch::Sender<bool>,
    ready_rx: watch::Receiver<bool>,
}

impl HostEntry {
    fn new() -> Self {
        let (ready_tx, ready_rx) = watch::channel(false);
        Self {
            rules: Mutex::new(None),
            ready_tx,
            ready_rx,
        }
    }
}

pub struct RobotsMiddleware {
    user_agent: String,
    respect_robots: bool,
    hosts: Mutex<HashMap<String, Arc<HostEntry>>>,
    /// Hosts with a robots.txt fetch queued or completed. Only these gate
    /// waiters; a host nobody fetched robots for is not worth stalling on.
    fetching: Mutex<HashSet<String>>,
}

impl RobotsMiddleware {
    pub fn new(user_agent: String, respect_robots: bool) -> Self {
        Self {
            user_agent,
            respect_robots,
            hosts: Mutex::new(HashMap::new()),
            fetching: Mutex::new(HashSet::new()),
        }
    }

    fn entry_for(&self, host: &str) -> Arc<HostEntry> {
        let mut hosts = self.hosts.lock().expect("robots lock poisoned");
        hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(HostEntry::new()))
            .clone()
    }

    /// Marks a host as having a robots.txt fetch on the way. Returns `true`
    /// the first time a host is marked; the caller then owns enqueueing the
    /// fetch.
    pub fn expect_host(&self, host: &str) -> bool {
        self.fetching
            .lock()
            .expect("robots lock poisoned")
            .insert(host.to_string())
    }

    fn is_pending(&self, host: &str) -> bool {
        self.fetching
            .lock()
            .expect("robots lock poisoned")
            .contains(host)
    }

    /// Records the rules for a host and releases its waiters. Called for
    /// both successful and failed robots.txt fetches.
    pub fn record(&self, host: &str, rules: RobotsRules) {
        let entry = self.entry_for(host);
        *entry.rules.lock().expect("robots lock poisoned") = Some(rules);
        let _ = entry.ready_tx.send(true);
    }

    /// Checks whether a URL is allowed for the configured user agent.
    /// Unknown hosts are allowed.
    pub fn is_allowed(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return true;
        };
        let entry = self.entry_for(host);
        let rules = entry.rules.lock().expect("robots lock poisoned");
        match rules.as_ref() {
            Some(rules) => rules.is_allowed(url.as_str(), &self.user_agent),
            None => true,
        }
    }

    /// Crawl delay declared for a host, if its robots.txt has been seen.
    pub fn crawl_delay(&self, host: &str) -> Option<Duration> {
        let entry = self.entry_for(host);
        let rules = entry.rules.lock().expect("robots lock poisoned");
        rules
            .as_ref()
            .and_then(|r| r.crawl_delay(&self.user_agent))
            .map(Duration::from_secs_f64)
    }
}

#[async_trait]
impl Middleware for RobotsMiddleware {
    async fn before_request(&self, request: &mut Request) -> PreAction {
        if !self.respect_robots {
            return PreAction::Continue;
        }
        if matches!(
            request.callback,
            Callback::ParseRobots | Callback::ParseSitemap
        ) {
            return PreAction::Continue;
        }

        let Some(host) = request.url.host_str() else {
            return PreAction::Continue;
        };

        let entry = self.entry_for(host);
        let has_rules = entry
            .rules
            .lock()
            .expect("robots lock poisoned")
            .is_some();
        if !has_rules && self.is_pending(host) {
            let mut ready = entry.ready_rx.clone();
            let wait = tokio::time::timeout(READINESS_CAP, ready.wait_for(|ready| *ready));
            if wait.await.is_err() {
                tracing::debug!(host, url = %request.url, "robots.txt readiness wait expired");
            }
        }

        if self.is_allowed(&request.url) {
            PreAction::Continue
        } else {
            tracing::debug!(url = %request.url, "dropped by robots.txt");
            PreAction::Drop("disallowed by robots.txt")
        }
    }

    async fn after_response(&self, request: &Request, response: &mut Response) -> PostAction {
        // The robots.txt response itself feeds the cache, success or not.
        if request.callback == Callback::ParseRobots {
            if let Some(host) = request.url.host_str() {
                let rules = match (response.ok(), response.text.as_deref()) {
                    (true, Some(text)) => RobotsRules::from_content(text),
                    _ => RobotsRules::allow_all(),
                };
                self.record(host, rules);
            }
        }
        PostAction::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::request::Method;

    fn request(url: &str, callback: Callback) -> Request {
        Request::new(Url::parse(url).unwrap(), callback)
    }

    fn robots_response(url: &str, status: i32, text: Option<&str>) -> Response {
        let url = Url::parse(url).unwrap();
        let mut resp = Response::failure(
            url.clone(),
            Method::Get,
            status,
            None,
            vec![url],
            Duration::ZERO,
        );
        resp.text = text.map(String::from);
        resp
    }

    #[tokio::test]
    async fn test_disabled_never_gates() {
        let middleware = RobotsMiddleware::new("TestBot".to_string(), false);
        let mut req = request("https://example.com/private/feed", Callback::ParseHtml);
        assert!(matches!(
            middleware.before_request(&mut req).await,
            PreAction::Continue
        ));
    }

    #[tokio::test]
    async fn test_robots_fetch_not_gated_by_itself() {
        let middleware = RobotsMiddleware::new("TestBot".to_string(), true);
        middleware.expect_host("example.com");
        let mut req = request("https://example.com/robots.txt", Callback::ParseRobots);
        // Must return immediately even though no rules are recorded yet.
        assert!(matches!(
            middleware.before_request(&mut req).await,
            PreAction::Continue
        ));
    }

    #[tokio::test]
    async fn test_sitemap_not_gated_by_disallow() {
        let middleware = RobotsMiddleware::new("TestBot".to_string(), true);
        middleware.record(
            "example.com",
            RobotsRules::from_content("User-agent: *\nDisallow: /"),
        );

        let mut req = request("https://example.com/sitemap.xml", Callback::ParseSitemap);
        assert!(matches!(
            middleware.before_request(&mut req).await,
            PreAction::Continue
        ));
    }

    #[tokio::test]
    async fn test_unexpected_host_not_stalled() {
        let middleware = RobotsMiddleware::new("TestBot".to_string(), true);
        let mut req = request("https://fresh-host.com/feed", Callback::ParseHtml);

        let started = std::time::Instant::now();
        let action = middleware.before_request(&mut req).await;
        assert!(matches!(action, PreAction::Continue));
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_expect_host_first_time_only() {
        let middleware = RobotsMiddleware::new("TestBot".to_string(), true);
        assert!(middleware.expect_host("example.com"));
        assert!(!middleware.expect_host("example.com"));
        assert!(middleware.expect_host("other.com"));
    }

    #[tokio::test]
    async fn test_disallowed_request_dropped() {
        let middleware = RobotsMiddleware::new("TestBot".to_string(), true);
        middleware.expect_host("example.com");
        middleware.record(
            "example.com",
            RobotsRules::from_content("User-agent: *\nDisallow: /private/"),
        );

        let mut req = request("https://example.com/private/feed.xml", Callback::ParseHtml);
        assert!(matches!(
            middleware.before_request(&mut req).await,
            PreAction::Drop(_)
        ));

        let mut req = request("https://example.com/blog", Callback::ParseHtml);
        assert!(matches!(
            middleware.before_request(&mut req).await,
            PreAction::Continue
        ));
    }

    #[tokio::test]
    async fn test_waiter_released_by_record() {
        let middleware = Arc::new(RobotsMiddleware::new("TestBot".to_string(), true));
        middleware.expect_host("example.com");

        let gated = {
            let middleware = middleware.clone();
            tokio::spawn(async move {
                let mut req = request("https://example.com/page", Callback::ParseHtml);
                middleware.before_request(&mut req).await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        middleware.record("example.com", RobotsRules::allow_all());

        let action = gated.await.unwrap();
        assert!(matches!(action, PreAction::Continue));
    }

    #[tokio::test]
    async fn test_after_response_records_rules() {
        let middleware = RobotsMiddleware::new("TestBot".to_string(), true);
        let req = request("https://example.com/robots.txt", Callback::ParseRobots);
        let mut resp = robots_response(
            "https://example.com/robots.txt",
            200,
            Some("User-agent: *\nDisallow: /secret/"),
        );
        middleware.after_response(&req, &mut resp).await;

        assert!(!middleware.is_allowed(&Url::parse("https://example.com/secret/x").unwrap()));
        assert!(middleware.is_allowed(&Url::parse("https://example.com/open").unwrap()));
    }

    #[tokio::test]
    async fn test_failed_robots_fetch_allows_all() {
        let middleware = RobotsMiddleware::new("TestBot".to_string(), true);
        middleware.expect_host("example.com");
        let req = request("https://example.com/robots.txt", Callback::ParseRobots);
        let mut resp = robots_response("https://example.com/robots.txt", 404, None);
        middleware.after_response(&req, &mut resp).await;

        let mut gated = request("https://example.com/anything", Callback::ParseHtml);
        assert!(matches!(
            middleware.before_request(&mut gated).await,
            PreAction::Continue
        ));
    }
}
