//! Crawl coordinator
//!
//! The public entry point of the engine. Seeds the queue (robots.txt,
//! sitemap probes, try-url probes, origin pages, and the seeds themselves),
//! runs the worker pool to quiescence or deadline, dispatches responses to
//! their callbacks, and collects validated feeds into the result set.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::sync::LazyLock;
use std::time::Instant;

use chrono::Utc;
use regex::Regex;
use tokio::sync::Semaphore;
use url::Url;

use crate::config::SearchConfig;
use crate::crawler::downloader::Downloader;
use crate::crawler::dupefilter::DuplicateFilter;
use crate::crawler::middleware::{
    ContentTypeMiddleware, MetricsMiddleware, Middleware, MiddlewareChain, RetryMiddleware,
};
use crate::crawler::parser::extract_links;
use crate::crawler::queue::RequestQueue;
use crate::crawler::request::{
    Callback, Request, PRIORITY_FAVICON, PRIORITY_FEED_PATH, PRIORITY_FEED_TYPE, PRIORITY_ROBOTS,
    PRIORITY_SITEMAP,
};
use crate::crawler::response::{ErrorKind, Response};
use crate::crawler::robots_gate::RobotsMiddleware;
use crate::crawler::scheduler;
use crate::crawler::stats::{CrawlStats, CrawlStatsSnapshot};
use crate::feed::site_meta::{favicon_data_uri, parse_site_meta, MAX_FAVICON_BYTES};
use crate::feed::validator::{is_json_feed, looks_like_feed, parse_json_feed, parse_xml_feed};
use crate::feed::{Favicon, FeedInfo, LinkFilter, SiteMeta};
use crate::robots::RobotsRules;
use crate::url::{normalize_seed, origin_root, remove_www};
use crate::SearchError;

/// `<loc>` elements in sitemap documents.
static SITEMAP_LOC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<loc>\s*(.*?)\s*</loc>").expect("valid regex"));

/// URL patterns that make a sitemap entry worth fetching.
const SITEMAP_FEED_PATTERNS: &[&str] = &[
    "/rss", "/feed", "/atom", ".rss", ".xml", ".atom", "rss.", "feed.", "atom.", "/feeds/",
    "-feed", "_feed",
];

/// Output of one callback invocation.
pub(crate) enum Output {
    Req(Request),
    Feed(FeedInfo),
    Site(SiteMeta, Vec<Favicon>),
}

enum RootOutcome {
    Success,
    Failure(SearchError),
}

struct RootEntry {
    /// `None` for seeds that failed normalization; they never get requests.
    url: Option<Url>,
    outcome: Option<RootOutcome>,
}

/// State shared between the coordinator and the worker pool.
pub(crate) struct CrawlContext {
    pub(crate) config: SearchConfig,
    pub(crate) queue: RequestQueue,
    pub(crate) dupefilter: DuplicateFilter,
    pub(crate) throttle: crate::crawler::throttle::HostThrottle,
    pub(crate) downloader: OnceLock<Downloader>,
    pub(crate) middleware: OnceLock<MiddlewareChain>,
    pub(crate) robots: Arc<RobotsMiddleware>,
    pub(crate) stats: Arc<CrawlStats>,
    pub(crate) fetch_semaphore: Semaphore,
    pub(crate) in_flight: AtomicUsize,
    feeds: Mutex<HashMap<String, FeedInfo>>,
    site_metas: Mutex<Vec<SiteMeta>>,
    favicons: Mutex<HashMap<String, Favicon>>,
    allowed_hosts: RwLock<HashSet<String>>,
    seed_hosts: RwLock<HashSet<String>>,
    roots: Mutex<Vec<RootEntry>>,
}

/// Crawl controller. One instance runs one crawl.
pub struct Coordinator {
    ctx: Arc<CrawlContext>,
}

impl Coordinator {
    pub fn new(config: SearchConfig) -> Self {
        let stats = Arc::new(CrawlStats::new());
        let robots = Arc::new(RobotsMiddleware::new(
            config.user_agent.clone(),
            config.respect_robots,
        ));
        let concurrency = config.concurrency.max(1);

        let ctx = Arc::new(CrawlContext {
            config,
            queue: RequestQueue::new(),
            dupefilter: DuplicateFilter::new(),
            throttle: crate::crawler::throttle::HostThrottle::new(),
            downloader: OnceLock::new(),
            middleware: OnceLock::new(),
            robots,
            stats,
            fetch_semaphore: Semaphore::new(concurrency),
            in_flight: AtomicUsize::new(0),
            feeds: Mutex::new(HashMap::new()),
            site_metas: Mutex::new(Vec::new()),
            favicons: Mutex::new(HashMap::new()),
            allowed_hosts: RwLock::new(HashSet::new()),
            seed_hosts: RwLock::new(HashSet::new()),
            roots: Mutex::new(Vec::new()),
        });

        Self { ctx }
    }

    /// Runs the crawl for the given seed URLs until the queue quiesces or
    /// the global deadline fires.
    pub async fn run(&self, urls: &[&str]) {
        let ctx = &self.ctx;

        if let Err(e) = ctx.config.validate() {
            tracing::error!(error = %e, "invalid search configuration");
            return;
        }

        let downloader = match Downloader::build(&ctx.config) {
            Ok(downloader) => downloader,
            Err(e) => {
                tracing::error!(error = %e, "failed to build HTTP client");
                return;
            }
        };
        let _ = ctx.downloader.set(downloader);

        let middleware = MiddlewareChain::new(vec![
            ctx.robots.clone() as Arc<dyn Middleware>,
            Arc::new(RetryMiddleware::new(ctx.config.max_retries)),
            Arc::new(ContentTypeMiddleware),
            Arc::new(MetricsMiddleware::new(ctx.stats.clone())),
        ]);
        let _ = ctx.middleware.set(middleware);

        let seeds = self.collect_seeds(urls);
        if seeds.is_empty() {
            tracing::warn!("no valid seed URLs");
            return;
        }

        self.seed_queue(&seeds);

        let deadline = Instant::now() + ctx.config.total_timeout;
        scheduler::run_crawl(ctx.clone(), deadline).await;

        self.populate_feed_site_meta();
    }

    /// Normalizes the inputs, records root entries (including invalid-URL
    /// failures), and returns the unique valid seeds in input order.
    fn collect_seeds(&self, urls: &[&str]) -> Vec<Url> {
        let mut seeds = Vec::new();
        let mut seen = HashSet::new();
        let mut roots = self.ctx.roots.lock().expect("roots lock poisoned");
        let mut seed_hosts = self.ctx.seed_hosts.write().expect("hosts lock poisoned");
        let mut allowed = self.ctx.allowed_hosts.write().expect("hosts lock poisoned");

        for input in urls {
            match normalize_seed(input) {
                Ok(url) => {
                    if !seen.insert(url.as_str().to_string()) {
                        continue;
                    }
                    if let Some(host) = url.host_str() {
                        seed_hosts.insert(host.to_string());
                        allowed.insert(remove_www(host).to_string());
                    }
                    roots.push(RootEntry {
                        url: Some(url.clone()),
                        outcome: None,
                    });
                    seeds.push(url);
                }
                Err(e) => {
                    tracing::warn!(url = %input, error = %e, "invalid seed URL");
                    roots.push(RootEntry {
                        url: None,
                        outcome: Some(RootOutcome::Failure(SearchError {
                            url: input.to_string(),
                            error_type: ErrorKind::InvalidUrl,
                            message: ErrorKind::InvalidUrl.message().to_string(),
                            status_code: None,
                        })),
                    });
                }
            }
        }

        seeds
    }

    /// Enqueues the initial requests: robots.txt and a sitemap probe per
    /// origin, try-url probes, origin pages when host crawling is on, and
    /// the seeds themselves.
    fn seed_queue(&self, seeds: &[Url]) {
        let ctx = &self.ctx;
        let mut origins_seen = HashSet::new();

        for seed in seeds {
            let Ok(origin) = origin_root(seed) else {
                continue;
            };
            if !origins_seen.insert(origin.as_str().to_string()) {
                continue;
            }

            // Enqueueing anything on a new host also queues its robots.txt
            // at top priority; the conventional sitemap location is probed
            // without waiting for it, and any further sitemaps it declares
            // arrive later.
            if let Ok(sitemap_url) = origin.join("/sitemap.xml") {
                ctx.enqueue(
                    Request::new(sitemap_url, Callback::ParseSitemap)
                        .with_priority(PRIORITY_SITEMAP),
                );
            }

            if let Some(paths) = ctx.config.try_urls.paths() {
                for path in paths {
                    match origin.join(&path) {
                        Ok(probe) => ctx.enqueue(
                            Request::new(probe, Callback::ParseFeed)
                                .with_priority(PRIORITY_FEED_PATH),
                        ),
                        Err(e) => {
                            tracing::warn!(path = %path, error = %e, "invalid try-url path")
                        }
                    }
                }
            }

            if ctx.config.crawl_hosts {
                ctx.enqueue(Request::new(origin.clone(), Callback::ParseSiteMeta));
            }
        }

        for seed in seeds {
            ctx.enqueue(Request::new(seed.clone(), Callback::ParseHtml));
        }
    }

    /// Joins site metadata and favicons onto the collected feeds after the
    /// crawl completes.
    fn populate_feed_site_meta(&self) {
        let ctx = &self.ctx;
        let site_metas = ctx.site_metas.lock().expect("site meta lock poisoned");
        let favicons = ctx.favicons.lock().expect("favicon lock poisoned");
        let mut feeds = ctx.feeds.lock().expect("feeds lock poisoned");

        for feed in feeds.values_mut() {
            let feed_host = remove_www(feed.url.host_str().unwrap_or_default()).to_string();

            if let Some(meta) = site_metas.iter().find(|m| feed_host.contains(&m.host)) {
                if feed.site_url.is_none() {
                    feed.site_url = Some(meta.site_url.clone());
                }
                if feed.site_name.is_empty() {
                    feed.site_name = meta.site_name.clone();
                }
            }

            if let Some(declared) = &feed.favicon {
                if let Some(icon) = favicons.get(declared.as_str()) {
                    if !icon.data_uri.is_empty() {
                        feed.favicon_data_uri = icon.data_uri.clone();
                    }
                }
            }

            let needs_icon = feed.favicon.is_none()
                || (ctx.config.favicon_data_uri && feed.favicon_data_uri.is_empty());
            if needs_icon {
                let best = favicons
                    .values()
                    .filter(|icon| icon.matches_host(&feed_host, ctx.config.favicon_data_uri))
                    .min_by_key(|icon| icon.priority);
                if let Some(icon) = best {
                    feed.favicon = Some(icon.url.clone());
                    feed.favicon_data_uri = icon.data_uri.clone();
                }
            }
        }
    }

    /// The collected feeds, scored and sorted.
    pub fn ranked_feeds(&self) -> Vec<FeedInfo> {
        let ctx = &self.ctx;
        let seed_hosts = ctx.seed_hosts.read().expect("hosts lock poisoned").clone();
        let now = Utc::now();

        let mut feeds: Vec<FeedInfo> = ctx
            .feeds
            .lock()
            .expect("feeds lock poisoned")
            .values()
            .cloned()
            .collect();

        for feed in &mut feeds {
            feed.score = crate::feed::score::score_feed(feed, &seed_hosts, now);
        }
        crate::feed::score::sort_feeds(&mut feeds);
        feeds
    }

    /// The classified failure of the first seed, when every seed failed.
    pub fn root_error(&self) -> Option<SearchError> {
        let roots = self.ctx.roots.lock().expect("roots lock poisoned");
        if roots.is_empty() {
            return None;
        }

        let all_failed = roots
            .iter()
            .all(|entry| matches!(entry.outcome, Some(RootOutcome::Failure(_))));
        if !all_failed {
            return None;
        }

        roots.iter().find_map(|entry| match &entry.outcome {
            Some(RootOutcome::Failure(error)) => Some(error.clone()),
            _ => None,
        })
    }

    pub fn stats_snapshot(&self) -> CrawlStatsSnapshot {
        self.ctx.stats.snapshot()
    }
}

impl CrawlContext {
    /// Enqueues a request after depth and duplicate checks. Every URL that
    /// reaches this point is already normalized.
    pub(crate) fn enqueue(&self, request: Request) {
        if request.depth > self.config.max_depth {
            tracing::debug!(url = %request.url, depth = request.depth, "max depth reached");
            return;
        }
        if request.callback != Callback::ParseRobots {
            self.ensure_robots_queued(&request.url);
        }
        if !self.dupefilter.check_and_add(&request.url, request.method) {
            return;
        }
        tracing::trace!(url = %request.url, priority = request.priority, "queueing");
        self.queue.push(request);
    }

    /// Queues the robots.txt fetch for a host the first time the host is
    /// seen. Pushed before the triggering request and at top priority, so
    /// the rules are in hand before any gated request for the host runs.
    fn ensure_robots_queued(&self, url: &Url) {
        let Some(host) = url.host_str() else {
            return;
        };
        if !self.robots.expect_host(host) {
            return;
        }
        let Ok(origin) = origin_root(url) else {
            return;
        };
        let Ok(robots_url) = origin.join("/robots.txt") else {
            return;
        };

        let request =
            Request::new(robots_url, Callback::ParseRobots).with_priority(PRIORITY_ROBOTS);
        if self.dupefilter.check_and_add(&request.url, request.method) {
            self.queue.push(request);
        }
    }

    /// Re-enqueues a request for retry, bypassing the duplicate filter
    /// (the retry reuses the original request's identity).
    pub(crate) fn enqueue_retry(&self, request: Request) {
        self.stats.record_retry();
        self.queue.push(request);
    }

    /// Records the outcome of a root (seed) response. The latest response
    /// for a root wins, so a successful retry clears an earlier failure.
    pub(crate) fn record_root_outcome(&self, request: &Request, response: &Response) {
        let mut roots = self.roots.lock().expect("roots lock poisoned");
        let Some(entry) = roots
            .iter_mut()
            .find(|entry| entry.url.as_ref() == Some(&request.url))
        else {
            return;
        };

        entry.outcome = Some(if response.ok() {
            RootOutcome::Success
        } else {
            let kind = response.error_kind.unwrap_or(ErrorKind::Other);
            let status_code = (response.status > 0 && kind == ErrorKind::HttpError)
                .then_some(response.status as u16);
            RootOutcome::Failure(SearchError {
                url: request.url.as_str().to_string(),
                error_type: kind,
                message: kind.message().to_string(),
                status_code,
            })
        });
    }

    /// Dispatches a response to the parser selected by its request.
    pub(crate) fn dispatch(&self, request: &Request, response: &Response) -> Vec<Output> {
        if !response.ok() {
            return Vec::new();
        }

        match request.callback {
            Callback::ParseRobots => self.parse_robots(request, response),
            Callback::ParseSitemap => self.parse_sitemap(request, response),
            Callback::ParseFavicon => {
                self.parse_favicon(request, response);
                Vec::new()
            }
            Callback::ParseHtml | Callback::ParseFeed | Callback::ParseSiteMeta => {
                self.parse_page(request, response)
            }
        }
    }

    /// robots.txt callback: turn `Sitemap:` directives into sitemap
    /// requests. The disallow rules themselves were recorded by the robots
    /// middleware when this response passed through it.
    fn parse_robots(&self, request: &Request, response: &Response) -> Vec<Output> {
        let Some(text) = response.text.as_deref() else {
            return Vec::new();
        };

        let rules = RobotsRules::from_content(text);
        let sitemaps = rules.sitemaps();
        if !sitemaps.is_empty() {
            tracing::info!(url = %response.url, count = sitemaps.len(), "sitemaps declared in robots.txt");
        }

        let mut outputs = Vec::new();
        for sitemap in sitemaps {
            let Ok(mut url) = Url::parse(&sitemap) else {
                tracing::debug!(url = %sitemap, "unparseable sitemap URL");
                continue;
            };
            url.set_fragment(None);
            // Cross-origin sitemap hosts become part of the crawl scope.
            if let Some(host) = url.host_str() {
                self.allowed_hosts
                    .write()
                    .expect("hosts lock poisoned")
                    .insert(remove_www(host).to_string());
            }
            outputs.push(Output::Req(
                Request::new(url, Callback::ParseSitemap)
                    .with_priority(PRIORITY_SITEMAP)
                    .with_depth(request.depth + 1),
            ));
        }
        outputs
    }

    /// Sitemap callback: fetch the feed-like `<loc>` entries.
    fn parse_sitemap(&self, request: &Request, response: &Response) -> Vec<Output> {
        let Some(text) = response.text.as_deref() else {
            return Vec::new();
        };

        let feed_urls = sitemap_feed_urls(text);
        if !feed_urls.is_empty() {
            tracing::info!(url = %response.url, count = feed_urls.len(), "feed-like sitemap entries");
        }

        feed_urls
            .into_iter()
            .filter_map(|loc| Url::parse(&loc).ok())
            .map(|mut url| {
                url.set_fragment(None);
                Output::Req(
                    Request::new(url, Callback::ParseHtml)
                        .with_priority(PRIORITY_FEED_TYPE)
                        .with_depth(request.depth + 1),
                )
            })
            .collect()
    }

    /// Favicon callback: validate the bytes and store the data URI.
    fn parse_favicon(&self, request: &Request, response: &Response) {
        if response.body.is_empty() {
            return;
        }
        let Some(data_uri) = favicon_data_uri(&response.body) else {
            tracing::debug!(url = %response.url, "favicon bytes not a usable image");
            return;
        };

        let mut favicons = self.favicons.lock().expect("favicon lock poisoned");
        if let Some(icon) = favicons.get_mut(request.url.as_str()) {
            icon.data_uri = data_uri;
        }
    }

    /// The page cascade shared by the HTML, feed-candidate, and site-meta
    /// callbacks: detect an inline feed, harvest site metadata from origin
    /// pages, then filter outgoing links.
    fn parse_page(&self, request: &Request, response: &Response) -> Vec<Output> {
        let mut outputs = Vec::new();

        // JSON Feed path
        if let Some(json) = &response.json {
            if is_json_feed(json) {
                if let Some(feed) = parse_json_feed(response, Utc::now()) {
                    outputs.extend(self.feed_outputs(request, feed));
                }
                return outputs;
            }
        }

        let Some(text) = response.text.as_deref() else {
            return outputs;
        };

        // XML feed path: probe the body head, then validate properly.
        if looks_like_feed(text) {
            if let Some(feed) = parse_xml_feed(response, Utc::now()) {
                outputs.extend(self.feed_outputs(request, feed));
            }
            return outputs;
        }

        // Site metadata from origin pages.
        if self.config.crawl_hosts
            && (request.callback == Callback::ParseSiteMeta || response.is_origin_root())
            && self
                .dupefilter
                .first_parse(&response.url, Callback::ParseSiteMeta)
        {
            if let Some((meta, favicons)) = parse_site_meta(response) {
                outputs.push(Output::Site(meta, favicons));
            }
        }

        // Stop following links once children would exceed the depth cap,
        // or when a redirect moved us off the crawl's domains.
        if request.depth >= self.config.max_depth {
            tracing::debug!(url = %response.url, "max depth reached, not following links");
            return outputs;
        }
        if !is_original_domain(response) {
            return outputs;
        }

        let allowed = self.allowed_hosts.read().expect("hosts lock poisoned").clone();
        let filter = LinkFilter::new(&response.url, request.depth, &allowed);
        for link in extract_links(text) {
            if let Some(candidate) = filter.evaluate(&link.href, link.type_attr.as_deref()) {
                outputs.push(Output::Req(candidate));
            }
        }

        outputs
    }

    /// Wraps a validated feed with its follow-up favicon request.
    fn feed_outputs(&self, request: &Request, feed: FeedInfo) -> Vec<Output> {
        let mut outputs = Vec::new();

        if let Some(favicon_url) = feed.favicon.clone() {
            if self.config.favicon_data_uri {
                let host = remove_www(feed.url.host_str().unwrap_or_default()).to_string();
                self.favicons
                    .lock()
                    .expect("favicon lock poisoned")
                    .entry(favicon_url.as_str().to_string())
                    .or_insert_with(|| Favicon {
                        url: favicon_url.clone(),
                        site_host: host,
                        priority: 1,
                        data_uri: String::new(),
                    });
                outputs.push(Output::Req(
                    Request::new(favicon_url, Callback::ParseFavicon)
                        .with_priority(PRIORITY_FAVICON)
                        .with_depth(request.depth)
                        .with_max_content_length(MAX_FAVICON_BYTES as u64),
                ));
            }
        }

        outputs.push(Output::Feed(feed));
        outputs
    }

    /// Folds one callback output into the crawl state.
    pub(crate) fn handle_output(&self, output: Output) {
        match output {
            Output::Req(request) => self.enqueue(request),
            Output::Feed(feed) => self.add_feed(feed),
            Output::Site(meta, favicons) => self.add_site_meta(meta, favicons),
        }
    }

    /// Inserts a feed into the result set, enriching an existing record for
    /// the same canonical URL instead of duplicating it.
    fn add_feed(&self, feed: FeedInfo) {
        // Hub hosts join the crawl scope for link filtering.
        {
            let mut allowed = self.allowed_hosts.write().expect("hosts lock poisoned");
            for hub in &feed.hubs {
                if let Ok(hub_url) = Url::parse(hub) {
                    if let Some(host) = hub_url.host_str() {
                        allowed.insert(remove_www(host).to_string());
                    }
                }
            }
        }

        let mut feeds = self.feeds.lock().expect("feeds lock poisoned");
        match feeds.get_mut(feed.url.as_str()) {
            Some(existing) => existing.enrich_from(&feed),
            None => {
                tracing::info!(url = %feed.url, format = ?feed.format, "feed found");
                feeds.insert(feed.url.as_str().to_string(), feed);
            }
        }
    }

    fn add_site_meta(&self, meta: SiteMeta, favicons: Vec<Favicon>) {
        {
            let mut metas = self.site_metas.lock().expect("site meta lock poisoned");
            if metas.iter().any(|existing| existing.origin == meta.origin) {
                return;
            }
            tracing::debug!(origin = %meta.origin, name = %meta.site_name, "site metadata");
            metas.push(meta);
        }

        let fetch_icons = self.config.favicon_data_uri;
        let mut stored = self.favicons.lock().expect("favicon lock poisoned");
        for icon in favicons {
            let key = icon.url.as_str().to_string();
            let icon_url = icon.url.clone();
            if stored.contains_key(&key) {
                continue;
            }
            stored.insert(key, icon);
            if fetch_icons {
                self.enqueue(
                    Request::new(icon_url, Callback::ParseFavicon)
                        .with_priority(PRIORITY_FAVICON)
                        .with_max_content_length(MAX_FAVICON_BYTES as u64),
                );
            }
        }
    }
}

/// True when the final response URL is still on the domain the request was
/// issued for; redirects off-domain stop link following.
fn is_original_domain(response: &Response) -> bool {
    if response.history.len() < 2 {
        return true;
    }
    let Some(first) = response.history.first().and_then(|u| u.host_str()) else {
        return false;
    };
    let Some(current) = response.url.host_str() else {
        return false;
    };
    let first = remove_www(first);
    let current = remove_www(current);
    current == first || current.ends_with(&format!(".{first}"))
}

/// Extracts feed-like `<loc>` URLs from a sitemap document.
pub(crate) fn sitemap_feed_urls(sitemap_xml: &str) -> Vec<String> {
    SITEMAP_LOC_RE
        .captures_iter(sitemap_xml)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|loc| {
            let lower = loc.to_lowercase();
            SITEMAP_FEED_PATTERNS
                .iter()
                .any(|pattern| lower.contains(pattern))
        })
        .collect()
}
