//! Downloader middleware
//!
//! An ordered list of hooks around each fetch. `before_request` runs in
//! registration order and may drop the request or answer it without a fetch;
//! `after_response` runs in reverse order and may ask for a retry. The first
//! retry verdict wins.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::crawler::request::Request;
use crate::crawler::response::{ErrorKind, Response};
use crate::crawler::stats::CrawlStats;

/// Verdict of the pre-request hooks.
pub enum PreAction {
    /// Proceed to the next middleware / the downloader
    Continue,
    /// Discard the request without fetching
    Drop(&'static str),
    /// Answer the request without fetching
    ShortCircuit(Box<Response>),
}

/// Verdict of the post-response hooks.
pub enum PostAction {
    Continue,
    /// Re-enqueue the request after the given backoff
    Retry { backoff: Duration },
}

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn before_request(&self, _request: &mut Request) -> PreAction {
        PreAction::Continue
    }

    async fn after_response(&self, _request: &Request, _response: &mut Response) -> PostAction {
        PostAction::Continue
    }
}

/// The registered middleware, invoked in order pre-request and in reverse
/// order post-response.
pub struct MiddlewareChain {
    members: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new(members: Vec<Arc<dyn Middleware>>) -> Self {
        Self { members }
    }

    pub async fn before_request(&self, request: &mut Request) -> PreAction {
        for middleware in &self.members {
            match middleware.before_request(request).await {
                PreAction::Continue => {}
                action => return action,
            }
        }
        PreAction::Continue
    }

    pub async fn after_response(&self, request: &Request, response: &mut Response) -> PostAction {
        let mut verdict = PostAction::Continue;
        for middleware in self.members.iter().rev() {
            if let PostAction::Retry { backoff } =
                middleware.after_response(request, response).await
            {
                if matches!(verdict, PostAction::Continue) {
                    verdict = PostAction::Retry { backoff };
                }
            }
        }
        verdict
    }
}

/// Retry classification: transient transport failures and throttling
/// statuses are retried with exponential backoff.
pub struct RetryMiddleware {
    max_retries: u32,
    base: Duration,
    cap: Duration,
}

impl RetryMiddleware {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base: Duration::from_millis(500),
            cap: Duration::from_secs(8),
        }
    }

    fn is_retriable(response: &Response) -> bool {
        if matches!(
            response.error_kind,
            Some(ErrorKind::Timeout) | Some(ErrorKind::ConnectionError)
        ) {
            return true;
        }
        matches!(response.status, 429 | 502 | 503 | 504)
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        (self.base * factor).min(self.cap)
    }
}

#[async_trait]
impl Middleware for RetryMiddleware {
    async fn after_response(&self, request: &Request, response: &mut Response) -> PostAction {
        if !Self::is_retriable(response) || request.retries >= self.max_retries {
            return PostAction::Continue;
        }

        let backoff = self.backoff_for(request.retries);
        tracing::debug!(
            url = %request.url,
            attempt = request.retries + 1,
            ?backoff,
            "retrying request"
        );
        PostAction::Retry { backoff }
    }
}

/// Content types the engine will read bodies for.
pub const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "text/html",
    "application/xhtml+xml",
    "text/xml",
    "application/xml",
    "application/rss+xml",
    "application/atom+xml",
    "application/json",
    "application/feed+json",
    "text/plain",
];

/// Returns true when a Content-Type header value passes the gate. A missing
/// header passes; plenty of feed endpoints omit it.
pub fn content_type_allowed(content_type: &str) -> bool {
    if content_type.is_empty() {
        return true;
    }
    ALLOWED_CONTENT_TYPES
        .iter()
        .any(|allowed| content_type.starts_with(allowed))
}

/// Re-affirms the downloader's content-type gate on the final response.
/// Some servers misreport until the body arrives.
pub struct ContentTypeMiddleware;

#[async_trait]
impl Middleware for ContentTypeMiddleware {
    async fn after_response(&self, request: &Request, response: &mut Response) -> PostAction {
        if response.ok() && !content_type_allowed(&response.content_type()) {
            tracing::debug!(url = %request.url, content_type = %response.content_type(), "gated content type on response");
            response.status = 415;
            response.error_kind = Some(ErrorKind::HttpError);
            response.text = None;
            response.json = None;
            response.body.clear();
        }
        PostAction::Continue
    }
}

/// Increments the crawl counters around each fetch.
pub struct MetricsMiddleware {
    stats: Arc<CrawlStats>,
}

impl MetricsMiddleware {
    pub fn new(stats: Arc<CrawlStats>) -> Self {
        Self { stats }
    }
}

#[async_trait]
impl Middleware for MetricsMiddleware {
    async fn before_request(&self, _request: &mut Request) -> PreAction {
        self.stats.record_request();
        PreAction::Continue
    }

    async fn after_response(&self, _request: &Request, response: &mut Response) -> PostAction {
        self.stats.record_response(response.content_length());
        if let Some(kind) = response.error_kind {
            self.stats.record_error(kind);
        }
        PostAction::Continue
    }
}
