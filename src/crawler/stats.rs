//! Crawl statistics counters

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;

use crate::crawler::response::ErrorKind;

/// Live counters updated by the metrics middleware.
pub struct CrawlStats {
    started: Instant,
    requests: AtomicU64,
    responses: AtomicU64,
    retries: AtomicU64,
    bytes_downloaded: AtomicU64,
    errors: Mutex<HashMap<ErrorKind, u64>>,
}

impl CrawlStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            requests: AtomicU64::new(0),
            responses: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            bytes_downloaded: AtomicU64::new(0),
            errors: Mutex::new(HashMap::new()),
        }
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response(&self, bytes: u64) {
        self.responses.fetch_add(1, Ordering::Relaxed);
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, kind: ErrorKind) {
        let mut errors = self.errors.lock().expect("stats lock poisoned");
        *errors.entry(kind).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> CrawlStatsSnapshot {
        let errors = self
            .errors
            .lock()
            .expect("stats lock poisoned")
            .iter()
            .map(|(kind, count)| (kind.to_string(), *count))
            .collect();

        CrawlStatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            responses: self.responses.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            duration_ms: self.started.elapsed().as_millis() as u64,
            errors,
        }
    }
}

impl Default for CrawlStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the crawl counters, serializable for callers.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlStatsSnapshot {
    /// HTTP requests issued
    pub requests: u64,
    /// Responses received (any status)
    pub responses: u64,
    /// Requests re-enqueued by the retry middleware
    pub retries: u64,
    /// Total body bytes read
    pub bytes_downloaded: u64,
    /// Crawl duration in milliseconds
    pub duration_ms: u64,
    /// Failure counts by error classification
    pub errors: HashMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = CrawlStats::new();
        stats.record_request();
        stats.record_request();
        stats.record_response(1024);
        stats.record_response(512);
        stats.record_retry();

        let snap = stats.snapshot();
        assert_eq!(snap.requests, 2);
        assert_eq!(snap.responses, 2);
        assert_eq!(snap.retries, 1);
        assert_eq!(snap.bytes_downloaded, 1536);
    }

    #[test]
    fn test_error_counts() {
        let stats = CrawlStats::new();
        stats.record_error(ErrorKind::Timeout);
        stats.record_error(ErrorKind::Timeout);
        stats.record_error(ErrorKind::DnsFailure);

        let snap = stats.snapshot();
        assert_eq!(snap.errors.get("timeout"), Some(&2));
        assert_eq!(snap.errors.get("dns_failure"), Some(&1));
        assert_eq!(snap.errors.get("ssl_error"), None);
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = CrawlStats::new();
        stats.record_error(ErrorKind::HttpError);
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["errors"]["http_error"], 1);
    }
}
