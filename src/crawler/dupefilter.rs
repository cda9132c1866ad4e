//! Duplicate suppression for crawl URLs
//!
//! Fingerprints are SHA-256 digests of the dedupe key (query-stripped
//! canonical URL, see [`crate::url::dedupe_key`]) plus the HTTP method.
//! Fetch dedupe and parse dedupe are tracked separately so a response can be
//! re-examined by another callback without being fetched again.

use std::collections::HashSet;
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use url::Url;

use crate::crawler::request::{Callback, Method};
use crate::url::dedupe_key;

/// Thread-safe set of URL fingerprints.
#[derive(Default)]
pub struct DuplicateFilter {
    enqueued: Mutex<HashSet<String>>,
    parsed: Mutex<HashSet<String>>,
}

impl DuplicateFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a URL about to be enqueued. Returns `true` when the URL was
    /// not seen before (the caller may proceed), `false` for a duplicate.
    pub fn check_and_add(&self, url: &Url, method: Method) -> bool {
        let fp = fingerprint(url, method);
        self.enqueued.lock().expect("filter lock poisoned").insert(fp)
    }

    /// Records a response URL (which may differ from the request URL after
    /// redirects) so the redirect target is not fetched again.
    pub fn mark_fetched(&self, url: &Url, method: Method) {
        let fp = fingerprint(url, method);
        self.enqueued.lock().expect("filter lock poisoned").insert(fp);
    }

    /// Returns `true` the first time a (URL, callback) pair is parsed.
    pub fn first_parse(&self, url: &Url, callback: Callback) -> bool {
        let mut fp = fingerprint(url, Method::Get);
        fp.push(':');
        fp.push_str(&format!("{callback:?}"));
        self.parsed.lock().expect("filter lock poisoned").insert(fp)
    }

    /// Number of distinct URLs recorded for fetching.
    pub fn seen_count(&self) -> usize {
        self.enqueued.lock().expect("filter lock poisoned").len()
    }
}

fn fingerprint(url: &Url, method: Method) -> String {
    let mut hasher = Sha256::new();
    hasher.update(dedupe_key(url).as_bytes());
    hasher.update(method.as_str().as_bytes());
    hex::encode(hasher.finalize())
}
