//! Feed relevance scoring and result ordering

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::feed::feed_info::FeedInfo;
use crate::url::remove_www;

/// URL path fragments that mark a conventional feed location.
const COMMON_FEED_PATHS: &[&str] = &["/feed", "/rss", ".xml"];

/// Scores one feed against the crawl's seed hosts.
pub fn score_feed(feed: &FeedInfo, seed_hosts: &HashSet<String>, now: DateTime<Utc>) -> i32 {
    let mut score = 0;

    let feed_host = remove_www(feed.url.host_str().unwrap_or_default());
    if seed_hosts
        .iter()
        .any(|seed| remove_www(seed) == feed_host)
    {
        score += 10;
    }

    let path = feed.url.path().to_lowercase();
    if COMMON_FEED_PATHS.iter().any(|frag| path.contains(frag)) {
        score += 5;
    }

    if !feed.title.is_empty() {
        score += 3;
    }
    if !feed.description.is_empty() {
        score += 2;
    }

    if feed.item_count > 0 {
        score += 2;
    }
    if let Some(updated) = feed.last_updated {
        if now - updated <= Duration::days(30) {
            score += 2;
        }
        if now - updated <= Duration::days(7) {
            score += 2;
        }
    }

    if feed.bozo != 0 {
        score -= 5;
    }

    score += (feed.hubs.len() as i32).min(2);

    score
}

/// Sorts feeds for the caller: score descending, ties broken by the shorter
/// URL path, then by the URL itself.
pub fn sort_feeds(feeds: &mut [FeedInfo]) {
    feeds.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.url.path().len().cmp(&b.url.path().len()))
            .then_with(|| a.url.as_str().cmp(b.url.as_str()))
    });
}
