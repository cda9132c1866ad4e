//! Feed validation
//!
//! Classifies a response body as RSS/Atom/JSON-Feed or not, and extracts
//! feed metadata. The XML path leans on `feed-rs`; the JSON Feed path works
//! directly on the parsed JSON body. Malformed XML that still looks
//! feed-like is recovered into a `bozo = 1` record when a title can be
//! salvaged.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use url::Url;

use crate::crawler::response::Response;
use crate::feed::dates::{non_future, parse_date, velocity};
use crate::feed::feed_info::{FeedFormat, FeedInfo};

/// Feed-likeness probe applied to the first 1024 characters of the body.
static FEED_LIKE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(<rss|<rdf|<feed)").expect("valid regex"));

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex"));

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

const MAX_TITLE_LEN: usize = 1024;

/// True when the body's first kilobyte contains a feed-like root element.
/// Anything past that is almost certainly not an actual feed.
pub fn looks_like_feed(text: &str) -> bool {
    let mut end = text.len().min(1024);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    FEED_LIKE_RE.is_match(&text[..end])
}

/// True when a JSON body is a JSON Feed document: a `version` containing
/// `jsonfeed.org` and an `items` array.
pub fn is_json_feed(json: &serde_json::Value) -> bool {
    let version_ok = json
        .get("version")
        .and_then(|v| v.as_str())
        .map(|v| v.contains("jsonfeed.org"))
        .unwrap_or(false);

    version_ok && json.get("items").map(|i| i.is_array()).unwrap_or(false)
}

/// Validates an XML response as an RSS/Atom/RDF feed.
pub fn parse_xml_feed(response: &Response, now: DateTime<Utc>) -> Option<FeedInfo> {
    let text = response.text.as_deref()?;

    match feed_rs::parser::parse(response.body.as_slice()) {
        Ok(feed) => Some(build_from_parsed(response, feed, text, now)),
        Err(e) => {
            if !looks_like_feed(text) {
                return None;
            }
            tracing::debug!(url = %response.url, error = %e, "malformed feed, attempting recovery");
            recover_bozo_feed(response, text)
        }
    }
}

fn build_from_parsed(
    response: &Response,
    feed: feed_rs::model::Feed,
    raw_text: &str,
    now: DateTime<Utc>,
) -> FeedInfo {
    use feed_rs::model::FeedType;

    let (format, version) = match feed.feed_type {
        FeedType::Atom => (FeedFormat::Atom, "atom10"),
        FeedType::RSS0 => (FeedFormat::Rss, "rss090"),
        FeedType::RSS1 => (FeedFormat::Rss, "rss10"),
        FeedType::RSS2 => (FeedFormat::Rss, "rss20"),
        FeedType::JSON => (FeedFormat::Json, "json11"),
    };

    let mut item = FeedInfo::new(response.url.clone(), format);
    item.version = version.to_string();
    item.content_type = default_content_type(response, format);
    item.content_length = response.content_length();

    item.title = feed
        .title
        .as_ref()
        .map(|t| clean_title(&t.content))
        .unwrap_or_default();
    item.description = feed
        .description
        .as_ref()
        .map(|d| clean_title(&d.content))
        .unwrap_or_default();

    // WebSub discovery: HTTP Link headers take precedence over feed links.
    let (header_hubs, header_self) = header_links(response);
    if header_hubs.is_empty() {
        for link in &feed.links {
            match link.rel.as_deref() {
                Some("hub") => item.hubs.push(link.href.clone()),
                Some("self") => item.self_url = Url::parse(&link.href).ok(),
                _ => {}
            }
        }
    } else {
        item.hubs = header_hubs;
        item.self_url = header_self;
    }
    item.is_push = !item.hubs.is_empty() && item.self_url.is_some();

    // Site link: the first non-self link, matching how publishers declare
    // their HTML alternate.
    item.site_url = feed
        .links
        .iter()
        .find(|l| !matches!(l.rel.as_deref(), Some("self") | Some("hub")))
        .and_then(|l| Url::parse(&l.href).ok());

    item.item_count = feed.entries.len() as u32;

    let entry_dates: Vec<DateTime<Utc>> = feed
        .entries
        .iter()
        .filter_map(|e| e.updated.or(e.published))
        .collect();
    let entry_dates = non_future(entry_dates, now);
    item.last_updated = entry_dates.iter().max().copied().or_else(|| {
        feed.updated
            .filter(|d| *d <= now)
    });
    item.velocity = velocity(item.item_count, &entry_dates);

    item.is_podcast = is_podcast(&feed, raw_text);

    if item.self_url.is_none() {
        item.self_url = Some(response.url.clone());
    }

    item
}

/// Salvages what it can from a document that claims to be a feed but does
/// not parse. A recoverable title is enough to report the URL as a broken
/// feed instead of dropping it.
fn recover_bozo_feed(response: &Response, text: &str) -> Option<FeedInfo> {
    let title = TITLE_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| clean_title(m.as_str()))?;

    let format = if text.contains("<feed") {
        FeedFormat::Atom
    } else {
        FeedFormat::Rss
    };

    let mut item = FeedInfo::new(response.url.clone(), format);
    item.title = title;
    item.bozo = 1;
    item.content_type = default_content_type(response, format);
    item.content_length = response.content_length();
    Some(item)
}

/// Validates a JSON body as a JSON Feed 1.x document.
pub fn parse_json_feed(response: &Response, now: DateTime<Utc>) -> Option<FeedInfo> {
    let json = response.json.as_ref()?;
    if !is_json_feed(json) {
        return None;
    }

    let items = json.get("items").and_then(|i| i.as_array())?;
    if items.is_empty() {
        return None;
    }

    let mut item = FeedInfo::new(response.url.clone(), FeedFormat::Json);
    item.version = json_version_tag(json.get("version").and_then(|v| v.as_str()).unwrap_or(""));
    item.content_type = default_content_type(response, FeedFormat::Json);
    item.content_length = response.content_length();

    item.title = json
        .get("title")
        .and_then(|v| v.as_str())
        .map(clean_title)
        .unwrap_or_default();
    item.description = json
        .get("description")
        .and_then(|v| v.as_str())
        .map(clean_title)
        .unwrap_or_default();

    item.favicon = json
        .get("favicon")
        .and_then(|v| v.as_str())
        .and_then(|s| Url::parse(s).ok());

    item.self_url = json
        .get("feed_url")
        .and_then(|v| v.as_str())
        .and_then(|s| Url::parse(s).ok());
    item.site_url = json
        .get("home_page_url")
        .and_then(|v| v.as_str())
        .and_then(|s| Url::parse(s).ok());

    let (header_hubs, header_self) = header_links(response);
    if header_hubs.is_empty() {
        if let Some(hubs) = json.get("hubs").and_then(|v| v.as_array()) {
            item.hubs = hubs
                .iter()
                .filter_map(|h| h.get("url").and_then(|u| u.as_str()))
                .map(String::from)
                .collect();
        }
    } else {
        item.hubs = header_hubs;
        if item.self_url.is_none() {
            item.self_url = header_self;
        }
    }
    item.is_push = !item.hubs.is_empty() && item.self_url.is_some();

    item.item_count = items.len() as u32;

    let entry_dates: Vec<DateTime<Utc>> = items
        .iter()
        .filter_map(|entry| {
            entry
                .get("date_modified")
                .or_else(|| entry.get("date_published"))
                .and_then(|v| v.as_str())
                .and_then(parse_date)
        })
        .collect();
    let entry_dates = non_future(entry_dates, now);
    item.last_updated = entry_dates.iter().max().copied();
    item.velocity = velocity(item.item_count, &entry_dates);

    if item.self_url.is_none() {
        item.self_url = Some(response.url.clone());
    }

    Some(item)
}

/// Maps a JSON Feed version URL to a compact tag:
/// `https://jsonfeed.org/version/1.1` becomes `json11`.
fn json_version_tag(version_url: &str) -> String {
    let suffix = version_url.rsplit('/').next().unwrap_or("");
    let digits: String = suffix.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        "json".to_string()
    } else {
        format!("json{digits}")
    }
}

fn default_content_type(response: &Response, format: FeedFormat) -> String {
    let declared = response.content_type();
    if !declared.is_empty() {
        return declared;
    }
    match format {
        FeedFormat::Json => "application/json".to_string(),
        _ => "text/xml".to_string(),
    }
}

/// A feed is a podcast when it carries the itunes namespace or any entry has
/// audio media content.
fn is_podcast(feed: &feed_rs::model::Feed, raw_text: &str) -> bool {
    if raw_text.contains("xmlns:itunes") {
        return true;
    }
    feed.entries.iter().any(|entry| {
        entry.media.iter().any(|media| {
            media.content.iter().any(|content| {
                content
                    .content_type
                    .as_ref()
                    .map(|ct| ct.to_string().starts_with("audio"))
                    .unwrap_or(false)
            })
        })
    })
}

/// Strips markup and control characters from a title; dodgy feeds embed
/// both. Long titles are truncated.
pub fn clean_title(raw: &str) -> String {
    let without_tags = TAG_RE.replace_all(raw, "");
    let mut cleaned: String = without_tags
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string();

    if cleaned.len() > MAX_TITLE_LEN {
        let mut end = MAX_TITLE_LEN - 3;
        while !cleaned.is_char_boundary(end) {
            end -= 1;
        }
        cleaned.truncate(end);
        cleaned.push_str("...");
    }
    cleaned
}

/// Extracts WebSub hub and self links from the HTTP `Link` header.
///
/// `Link: <https://hub.example.com/>; rel="hub", <https://example.com/feed>; rel="self"`
pub fn header_links(response: &Response) -> (Vec<String>, Option<Url>) {
    let Some(header) = response.header("link") else {
        return (Vec::new(), None);
    };

    let mut hubs = Vec::new();
    let mut self_url = None;

    for part in header.split(',') {
        let mut segments = part.split(';');
        let Some(url_segment) = segments.next() else {
            continue;
        };
        let url = url_segment.trim().trim_start_matches('<').trim_end_matches('>');

        let rel = segments.find_map(|seg| {
            let seg = seg.trim();
            seg.strip_prefix("rel=")
                .map(|v| v.trim_matches('"').trim_matches('\'').to_string())
        });

        match rel.as_deref() {
            Some("hub") => hubs.push(url.to_string()),
            Some("self") => self_url = Url::parse(url).ok(),
            _ => {}
        }
    }

    (hubs, self_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::request::Method;
    use std::time::Duration;

    const RSS_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example Blog</title>
    <link>https://example.com/</link>
    <description>An example blog</description>
    <item>
      <guid>1</guid>
      <title>First</title>
      <pubDate>Mon, 03 Jun 2024 00:00:00 GMT</pubDate>
    </item>
    <item>
      <guid>2</guid>
      <title>Second</title>
      <pubDate>Mon, 13 May 2024 00:00:00 GMT</pubDate>
    </item>
  </channel>
</rss>"#;

    const ATOM_SAMPLE: &str = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Example</title>
  <link href="https://example.com/" rel="alternate"/>
  <link href="https://example.com/feed.atom" rel="self"/>
  <link href="https://hub.example.com/" rel="hub"/>
  <subtitle>Example subtitle</subtitle>
  <updated>2024-06-03T00:00:00Z</updated>
  <entry>
    <id>urn:1</id>
    <title>Entry</title>
    <updated>2024-06-03T00:00:00Z</updated>
  </entry>
</feed>"#;

    const JSON_FEED_SAMPLE: &str = r#"{
  "version": "https://jsonfeed.org/version/1.1",
  "title": "JSON Example",
  "description": "A json feed",
  "home_page_url": "https://example.com/",
  "feed_url": "https://example.com/feed.json",
  "items": [
    {"id": "1", "date_published": "2024-06-03T00:00:00Z"},
    {"id": "2", "date_published": "2024-05-13T00:00:00Z"}
  ]
}"#;

    fn now() -> DateTime<Utc> {
        parse_date("2024-06-10T00:00:00Z").unwrap()
    }

    fn response_with_body(body: &str, content_type: &str) -> Response {
        let url = Url::parse("https://example.com/feed.xml").unwrap();
        let mut resp = Response::failure(
            url.clone(),
            Method::Get,
            200,
            None,
            vec![url],
            Duration::ZERO,
        );
        resp.body = body.as_bytes().to_vec();
        resp.text = Some(body.to_string());
        if !content_type.is_empty() {
            resp.headers
                .insert("content-type".to_string(), content_type.to_string());
        }
        if content_type.contains("json") {
            resp.json = serde_json::from_str(body).ok();
        }
        resp
    }

    #[test]
    fn test_looks_like_feed() {
        assert!(looks_like_feed("<?xml version=\"1.0\"?><rss version=\"2.0\">"));
        assert!(looks_like_feed("<feed xmlns=\"http://www.w3.org/2005/Atom\">"));
        assert!(looks_like_feed("<rdf:RDF>"));
        assert!(!looks_like_feed("<html><body>nope</body></html>"));
    }

    #[test]
    fn test_looks_like_feed_only_scans_prefix() {
        let mut page = "<html>".to_string();
        page.push_str(&"x".repeat(2000));
        page.push_str("<rss version=\"2.0\">");
        assert!(!looks_like_feed(&page));
    }

    #[test]
    fn test_is_json_feed() {
        let good: serde_json::Value = serde_json::from_str(JSON_FEED_SAMPLE).unwrap();
        assert!(is_json_feed(&good));

        let no_items: serde_json::Value =
            serde_json::from_str(r#"{"version": "https://jsonfeed.org/version/1.1"}"#).unwrap();
        assert!(!is_json_feed(&no_items));

        let wrong_version: serde_json::Value =
            serde_json::from_str(r#"{"version": "2.0", "items": []}"#).unwrap();
        assert!(!is_json_feed(&wrong_version));

        // The broken short-circuit in some implementations passes anything
        // with a feed_url member; this must not.
        let only_feed_url: serde_json::Value =
            serde_json::from_str(r#"{"feed_url": "https://example.com/feed.json"}"#).unwrap();
        assert!(!is_json_feed(&only_feed_url));
    }

    #[test]
    fn test_parse_rss() {
        let resp = response_with_body(RSS_SAMPLE, "application/rss+xml");
        let feed = parse_xml_feed(&resp, now()).unwrap();

        assert_eq!(feed.format, FeedFormat::Rss);
        assert_eq!(feed.version, "rss20");
        assert_eq!(feed.title, "Example Blog");
        assert_eq!(feed.description, "An example blog");
        assert_eq!(feed.item_count, 2);
        assert_eq!(feed.bozo, 0);
        assert_eq!(
            feed.site_url.as_ref().map(|u| u.as_str()),
            Some("https://example.com/")
        );
        assert_eq!(
            feed.last_updated,
            Some(parse_date("2024-06-03T00:00:00Z").unwrap())
        );
        assert!(feed.velocity > 0.0);
    }

    #[test]
    fn test_parse_atom_with_hub() {
        let resp = response_with_body(ATOM_SAMPLE, "application/atom+xml");
        let feed = parse_xml_feed(&resp, now()).unwrap();

        assert_eq!(feed.format, FeedFormat::Atom);
        assert!(feed.version.starts_with("atom"));
        assert_eq!(feed.title, "Atom Example");
        assert_eq!(feed.hubs, vec!["https://hub.example.com/".to_string()]);
        assert_eq!(
            feed.self_url.as_ref().map(|u| u.as_str()),
            Some("https://example.com/feed.atom")
        );
        assert!(feed.is_push);
    }

    #[test]
    fn test_parse_malformed_feed_recovers_bozo() {
        let broken = "<rss version=\"2.0\"><channel><title>Broken Feed</title><item></chan";
        let resp = response_with_body(broken, "application/rss+xml");
        let feed = parse_xml_feed(&resp, now()).unwrap();

        assert_eq!(feed.bozo, 1);
        assert_eq!(feed.title, "Broken Feed");
        assert_eq!(feed.item_count, 0);
    }

    #[test]
    fn test_parse_html_is_not_a_feed() {
        let resp = response_with_body("<html><head><title>Page</title></head></html>", "text/html");
        assert!(parse_xml_feed(&resp, now()).is_none());
    }

    #[test]
    fn test_parse_json_feed() {
        let resp = response_with_body(JSON_FEED_SAMPLE, "application/feed+json");
        let feed = parse_json_feed(&resp, now()).unwrap();

        assert_eq!(feed.format, FeedFormat::Json);
        assert_eq!(feed.version, "json11");
        assert_eq!(feed.title, "JSON Example");
        assert_eq!(feed.item_count, 2);
        assert_eq!(
            feed.site_url.as_ref().map(|u| u.as_str()),
            Some("https://example.com/")
        );
        assert_eq!(
            feed.last_updated,
            Some(parse_date("2024-06-03T00:00:00Z").unwrap())
        );
    }

    #[test]
    fn test_parse_json_feed_rejects_empty_items() {
        let body = r#"{"version": "https://jsonfeed.org/version/1", "items": []}"#;
        let resp = response_with_body(body, "application/json");
        assert!(parse_json_feed(&resp, now()).is_none());
    }

    #[test]
    fn test_json_version_tag() {
        assert_eq!(json_version_tag("https://jsonfeed.org/version/1.1"), "json11");
        assert_eq!(json_version_tag("https://jsonfeed.org/version/1"), "json1");
        assert_eq!(json_version_tag(""), "json");
    }

    #[test]
    fn test_future_entries_excluded() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title>
<item><guid>1</guid><pubDate>Mon, 03 Jun 2024 00:00:00 GMT</pubDate></item>
<item><guid>2</guid><pubDate>Fri, 03 Jun 2033 00:00:00 GMT</pubDate></item>
</channel></rss>"#;
        let resp = response_with_body(rss, "application/rss+xml");
        let feed = parse_xml_feed(&resp, now()).unwrap();

        assert_eq!(
            feed.last_updated,
            Some(parse_date("2024-06-03T00:00:00Z").unwrap())
        );
    }

    #[test]
    fn test_podcast_detection_itunes() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd">
<channel><title>Pod</title><item><guid>1</guid></item></channel></rss>"#;
        let resp = response_with_body(rss, "application/rss+xml");
        let feed = parse_xml_feed(&resp, now()).unwrap();
        assert!(feed.is_podcast);
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("  Plain  "), "Plain");
        assert_eq!(clean_title("<b>Bold</b> title"), "Bold title");
        assert_eq!(clean_title("Evil\x1b[31m Feed"), "Evil[31m Feed");

        let long = "x".repeat(2000);
        let cleaned = clean_title(&long);
        assert!(cleaned.len() <= MAX_TITLE_LEN);
        assert!(cleaned.ends_with("..."));
    }

    #[test]
    fn test_header_links() {
        let mut resp = response_with_body("", "");
        resp.headers.insert(
            "link".to_string(),
            "<https://hub.example.com/>; rel=\"hub\", <https://example.com/feed>; rel=\"self\""
                .to_string(),
        );

        let (hubs, self_url) = header_links(&resp);
        assert_eq!(hubs, vec!["https://hub.example.com/".to_string()]);
        assert_eq!(
            self_url.map(|u| u.as_str().to_string()),
            Some("https://example.com/feed".to_string())
        );
    }

    #[test]
    fn test_header_links_absent() {
        let resp = response_with_body("", "");
        let (hubs, self_url) = header_links(&resp);
        assert!(hubs.is_empty());
        assert!(self_url.is_none());
    }
}
