//! Site metadata extraction
//!
//! From a site's origin page: the site name (OpenGraph tags before the
//! `<title>`), description, canonical site URL, and candidate favicons.
//! Favicon bytes fetched later are converted to `data:` URIs when they pass
//! the PNG/ICO magic check.

use base64::Engine;
use scraper::{Html, Selector};
use url::Url;

use crate::crawler::parser::html_prefix;
use crate::crawler::response::Response;
use crate::feed::feed_info::{Favicon, SiteMeta};
use crate::url::remove_www;

/// Favicon bytes above this size are dropped silently.
pub const MAX_FAVICON_BYTES: usize = 100 * 1024;

const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const ICO_MAGIC: [u8; 4] = [0x00, 0x00, 0x01, 0x00];

/// Extracts site metadata from an origin page response.
///
/// Returns the metadata and the favicons worth fetching, ordered by
/// preference.
pub fn parse_site_meta(response: &Response) -> Option<(SiteMeta, Vec<Favicon>)> {
    let text = response.text.as_deref()?;
    let document = Html::parse_document(html_prefix(text));

    let origin = crate::url::origin_root(&response.url).ok()?;
    let site_url = find_site_url(&document).unwrap_or_else(|| origin.clone());
    let host = remove_www(site_url.host_str().unwrap_or_default()).to_string();

    let favicons = find_favicons(&document, &response.url, &host);

    let meta = SiteMeta {
        origin,
        site_url,
        site_name: find_site_name(&document),
        site_title: find_description(&document),
        favicon: favicons.first().map(|icon| icon.url.clone()),
        host,
    };

    Some((meta, favicons))
}

/// Canonical site URL from `rel=canonical` or `og:url`, coerced to its
/// origin root.
fn find_site_url(document: &Html) -> Option<Url> {
    let candidate = select_attr(document, "link[rel=\"canonical\"]", "href")
        .or_else(|| select_attr(document, "meta[property=\"og:url\"]", "content"))?;

    let url = Url::parse(candidate.trim()).ok()?;
    crate::url::origin_root(&url).ok()
}

/// Site name, preferring structured metadata over the page title.
fn find_site_name(document: &Html) -> String {
    for selector in [
        "meta[property=\"og:site_name\"]",
        "meta[property=\"og:title\"]",
        "meta[name=\"application-name\"]",
    ] {
        if let Some(content) = select_attr(document, selector, "content") {
            let trimmed = content.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }

    if let Ok(title) = Selector::parse("title") {
        if let Some(element) = document.select(&title).next() {
            return element.text().collect::<String>().trim().to_string();
        }
    }

    String::new()
}

fn find_description(document: &Html) -> String {
    select_attr(document, "meta[name=\"description\"]", "content")
        .map(|d| d.trim().to_string())
        .unwrap_or_default()
}

/// Declared icons plus the conventional `/favicon.ico` fallback, sorted by
/// preference.
fn find_favicons(document: &Html, page_url: &Url, host: &str) -> Vec<Favicon> {
    let mut favicons = Vec::new();

    if let Ok(selector) = Selector::parse("link[rel][href]") {
        for element in document.select(&selector) {
            let rel = element.value().attr("rel").unwrap_or_default().to_lowercase();
            let priority = match rel.as_str() {
                "shortcut icon" => 1,
                "icon" => 2,
                _ => continue,
            };

            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let Ok(url) = page_url.join(href.trim()) else {
                continue;
            };
            favicons.push(Favicon {
                url,
                site_host: host.to_string(),
                priority,
                data_uri: String::new(),
            });
        }
    }

    if let Ok(fallback) = page_url.join("/favicon.ico") {
        favicons.push(Favicon {
            url: fallback,
            site_host: host.to_string(),
            priority: 3,
            data_uri: String::new(),
        });
    }

    favicons.sort_by_key(|icon| icon.priority);
    favicons
}

/// Converts fetched favicon bytes to a `data:` URI.
///
/// Only PNG and ICO payloads within the size cap are accepted; anything
/// else returns `None` and the icon is kept as a plain URL.
pub fn favicon_data_uri(bytes: &[u8]) -> Option<String> {
    if bytes.len() > MAX_FAVICON_BYTES {
        tracing::debug!(size = bytes.len(), "favicon over size cap");
        return None;
    }

    let mime = if bytes.len() >= PNG_MAGIC.len() && bytes[..PNG_MAGIC.len()] == PNG_MAGIC {
        "image/png"
    } else if bytes.len() >= ICO_MAGIC.len() && bytes[..ICO_MAGIC.len()] == ICO_MAGIC {
        "image/x-icon"
    } else {
        return None;
    };

    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Some(format!("data:{mime};base64,{encoded}"))
}

fn select_attr(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|element| element.value().attr(attr))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::request::Method;
    use std::time::Duration;

    fn origin_response(html: &str) -> Response {
        let url = Url::parse("https://example.com/").unwrap();
        let mut resp = Response::failure(
            url.clone(),
            Method::Get,
            200,
            None,
            vec![url],
            Duration::ZERO,
        );
        resp.text = Some(html.to_string());
        resp.body = html.as_bytes().to_vec();
        resp
    }

    const FULL_PAGE: &str = r#"<html><head>
        <title>Fallback Title</title>
        <meta property="og:site_name" content="Example Site">
        <meta name="description" content="A site about examples">
        <link rel="canonical" href="https://example.com/home">
        <link rel="icon" href="/static/icon.png">
        <link rel="shortcut icon" href="/fav.ico">
    </head><body></body></html>"#;

    #[test]
    fn test_site_name_prefers_og() {
        let resp = origin_response(FULL_PAGE);
        let (meta, _) = parse_site_meta(&resp).unwrap();
        assert_eq!(meta.site_name, "Example Site");
        assert_eq!(meta.site_title, "A site about examples");
    }

    #[test]
    fn test_site_name_title_fallback() {
        let resp = origin_response("<html><head><title>Just a Title</title></head></html>");
        let (meta, _) = parse_site_meta(&resp).unwrap();
        assert_eq!(meta.site_name, "Just a Title");
    }

    #[test]
    fn test_canonical_coerced_to_origin() {
        let resp = origin_response(FULL_PAGE);
        let (meta, _) = parse_site_meta(&resp).unwrap();
        assert_eq!(meta.site_url.as_str(), "https://example.com/");
        assert_eq!(meta.host, "example.com");
    }

    #[test]
    fn test_favicons_ordered_by_preference() {
        let resp = origin_response(FULL_PAGE);
        let (_, favicons) = parse_site_meta(&resp).unwrap();

        assert_eq!(favicons.len(), 3);
        assert_eq!(favicons[0].url.path(), "/fav.ico");
        assert_eq!(favicons[1].url.path(), "/static/icon.png");
        assert_eq!(favicons[2].url.path(), "/favicon.ico");
    }

    #[test]
    fn test_fallback_favicon_always_present() {
        let resp = origin_response("<html><head></head><body></body></html>");
        let (_, favicons) = parse_site_meta(&resp).unwrap();
        assert_eq!(favicons.len(), 1);
        assert_eq!(favicons[0].url.path(), "/favicon.ico");
    }

    #[test]
    fn test_no_text_yields_none() {
        let url = Url::parse("https://example.com/").unwrap();
        let resp = Response::failure(url, Method::Get, 200, None, Vec::new(), Duration::ZERO);
        assert!(parse_site_meta(&resp).is_none());
    }

    #[test]
    fn test_favicon_data_uri_png() {
        let mut bytes = PNG_MAGIC.to_vec();
        bytes.extend_from_slice(&[1, 2, 3]);
        let uri = favicon_data_uri(&bytes).unwrap();
        assert!(uri.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_favicon_data_uri_ico() {
        let mut bytes = ICO_MAGIC.to_vec();
        bytes.extend_from_slice(&[1, 2, 3]);
        let uri = favicon_data_uri(&bytes).unwrap();
        assert!(uri.starts_with("data:image/x-icon;base64,"));
    }

    #[test]
    fn test_favicon_data_uri_rejects_other_formats() {
        assert!(favicon_data_uri(b"GIF89a....").is_none());
        assert!(favicon_data_uri(b"").is_none());
    }

    #[test]
    fn test_favicon_data_uri_rejects_oversize() {
        let mut bytes = PNG_MAGIC.to_vec();
        bytes.extend(std::iter::repeat(0u8).take(MAX_FAVICON_BYTES + 1));
        assert!(favicon_data_uri(&bytes).is_none());
    }
}
