use crate::UrlError;
use url::Url;

/// Query keys that may select a feed variant and therefore must survive
/// dedupe-key stripping. Wikipedia-style sites differentiate their feeds
/// only by query string.
const FEED_QUERY_KEYS: &[&str] = &[
    "feed",
    "rss",
    "atom",
    "jsonfeed",
    "feedformat",
    "format",
    "podcast",
];

/// Normalizes a user-supplied seed URL.
///
/// # Normalization Steps
///
/// 1. Trim whitespace; prefix `https://` when no scheme is present
/// 2. Parse; reject if malformed
/// 3. Reject non-HTTP(S) schemes
/// 4. Reject hosts without a dot (except `localhost` and IP literals)
/// 5. Strip the fragment
///
/// The `url` crate lowercases the scheme and host during parsing.
///
/// # Examples
///
/// ```
/// use feedscout::url::normalize_seed;
///
/// let url = normalize_seed("Example.COM/blog").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/blog");
/// ```
pub fn normalize_seed(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Parse("empty URL".to_string()));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        format!("https://{trimmed}")
    };

    let mut url = Url::parse(&with_scheme).map_err(|e| UrlError::Parse(e.to_string()))?;
    validate(&url)?;
    url.set_fragment(None);
    Ok(url)
}

/// Normalizes an href discovered in a document.
///
/// Absolute hrefs are parsed directly; relative hrefs are resolved against
/// `base`. Protocol-relative hrefs (`//host/path`) inherit the base scheme.
/// The fragment is always stripped.
pub fn normalize_href(href: &str, base: &Url) -> Result<Url, UrlError> {
    let trimmed = href.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Err(UrlError::Parse("fragment-only href".to_string()));
    }

    let mut url = base
        .join(trimmed)
        .map_err(|e| UrlError::Parse(e.to_string()))?;
    validate(&url)?;
    url.set_fragment(None);
    Ok(url)
}

fn validate(url: &Url) -> Result<(), UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    let host = url.host_str().ok_or(UrlError::MissingHost)?;
    if !host.contains('.') && host != "localhost" {
        return Err(UrlError::InvalidHost(host.to_string()));
    }

    Ok(())
}

/// Returns the duplicate-filter key for a URL.
///
/// The query string is stripped unless one of its keys looks feed-selecting,
/// so `?page=2` variants collapse while `?feed=atom` variants stay distinct.
pub fn dedupe_key(url: &Url) -> String {
    let keep_query = url
        .query_pairs()
        .any(|(key, _)| FEED_QUERY_KEYS.contains(&key.to_lowercase().as_str()));

    if keep_query {
        return url.as_str().to_string();
    }

    let mut stripped = url.clone();
    stripped.set_query(None);
    stripped.as_str().to_string()
}

/// Returns the origin string of a URL: `scheme://host[:port]`.
pub fn origin_of(url: &Url) -> String {
    url.origin().ascii_serialization()
}

/// Returns the origin of a URL as a root URL (`scheme://host[:port]/`).
pub fn origin_root(url: &Url) -> Result<Url, UrlError> {
    Url::parse(&format!("{}/", origin_of(url))).map_err(|e| UrlError::Parse(e.to_string()))
}

/// Removes a leading `www.` from a host string.
pub fn remove_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}
