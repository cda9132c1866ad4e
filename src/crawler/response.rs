//! HTTP response record and transport-error classification

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::crawler::request::Method;

/// Classification of a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DnsFailure,
    SslError,
    ConnectionError,
    HttpError,
    Timeout,
    InvalidUrl,
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::DnsFailure => "dns_failure",
            ErrorKind::SslError => "ssl_error",
            ErrorKind::ConnectionError => "connection_error",
            ErrorKind::HttpError => "http_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidUrl => "invalid_url",
            ErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

impl ErrorKind {
    /// Human-readable message for root-error reporting.
    pub fn message(&self) -> &'static str {
        match self {
            ErrorKind::DnsFailure => "Domain name resolution failed (DNS error)",
            ErrorKind::SslError => "SSL/TLS certificate verification failed",
            ErrorKind::ConnectionError => "Connection to server failed",
            ErrorKind::HttpError => "Request failed with an HTTP error status",
            ErrorKind::Timeout => "Request timed out",
            ErrorKind::InvalidUrl => "URL could not be parsed",
            ErrorKind::Other => "Request failed",
        }
    }
}

/// The outcome of one fetch.
///
/// Always produced, never an `Err`: transport failures yield a response with
/// `status = -1` and a classified [`ErrorKind`].
#[derive(Debug, Clone)]
pub struct Response {
    /// URL the request was issued for
    pub request_url: Url,
    /// Final URL after redirects
    pub url: Url,
    /// HTTP method used
    pub method: Method,
    /// HTTP status code, or -1 on transport failure
    pub status: i32,
    /// Response headers, keys lowercased
    pub headers: HashMap<String, String>,
    /// Decoded text body, when the content type permits
    pub text: Option<String>,
    /// Parsed JSON body, when the content type is JSON and the body parses
    pub json: Option<serde_json::Value>,
    /// Raw body bytes
    pub body: Vec<u8>,
    /// Intermediate URLs visited via redirects (includes the final URL)
    pub history: Vec<Url>,
    /// Failure classification, `None` on success
    pub error_kind: Option<ErrorKind>,
    /// Wall-clock time spent on the fetch
    pub elapsed: Duration,
}

impl Response {
    /// Builds a failed response with no body.
    pub fn failure(
        request_url: Url,
        method: Method,
        status: i32,
        error_kind: Option<ErrorKind>,
        history: Vec<Url>,
        elapsed: Duration,
    ) -> Self {
        Self {
            url: request_url.clone(),
            request_url,
            method,
            status,
            headers: HashMap::new(),
            text: None,
            json: None,
            body: Vec::new(),
            history,
            error_kind,
            elapsed,
        }
    }

    /// True when the status is a 2xx.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Lowercased header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Content-Type header without parameters, lowercased.
    pub fn content_type(&self) -> String {
        self.header("content-type")
            .unwrap_or_default()
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase()
    }

    /// Number of body bytes read.
    pub fn content_length(&self) -> u64 {
        self.body.len() as u64
    }

    /// Origin of the final URL (`scheme://host[:port]`).
    pub fn origin(&self) -> String {
        crate::url::origin_of(&self.url)
    }

    /// True when the final URL is a site origin root (path `/`, no query).
    pub fn is_origin_root(&self) -> bool {
        self.url.path() == "/" && self.url.query().is_none()
    }
}

/// Classifies a reqwest transport error into the crawl error taxonomy.
///
/// reqwest does not expose DNS or TLS failures as variants, so the source
/// chain is inspected. Deadline expiry maps to `Timeout`, name resolution to
/// `DnsFailure`, certificate problems to `SslError`, and everything else at
/// the transport layer to `ConnectionError`.
pub fn classify_transport_error(err: &reqwest::Error) -> ErrorKind {
    if err.is_timeout() {
        return ErrorKind::Timeout;
    }

    let mut text = err.to_string().to_lowercase();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string().to_lowercase());
        source = cause.source();
    }

    if text.contains("dns")
        || text.contains("failed to lookup")
        || text.contains("name or service not known")
        || text.contains("nodename nor servname")
    {
        ErrorKind::DnsFailure
    } else if text.contains("certificate")
        || text.contains("tls")
        || text.contains("ssl")
        || text.contains("handshake")
    {
        ErrorKind::SslError
    } else {
        ErrorKind::ConnectionError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_response(status: i32) -> Response {
        let url = Url::parse("https://example.com/feed").unwrap();
        Response::failure(url, Method::Get, status, None, Vec::new(), Duration::ZERO)
    }

    #[test]
    fn test_ok_range() {
        assert!(make_response(200).ok());
        assert!(make_response(204).ok());
        assert!(make_response(299).ok());
        assert!(!make_response(301).ok());
        assert!(!make_response(404).ok());
        assert!(!make_response(-1).ok());
    }

    #[test]
    fn test_content_type_strips_parameters() {
        let mut resp = make_response(200);
        resp.headers.insert(
            "content-type".to_string(),
            "application/rss+xml; charset=UTF-8".to_string(),
        );
        assert_eq!(resp.content_type(), "application/rss+xml");
    }

    #[test]
    fn test_content_type_missing() {
        let resp = make_response(200);
        assert_eq!(resp.content_type(), "");
    }

    #[test]
    fn test_is_origin_root() {
        let mut resp = make_response(200);
        resp.url = Url::parse("https://example.com/").unwrap();
        assert!(resp.is_origin_root());

        resp.url = Url::parse("https://example.com/blog").unwrap();
        assert!(!resp.is_origin_root());

        resp.url = Url::parse("https://example.com/?page=2").unwrap();
        assert!(!resp.is_origin_root());
    }

    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::DnsFailure).unwrap();
        assert_eq!(json, "\"dns_failure\"");

        let kind: ErrorKind = serde_json::from_str("\"ssl_error\"").unwrap();
        assert_eq!(kind, ErrorKind::SslError);
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::ConnectionError.to_string(), "connection_error");
        assert_eq!(ErrorKind::InvalidUrl.to_string(), "invalid_url");
    }
}
