//! HTTP downloader
//!
//! Executes one crawl request: applies the per-request deadline, follows
//! redirects manually (recording history and logging HTTPS downgrades),
//! gates on Content-Type before reading the body, enforces the body size
//! cap with a streamed read, decodes the body with the declared charset, and
//! classifies transport failures. Always returns a [`Response`]; failures
//! are data, not errors.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use url::Url;

use crate::config::SearchConfig;
use crate::crawler::middleware::content_type_allowed;
use crate::crawler::request::{Callback, Method, Request};
use crate::crawler::response::{classify_transport_error, ErrorKind, Response};

const MAX_REDIRECTS: usize = 10;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Downloader {
    client: reqwest::Client,
    request_timeout: Duration,
    max_content_length: u64,
}

impl Downloader {
    /// Builds the shared HTTP client. The connection pool is sized to the
    /// worker count; redirects are followed manually in [`fetch`].
    pub fn build(config: &SearchConfig) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Upgrade-Insecure-Requests",
            HeaderValue::from_static("1"),
        );
        for (name, value) in &config.headers {
            let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
                tracing::warn!(header = %name, "skipping invalid header name");
                continue;
            };
            let Ok(value) = HeaderValue::from_str(value) else {
                tracing::warn!(header = %name, "skipping invalid header value");
                continue;
            };
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .redirect(Policy::none())
            .gzip(true)
            .brotli(true)
            .cookie_store(true)
            .pool_max_idle_per_host(config.concurrency.max(1))
            .build()?;

        Ok(Self {
            client,
            request_timeout: config.request_timeout,
            max_content_length: config.max_content_length,
        })
    }

    /// Fetches one request within the per-request deadline.
    pub async fn fetch(&self, request: &Request) -> Response {
        let started = Instant::now();
        match tokio::time::timeout(self.request_timeout, self.fetch_inner(request, started)).await
        {
            Ok(response) => response,
            Err(_) => {
                tracing::debug!(url = %request.url, "request timed out");
                Response::failure(
                    request.url.clone(),
                    request.method,
                    -1,
                    Some(ErrorKind::Timeout),
                    vec![request.url.clone()],
                    started.elapsed(),
                )
            }
        }
    }

    async fn fetch_inner(&self, request: &Request, started: Instant) -> Response {
        let cap = request.max_content_length.unwrap_or(self.max_content_length);
        let mut current = request.url.clone();
        let mut history: Vec<Url> = vec![current.clone()];

        for _hop in 0..=MAX_REDIRECTS {
            let method = match request.method {
                Method::Get => reqwest::Method::GET,
                Method::Head => reqwest::Method::HEAD,
            };
            let mut builder = self.client.request(method, current.as_str());
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }

            let resp = match builder.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    let kind = classify_transport_error(&e);
                    tracing::debug!(url = %current, error = %e, kind = %kind, "fetch failed");
                    return Response::failure(
                        request.url.clone(),
                        request.method,
                        -1,
                        Some(kind),
                        history,
                        started.elapsed(),
                    );
                }
            };

            let status = resp.status();

            if status.is_redirection() {
                let location = resp
                    .headers()
                    .get("location")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let Some(location) = location else {
                    let mut response = Response::failure(
                        request.url.clone(),
                        request.method,
                        status.as_u16() as i32,
                        Some(ErrorKind::HttpError),
                        history,
                        started.elapsed(),
                    );
                    response.url = current;
                    return response;
                };

                let Ok(next) = current.join(&location) else {
                    let mut response = Response::failure(
                        request.url.clone(),
                        request.method,
                        status.as_u16() as i32,
                        Some(ErrorKind::InvalidUrl),
                        history,
                        started.elapsed(),
                    );
                    response.url = current;
                    return response;
                };

                if current.scheme() == "https" && next.scheme() == "http" {
                    tracing::warn!(from = %current, to = %next, "redirect downgrades HTTPS to HTTP");
                }

                // The cap counts hops taken; landing here on the last
                // iteration means the chain is too long.
                if history.len() > MAX_REDIRECTS {
                    tracing::debug!(url = %request.url, "redirect chain too long");
                    let mut response = Response::failure(
                        request.url.clone(),
                        request.method,
                        status.as_u16() as i32,
                        Some(ErrorKind::HttpError),
                        history,
                        started.elapsed(),
                    );
                    response.url = current;
                    return response;
                }

                history.push(next.clone());
                current = next;
                continue;
            }

            return self
                .read_response(request, resp, current, history, cap, started)
                .await;
        }

        // Unreachable: the loop always returns. Kept for totality.
        Response::failure(
            request.url.clone(),
            request.method,
            -1,
            Some(ErrorKind::Other),
            history,
            started.elapsed(),
        )
    }

    async fn read_response(
        &self,
        request: &Request,
        resp: reqwest::Response,
        final_url: Url,
        history: Vec<Url>,
        cap: u64,
        started: Instant,
    ) -> Response {
        let status = resp.status().as_u16() as i32;

        let mut headers: HashMap<String, String> = HashMap::new();
        for (name, value) in resp.headers() {
            headers.insert(
                name.as_str().to_lowercase(),
                String::from_utf8_lossy(value.as_bytes()).to_string(),
            );
        }

        let content_type_header = headers.get("content-type").cloned().unwrap_or_default();
        let bare_type = content_type_header
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();

        // Gate before the body read; this is the primary defense against
        // downloading binaries. Favicon fetches are exempt since images are
        // the point of them.
        if request.callback != Callback::ParseFavicon && !content_type_allowed(&bare_type) {
            tracing::debug!(url = %final_url, content_type = %bare_type, "gated content type");
            let mut response = Response::failure(
                request.url.clone(),
                request.method,
                415,
                Some(ErrorKind::HttpError),
                history,
                started.elapsed(),
            );
            response.url = final_url;
            response.headers = headers;
            return response;
        }

        if let Some(declared) = headers
            .get("content-length")
            .and_then(|v| v.parse::<u64>().ok())
        {
            if declared > cap {
                tracing::debug!(url = %final_url, declared, cap, "declared content length over cap");
                let mut response = Response::failure(
                    request.url.clone(),
                    request.method,
                    413,
                    None,
                    history,
                    started.elapsed(),
                );
                response.url = final_url;
                response.headers = headers;
                return response;
            }
        }

        let mut body: Vec<u8> = Vec::new();
        if request.method == Method::Get {
            let mut stream = resp.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let kind = if e.is_timeout() {
                            ErrorKind::Timeout
                        } else {
                            ErrorKind::ConnectionError
                        };
                        tracing::debug!(url = %final_url, error = %e, "body read failed");
                        let mut response = Response::failure(
                            request.url.clone(),
                            request.method,
                            -1,
                            Some(kind),
                            history,
                            started.elapsed(),
                        );
                        response.url = final_url;
                        response.headers = headers;
                        return response;
                    }
                };

                if body.len() as u64 + chunk.len() as u64 > cap {
                    tracing::debug!(url = %final_url, cap, "body exceeded content length cap");
                    let mut response = Response::failure(
                        request.url.clone(),
                        request.method,
                        413,
                        None,
                        history,
                        started.elapsed(),
                    );
                    response.url = final_url;
                    response.headers = headers;
                    return response;
                }
                body.extend_from_slice(&chunk);
            }
        }

        let is_textual = request.callback != Callback::ParseFavicon;
        let text = if is_textual && !body.is_empty() {
            Some(decode_body(&body, &content_type_header))
        } else {
            None
        };

        let json = if bare_type.contains("json") {
            text.as_deref()
                .and_then(|t| serde_json::from_str::<serde_json::Value>(t.trim()).ok())
        } else {
            None
        };

        let error_kind = if status >= 400 {
            Some(ErrorKind::HttpError)
        } else {
            None
        };

        Response {
            request_url: request.url.clone(),
            url: final_url,
            method: request.method,
            status,
            headers,
            text,
            json,
            body,
            history,
            error_kind,
            elapsed: started.elapsed(),
        }
    }
}

/// Decodes body bytes using the charset declared in the Content-Type header,
/// trying UTF-8 then Latin-1 when no charset is declared or recognized.
fn decode_body(body: &[u8], content_type_header: &str) -> String {
    let declared = content_type_header
        .split(';')
        .filter_map(|part| part.trim().strip_prefix("charset="))
        .next()
        .map(|cs| cs.trim_matches('"').trim());

    if let Some(label) = declared {
        if let Some(encoding) = encoding_rs::Encoding::for_label(label.as_bytes()) {
            let (text, _, _) = encoding.decode(body);
            return text.into_owned();
        }
    }

    match std::str::from_utf8(body) {
        Ok(text) => text.to_string(),
        // Latin-1: every byte maps to the code point of the same value.
        Err(_) => body.iter().map(|&b| b as char).collect(),
    }
}
