//! Upstream request execution.
//!
//! [`Executor`] is the seam between the cache and the network: the caching
//! transport only ever talks to an executor, and [`ReqwestExecutor`] is the
//! real one.
//!
//! ### Captured response
//! - Protocol version, status code and reason phrase
//! - Every header line, duplicates included
//! - The full body, already decoded from gzip/brotli/deflate

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode, Version};
use hyper::ext::ReasonPhrase;
use reqwest::Client;
use std::time::{Duration, Instant};
use url::Url;

use httpstash_core::cache::{CachedResponse, HeaderLine};
use httpstash_core::{AppConfig, Error};

/// Configuration for the reqwest executor.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "httpstash/0.1")
    pub user_agent: String,

    /// Request timeout (default: 60s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 10)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { user_agent: "httpstash/0.1".to_string(), timeout: Duration::from_secs(60), max_redirects: 10 }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self { user_agent: config.user_agent.clone(), timeout: config.timeout(), max_redirects: config.max_redirects }
    }
}

/// An outbound request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl FetchRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url, headers: HeaderMap::new(), body: None }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn head(url: Url) -> Self {
        Self::new(Method::HEAD, url)
    }

    /// Add a header. Invalid names or values are rejected as `Error::InvalidInput`.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, Error> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::InvalidInput(format!("invalid header name '{name}'")))?;
        let value =
            HeaderValue::from_str(value).map_err(|_| Error::InvalidInput(format!("invalid value for header {name}")))?;
        self.headers.append(name, value);
        Ok(self)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Parse user-supplied URL text into an absolute http(s) URL.
///
/// Leading/trailing whitespace is trimmed and the fragment dropped. The host
/// must be present.
pub fn parse_url(input: &str) -> Result<Url, Error> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidUrl("empty URL".into()));
    }

    let mut url = Url::parse(trimmed).map_err(|e| Error::InvalidUrl(format!("{trimmed}: {e}")))?;
    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(Error::InvalidUrl(format!("unsupported scheme: {scheme}"))),
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::InvalidUrl(format!("{trimmed}: missing host")));
    }
    url.set_fragment(None);

    Ok(url)
}

/// Performs requests that missed the cache.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Execute `request` and return the complete response.
    ///
    /// Any status code is a successful execution; only failures to obtain a
    /// response are errors.
    async fn execute(&self, request: FetchRequest) -> Result<CachedResponse, Error>;
}

/// Executor backed by a `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestExecutor {
    http: Client,
}

impl ReqwestExecutor {
    /// Create a new executor with the given configuration.
    pub fn new(config: &FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::HttpError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http })
    }

    /// Wrap an existing client.
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Executor for ReqwestExecutor {
    async fn execute(&self, request: FetchRequest) -> Result<CachedResponse, Error> {
        let start = Instant::now();
        let url = request.url.clone();

        let mut builder = self.http.request(request.method, request.url).headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;

        let version = version_token(response.version()).to_string();
        let status = response.status();
        let reason = reason_phrase(status, response.extensions().get::<ReasonPhrase>());
        let headers: Vec<HeaderLine> = response
            .headers()
            .iter()
            .map(|(name, value)| HeaderLine::new(name.as_str(), String::from_utf8_lossy(value.as_bytes())))
            .collect();

        let body = response.bytes().await.map_err(map_reqwest_error)?;

        tracing::debug!(
            "fetched {} -> {} in {}ms ({} bytes)",
            url,
            status.as_u16(),
            start.elapsed().as_millis(),
            body.len()
        );

        Ok(CachedResponse {
            version,
            status,
            reason,
            headers,
            body,
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> Error {
    if err.is_timeout() { Error::FetchTimeout(err.to_string()) } else { Error::HttpError(format!("network error: {err}")) }
}

/// Reason phrase as sent upstream, falling back to the canonical one.
///
/// hyper only records the phrase when it differs from the canonical reason.
fn reason_phrase(status: StatusCode, received: Option<&ReasonPhrase>) -> String {
    match received {
        Some(phrase) => String::from_utf8_lossy(phrase.as_bytes()).into_owned(),
        None => status.canonical_reason().unwrap_or_default().to_string(),
    }
}

/// Status-line protocol token for a response version.
fn version_token(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}
