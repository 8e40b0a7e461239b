//! http_fetch tool implementation.
//!
//! Sends one request through the caching transport and reports the response
//! along with what the cache did with it.

use std::collections::BTreeMap;

use http::Method;
use httpstash_client::{CacheOutcome, CachingTransport, Executor, FetchRequest, parse_url};
use httpstash_core::Error;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Body text returned when `max_body_bytes` is not given.
const DEFAULT_MAX_BODY_BYTES: usize = 256 * 1024;

/// Parameters for the http_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HttpFetchParams {
    /// Absolute http(s) URL to fetch.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default)]
    pub method: Option<String>,

    /// Extra request headers.
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,

    /// Request body, sent as-is.
    #[serde(default)]
    pub body: Option<String>,

    /// Maximum number of body bytes to include in the output (default: 262144).
    #[serde(default)]
    pub max_body_bytes: Option<usize>,
}

/// A single response header.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HeaderEntry {
    pub name: String,
    pub value: String,
}

/// Output structure for the http_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HttpFetchOutput {
    /// The URL as requested, normalized.
    pub url: String,
    pub method: String,
    pub status: u16,
    pub reason: String,
    /// One of `hit`, `stored`, `skipped`, `bypassed`, `persist_failed`.
    pub cache: String,
    /// Cache file backing the response, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Why the response could not be written to the cache.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persist_error: Option<String>,
    pub headers: Vec<HeaderEntry>,
    /// Body decoded as UTF-8 (lossy), cut at `max_body_bytes`.
    pub body: String,
    /// Full body length in bytes.
    pub body_bytes: usize,
    pub truncated: bool,
}

fn parse_method(method: Option<&str>) -> Result<Method, Error> {
    match method.map(str::trim) {
        None | Some("") => Ok(Method::GET),
        Some(m) => Method::from_bytes(m.to_ascii_uppercase().as_bytes())
            .map_err(|_| Error::InvalidInput(format!("invalid HTTP method '{m}'"))),
    }
}

/// Implementation of the http_fetch tool.
pub async fn fetch_impl<E: Executor>(
    transport: &CachingTransport<E>, params: HttpFetchParams,
) -> Result<CallToolResult, McpError> {
    let url = parse_url(&params.url)?;
    let method = parse_method(params.method.as_deref())?;
    let max_body_bytes = params.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES);

    let mut request = FetchRequest::new(method.clone(), url.clone());
    for (name, value) in params.headers.unwrap_or_default() {
        request = request.with_header(&name, &value)?;
    }
    if let Some(body) = params.body {
        request = request.with_body(body);
    }

    let fetched = transport.fetch(request).await?;

    let (path, persist_error) = match &fetched.outcome {
        CacheOutcome::Stored(path) => (Some(path.display().to_string()), None),
        CacheOutcome::Hit => {
            (fetched.key.as_ref().map(|key| transport.store().path_for(key).display().to_string()), None)
        }
        CacheOutcome::PersistFailed(err) => {
            tracing::warn!(url = %url, error = %err, "response returned without being cached");
            (None, Some(err.to_string()))
        }
        CacheOutcome::Bypassed | CacheOutcome::Skipped => (None, None),
    };

    let response = &fetched.response;
    let body_bytes = response.body.len();
    let shown = &response.body[..body_bytes.min(max_body_bytes)];

    let output = HttpFetchOutput {
        url: url.to_string(),
        method: method.to_string(),
        status: response.status.as_u16(),
        reason: response.reason.clone(),
        cache: fetched.outcome.as_str().to_string(),
        path,
        persist_error,
        headers: response
            .headers
            .iter()
            .map(|h| HeaderEntry { name: h.name.clone(), value: h.value.clone() })
            .collect(),
        body: String::from_utf8_lossy(shown).into_owned(),
        body_bytes,
        truncated: body_bytes > max_body_bytes,
    };

    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use http::StatusCode;
    use httpstash_core::{CacheStore, CachedResponse};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct StubExecutor {
        status: StatusCode,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Executor for StubExecutor {
        async fn execute(&self, request: FetchRequest) -> Result<CachedResponse, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let body = format!("{} {}", request.method, request.url.path());
            Ok(CachedResponse::new(self.status)
                .with_header("Content-Type", "text/plain")
                .with_header("Content-Length", body.len().to_string())
                .with_body(body))
        }
    }

    fn transport(dir: &TempDir, status: StatusCode) -> CachingTransport<StubExecutor> {
        let executor = StubExecutor { status, calls: AtomicUsize::new(0) };
        CachingTransport::new(executor, CacheStore::new(dir.path(), Some(Duration::from_secs(60))))
    }

    fn params(url: &str) -> HttpFetchParams {
        HttpFetchParams { url: url.into(), method: None, headers: None, body: None, max_body_bytes: None }
    }

    fn output(result: CallToolResult) -> HttpFetchOutput {
        let text = result.content.first().and_then(|c| c.as_text()).map(|t| t.text.clone()).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn test_parse_method() {
        assert_eq!(parse_method(None).unwrap(), Method::GET);
        assert_eq!(parse_method(Some(" head ")).unwrap(), Method::HEAD);
        assert!(parse_method(Some("NOT VALID")).is_err());
    }

    #[tokio::test]
    async fn test_fetch_stores_then_hits() {
        let dir = TempDir::new().unwrap();
        let transport = transport(&dir, StatusCode::OK);

        let first = output(fetch_impl(&transport, params("http://example.com/a/b")).await.unwrap());
        assert_eq!(first.cache, "stored");
        assert_eq!(first.status, 200);
        assert_eq!(first.body, "GET /a/b");
        let path = first.path.unwrap();
        assert!(path.ends_with("com/example/-a-b"), "unexpected path {path}");

        let second = output(fetch_impl(&transport, params("http://example.com/a/b")).await.unwrap());
        assert_eq!(second.cache, "hit");
        assert_eq!(second.path.as_deref(), Some(path.as_str()));
        assert_eq!(transport.executor().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_non_200_skipped() {
        let dir = TempDir::new().unwrap();
        let transport = transport(&dir, StatusCode::NOT_FOUND);

        let out = output(fetch_impl(&transport, params("http://example.com/missing")).await.unwrap());
        assert_eq!(out.cache, "skipped");
        assert_eq!(out.status, 404);
        assert!(out.path.is_none());
    }

    #[tokio::test]
    async fn test_fetch_post_bypassed() {
        let dir = TempDir::new().unwrap();
        let transport = transport(&dir, StatusCode::OK);

        let mut p = params("http://example.com/form");
        p.method = Some("post".into());
        p.body = Some("a=1".into());
        p.headers = Some(BTreeMap::from([("Content-Type".to_string(), "text/plain".to_string())]));

        let out = output(fetch_impl(&transport, p).await.unwrap());
        assert_eq!(out.cache, "bypassed");
        assert_eq!(out.method, "POST");
        assert_eq!(out.body, "POST /form");
    }

    #[tokio::test]
    async fn test_fetch_truncates_body() {
        let dir = TempDir::new().unwrap();
        let transport = transport(&dir, StatusCode::OK);

        let mut p = params("http://example.com/long");
        p.max_body_bytes = Some(3);
        let out = output(fetch_impl(&transport, p).await.unwrap());
        assert_eq!(out.body, "GET");
        assert_eq!(out.body_bytes, "GET /long".len());
        assert!(out.truncated);
    }

    #[tokio::test]
    async fn test_fetch_invalid_input() {
        let dir = TempDir::new().unwrap();
        let transport = transport(&dir, StatusCode::OK);

        let err = fetch_impl(&transport, params("ftp://example.com/")).await.unwrap_err();
        assert_eq!(err.code.0, -32003);

        let mut p = params("http://example.com/");
        p.headers = Some(BTreeMap::from([("bad header".to_string(), "v".to_string())]));
        assert!(fetch_impl(&transport, p).await.is_err());
        assert_eq!(transport.executor().calls.load(Ordering::SeqCst), 0);
    }
}
