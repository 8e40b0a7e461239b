//! Caching transport.
//!
//! Per request:
//! 1. Methods outside the cacheable set go straight to the executor.
//! 2. A fresh entry at the request's key is returned without touching the network.
//! 3. Otherwise the executor runs; its errors propagate unchanged.
//! 4. A `200 OK` is written to the store before being returned; any other
//!    status is returned as-is and leaves existing entries alone.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use http::{Method, StatusCode};

use httpstash_core::cache::{CacheKey, CacheStore, CachedResponse};
use httpstash_core::{AppConfig, Error};

use crate::fetch::{Executor, FetchConfig, FetchRequest, ReqwestExecutor, parse_url};

/// What the cache did with a request.
#[derive(Debug)]
pub enum CacheOutcome {
    /// Method not cacheable; the cache was not consulted.
    Bypassed,
    /// Served from a fresh entry.
    Hit,
    /// Fetched and written to the given path.
    Stored(PathBuf),
    /// Fetched with a non-200 status; nothing was written.
    Skipped,
    /// Fetched with `200 OK`, but writing the entry failed.
    PersistFailed(Error),
}

impl CacheOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOutcome::Bypassed => "bypassed",
            CacheOutcome::Hit => "hit",
            CacheOutcome::Stored(_) => "stored",
            CacheOutcome::Skipped => "skipped",
            CacheOutcome::PersistFailed(_) => "persist_failed",
        }
    }
}

/// A response together with how the cache handled it.
#[derive(Debug)]
pub struct Fetched {
    pub response: CachedResponse,
    pub outcome: CacheOutcome,
    /// Key the request mapped to; `None` when bypassed.
    pub key: Option<CacheKey>,
}

impl Fetched {
    pub fn is_hit(&self) -> bool {
        matches!(self.outcome, CacheOutcome::Hit)
    }

    /// The response, or the persistence error for callers that treat it as fatal.
    pub fn into_result(self) -> Result<CachedResponse, Error> {
        match self.outcome {
            CacheOutcome::PersistFailed(err) => Err(err),
            _ => Ok(self.response),
        }
    }
}

/// Maps a cacheable request to the key its response is stored under.
pub type KeyFn = Arc<dyn Fn(&FetchRequest) -> Result<CacheKey, Error> + Send + Sync>;

/// Default key derivation: reversed host labels plus the sanitized path and query.
pub fn url_key(request: &FetchRequest) -> Result<CacheKey, Error> {
    CacheKey::from_url(&request.url)
}

/// Wraps an [`Executor`] with a filesystem cache.
///
/// Safe to share between tasks. There is no locking: concurrent misses on the
/// same key all fetch and all write, and the last write wins.
pub struct CachingTransport<E> {
    executor: E,
    store: CacheStore,
    methods: Vec<Method>,
    key_fn: KeyFn,
}

impl<E: Executor> CachingTransport<E> {
    /// Cache `GET` and `HEAD` requests made through `executor` in `store`.
    pub fn new(executor: E, store: CacheStore) -> Self {
        Self { executor, store, methods: vec![Method::GET, Method::HEAD], key_fn: Arc::new(url_key) }
    }

    /// Replace the request to key mapping. Defaults to [`url_key`].
    pub fn with_key_fn<F>(mut self, key_fn: F) -> Self
    where
        F: Fn(&FetchRequest) -> Result<CacheKey, Error> + Send + Sync + 'static,
    {
        self.key_fn = Arc::new(key_fn);
        self
    }

    /// Replace the set of cacheable methods.
    pub fn with_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = methods.into_iter().collect();
        self
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn is_cacheable(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }

    /// Key `request` would be cached under.
    pub fn key_for(&self, request: &FetchRequest) -> Result<CacheKey, Error> {
        (self.key_fn)(request)
    }

    /// Run `request` through the cache.
    pub async fn fetch(&self, request: FetchRequest) -> Result<Fetched, Error> {
        if !self.is_cacheable(&request.method) {
            tracing::debug!(method = %request.method, url = %request.url, "method not cacheable, bypassing cache");
            let response = self.executor.execute(request).await?;
            return Ok(Fetched { response, outcome: CacheOutcome::Bypassed, key: None });
        }

        let key = self.key_for(&request)?;

        if let Some(entry) = self.store.read(&key).await? {
            tracing::debug!(key = %key, age_ms = entry.age().as_millis() as u64, "cache hit");
            return Ok(Fetched { response: entry.response, outcome: CacheOutcome::Hit, key: Some(key) });
        }

        tracing::debug!(key = %key, method = %request.method, "cache miss");
        let response = self.executor.execute(request).await?;

        if response.status != StatusCode::OK {
            tracing::debug!(key = %key, status = response.status.as_u16(), "response not cacheable");
            return Ok(Fetched { response, outcome: CacheOutcome::Skipped, key: Some(key) });
        }

        let outcome = match self.store.write(&key, &response).await {
            Ok(path) => CacheOutcome::Stored(path),
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "failed to persist response");
                CacheOutcome::PersistFailed(err)
            }
        };

        Ok(Fetched { response, outcome, key: Some(key) })
    }

    /// `GET` a URL given as text.
    pub async fn get(&self, url: &str) -> Result<Fetched, Error> {
        self.fetch(FetchRequest::get(parse_url(url)?)).await
    }
}

impl CachingTransport<ReqwestExecutor> {
    /// Build a network-backed transport rooted at `root`, using the TTL,
    /// methods and client settings from `config`.
    pub fn from_config(config: &AppConfig, root: impl Into<PathBuf>) -> Result<Self, Error> {
        let methods = config.cacheable_methods().map_err(|e| Error::InvalidInput(e.to_string()))?;
        let executor = ReqwestExecutor::new(&FetchConfig::from(config))?;
        Ok(Self::new(executor, CacheStore::new(root, config.ttl())).with_methods(methods))
    }
}

/// Transports nest: a caching transport is itself an executor. Persistence
/// failures surface as errors at this level.
#[async_trait]
impl<E: Executor> Executor for CachingTransport<E> {
    async fn execute(&self, request: FetchRequest) -> Result<CachedResponse, Error> {
        self.fetch(request).await?.into_result()
    }
}
