//! cache_lookup tool implementation.
//!
//! Reports the cache file a URL maps to and its freshness, without
//! touching the network or parsing the entry.

use chrono::{DateTime, Utc};
use httpstash_client::{CachingTransport, Executor, FetchRequest, parse_url};
use httpstash_core::Error;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the cache_lookup tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheLookupParams {
    /// The URL whose cache entry to inspect.
    pub url: String,
}

/// Output from the cache_lookup tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheLookupOutput {
    pub url: String,
    /// Key relative to the cache root.
    pub key: String,
    /// Absolute path of the cache file.
    pub path: String,
    pub exists: bool,
    /// Whether a request now would be served from this entry.
    pub fresh: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Modification time of the entry, RFC 3339.
    pub stored_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_secs: Option<u64>,
    /// Configured TTL; absent when entries never expire.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
}

/// Implementation of the cache_lookup tool.
pub async fn lookup_impl<E: Executor>(
    transport: &CachingTransport<E>, params: CacheLookupParams,
) -> Result<CallToolResult, McpError> {
    let url = parse_url(&params.url)?;
    let key = transport.key_for(&FetchRequest::get(url.clone()))?;
    let store = transport.store();
    let info = store.stat(&key).await?;

    let output = CacheLookupOutput {
        url: url.to_string(),
        key: key.to_string(),
        path: store.path_for(&key).display().to_string(),
        exists: info.is_some(),
        fresh: info.as_ref().is_some_and(|i| i.fresh),
        stored_at: info.as_ref().map(|i| DateTime::<Utc>::from(i.stored_at).to_rfc3339()),
        age_secs: info.as_ref().map(|i| i.age.as_secs()),
        ttl_secs: store.ttl().map(|ttl| ttl.as_secs()),
    };

    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize lookup: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
