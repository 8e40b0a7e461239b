//! cache_replay tool implementation.
//!
//! Walks the whole cache and summarizes every stored response. The walk is
//! cancelled when the deadline passes; entries seen up to that point are
//! still returned.

use std::path::Path;
use std::time::Duration;

use httpstash_core::cache::replay_with_capacity;
use httpstash_core::{CacheStore, Error};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const MAX_TIMEOUT_MS: u64 = 300_000;

/// Parameters for the cache_replay tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheReplayParams {
    /// Stop after this many entries.
    #[serde(default)]
    pub limit: Option<usize>,

    /// Deadline for the whole walk in milliseconds (default: 10000, max: 300000).
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Summary of one replayed entry.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReplayEntry {
    /// Path relative to the cache root.
    pub key: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub body_bytes: usize,
}

/// Why a replay ended early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Limit,
    Deadline,
}

/// Output from the cache_replay tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheReplayOutput {
    pub root: String,
    pub entries: Vec<ReplayEntry>,
    /// Set when the walk did not reach the end of the cache.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped: Option<StopReason>,
}

fn relative_key(root: &Path, path: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

/// Implementation of the cache_replay tool.
///
/// An unreadable or corrupt entry fails the whole call.
pub async fn replay_impl(
    store: &CacheStore, buffer: usize, params: CacheReplayParams,
) -> Result<CallToolResult, McpError> {
    let timeout_ms = params.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
    if timeout_ms == 0 || timeout_ms > MAX_TIMEOUT_MS {
        return Err(Error::InvalidInput(format!("timeout_ms must be between 1 and {MAX_TIMEOUT_MS}")).into());
    }
    if params.limit == Some(0) {
        return Err(Error::InvalidInput("limit must be at least 1".into()).into());
    }

    let root = store.root();
    let mut output = CacheReplayOutput { root: root.display().to_string(), entries: Vec::new(), stopped: None };

    if !tokio::fs::try_exists(root).await.unwrap_or(false) {
        tracing::debug!(root = %root.display(), "cache root does not exist yet");
        return into_result(&output);
    }

    let cancel = CancellationToken::new();
    let deadline = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
            cancel.cancel();
        })
    };

    let mut stream = replay_with_capacity(root, cancel.clone(), buffer);
    let result = loop {
        if params.limit.is_some_and(|limit| output.entries.len() >= limit) {
            output.stopped = Some(StopReason::Limit);
            cancel.cancel();
            break Ok(());
        }
        match stream.recv().await {
            None => break Ok(()),
            Some(Ok(replayed)) => output.entries.push(ReplayEntry {
                key: relative_key(root, &replayed.path),
                status: replayed.response.status.as_u16(),
                content_type: replayed.response.header("content-type").map(str::to_string),
                body_bytes: replayed.response.body.len(),
            }),
            Some(Err(Error::Cancelled)) => {
                output.stopped = Some(StopReason::Deadline);
                break Ok(());
            }
            Some(Err(err)) => break Err(err),
        }
    };
    deadline.abort();

    if let Err(err) = result {
        tracing::warn!(root = %root.display(), replayed = output.entries.len(), error = %err, "cache replay failed");
        return Err(err.into());
    }

    tracing::debug!(root = %root.display(), replayed = output.entries.len(), stopped = ?output.stopped, "cache replay done");
    into_result(&output)
}

fn into_result(output: &CacheReplayOutput) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize replay: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use httpstash_core::{CacheKey, CachedResponse};
    use tempfile::TempDir;

    fn output(result: CallToolResult) -> CacheReplayOutput {
        let text = result.content.first().and_then(|c| c.as_text()).map(|t| t.text.clone()).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    async fn populated(n: usize) -> (TempDir, CacheStore) {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path(), None);
        for i in 0..n {
            let key = CacheKey::from_parts("example.com", &format!("/page/{i}"));
            let response = CachedResponse::new(StatusCode::OK)
                .with_header("Content-Type", "text/html")
                .with_body(format!("<p>{i}</p>"));
            store.write(&key, &response).await.unwrap();
        }
        (dir, store)
    }

    #[tokio::test]
    async fn test_replay_lists_all_entries() {
        let (_dir, store) = populated(3).await;

        let out = output(replay_impl(&store, 4, CacheReplayParams::default()).await.unwrap());
        assert_eq!(out.entries.len(), 3);
        assert!(out.stopped.is_none());

        let mut keys: Vec<_> = out.entries.iter().map(|e| e.key.clone()).collect();
        keys.sort();
        let expected: Vec<_> =
            (0..3).map(|i| Path::new("com/example").join(format!("-page-{i}")).display().to_string()).collect();
        assert_eq!(keys, expected);
        assert!(out.entries.iter().all(|e| e.status == 200 && e.content_type.as_deref() == Some("text/html")));
    }

    #[tokio::test]
    async fn test_replay_limit() {
        let (_dir, store) = populated(5).await;

        let params = CacheReplayParams { limit: Some(2), timeout_ms: None };
        let out = output(replay_impl(&store, 1, params).await.unwrap());
        assert_eq!(out.entries.len(), 2);
        assert_eq!(out.stopped, Some(StopReason::Limit));
    }

    #[tokio::test]
    async fn test_replay_deadline_returns_partial() {
        let (_dir, store) = populated(3000).await;

        let params = CacheReplayParams { limit: None, timeout_ms: Some(1) };
        let out = output(replay_impl(&store, 1, params).await.unwrap());
        assert_eq!(out.stopped, Some(StopReason::Deadline));
        assert!(out.entries.len() < 3000, "replayed all entries despite the deadline");
    }

    #[tokio::test]
    async fn test_replay_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path().join("not-yet"), None);

        let out = output(replay_impl(&store, 4, CacheReplayParams::default()).await.unwrap());
        assert!(out.entries.is_empty());
        assert!(out.stopped.is_none());
    }

    #[tokio::test]
    async fn test_replay_corrupt_entry_fails() {
        let (dir, store) = populated(2).await;
        std::fs::write(dir.path().join("garbage"), b"not a response").unwrap();

        let err = replay_impl(&store, 4, CacheReplayParams::default()).await.unwrap_err();
        assert_eq!(err.code.0, -32002);
        assert!(err.message.contains("garbage"));
    }

    #[tokio::test]
    async fn test_replay_rejects_bad_params() {
        let (_dir, store) = populated(0).await;

        let params = CacheReplayParams { limit: None, timeout_ms: Some(0) };
        assert!(replay_impl(&store, 4, params).await.is_err());

        let params = CacheReplayParams { limit: Some(0), timeout_ms: None };
        assert!(replay_impl(&store, 4, params).await.is_err());
    }
}
