//! Replay every cached response under a directory tree.
//!
//! A single blocking task walks the tree depth-first and feeds a bounded
//! channel, so it never runs more than `capacity` items ahead of the consumer.
//! The cancellation token is checked once per visited entry; the first
//! unreadable or unparsable file ends the replay with an error item.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use super::store::is_temp_name;
use super::wire::CachedResponse;
use crate::Error;

/// Items buffered between the walker and the consumer by [`replay`].
pub const DEFAULT_REPLAY_BUFFER: usize = 16;

/// A response read back from disk, with the file it came from.
#[derive(Debug, Clone)]
pub struct ReplayedResponse {
    pub path: PathBuf,
    pub response: CachedResponse,
}

type ReplayItem = Result<ReplayedResponse, Error>;

/// Single-pass stream of replayed responses.
///
/// Ends after the last entry, or right after the first error item.
/// Dropping the stream stops the walker at its next send.
pub struct ReplayStream {
    rx: mpsc::Receiver<ReplayItem>,
}

impl ReplayStream {
    /// Receive the next item, or `None` once the replay is finished.
    pub async fn recv(&mut self) -> Option<ReplayItem> {
        self.rx.recv().await
    }
}

impl Stream for ReplayStream {
    type Item = ReplayItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Replay all responses under `root` with the default buffer size.
///
/// Must be called from within a Tokio runtime.
pub fn replay(root: impl Into<PathBuf>, cancel: CancellationToken) -> ReplayStream {
    replay_with_capacity(root, cancel, DEFAULT_REPLAY_BUFFER)
}

/// Replay all responses under `root`, buffering at most `capacity` items (minimum 1).
pub fn replay_with_capacity(root: impl Into<PathBuf>, cancel: CancellationToken, capacity: usize) -> ReplayStream {
    let root = root.into();
    let (tx, rx) = mpsc::channel(capacity.max(1));
    tokio::task::spawn_blocking(move || walk(&root, &cancel, &tx));
    ReplayStream { rx }
}

fn walk(root: &Path, cancel: &CancellationToken, tx: &mpsc::Sender<ReplayItem>) {
    let mut emitted = 0usize;

    for entry in WalkDir::new(root) {
        if cancel.is_cancelled() {
            tracing::debug!(root = %root.display(), emitted, "replay cancelled");
            let _ = tx.blocking_send(Err(Error::Cancelled));
            return;
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(root = %root.display(), error = %err, "replay walk failed");
                let _ = tx.blocking_send(Err(Error::Walk(err.to_string())));
                return;
            }
        };
        if entry.file_type().is_dir() || is_temp_name(entry.file_name()) {
            continue;
        }

        let item = read_entry(entry.path());
        if let Err(err) = &item {
            tracing::warn!(error = %err, emitted, "replay aborted");
            let _ = tx.blocking_send(item);
            return;
        }
        if tx.blocking_send(item).is_err() {
            tracing::debug!(root = %root.display(), emitted, "replay consumer went away");
            return;
        }
        emitted += 1;
    }

    tracing::debug!(root = %root.display(), emitted, "replay finished");
}

fn read_entry(path: &Path) -> ReplayItem {
    tracing::trace!(path = %path.display(), "replaying entry");
    let bytes = std::fs::read(path).map_err(|source| Error::CacheRead { path: path.to_path_buf(), source })?;
    let response = CachedResponse::parse(&bytes).map_err(|source| Error::Corrupt { path: path.to_path_buf(), source })?;
    Ok(ReplayedResponse { path: path.to_path_buf(), response })
}
