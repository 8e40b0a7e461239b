//! Filesystem store for serialized responses.
//!
//! One file per key; the file's modification time is the entry's storage time.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use http::StatusCode;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::key::CacheKey;
use super::wire::CachedResponse;
use crate::Error;

const TEMP_PREFIX: &str = ".tmp-";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A fresh entry read back from the store.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub path: PathBuf,
    pub response: CachedResponse,
    pub stored_at: SystemTime,
}

impl CacheEntry {
    pub fn age(&self) -> Duration {
        age_of(self.stored_at, SystemTime::now())
    }
}

/// Metadata about an entry, without parsing it.
#[derive(Debug, Clone)]
pub struct EntryInfo {
    pub path: PathBuf,
    pub stored_at: SystemTime,
    pub age: Duration,
    pub fresh: bool,
}

/// Reads and writes cache entries below a root directory.
///
/// With a TTL, entries older than the TTL read as absent. Without one, entries never expire.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    ttl: Option<Duration>,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>, ttl: Option<Duration>) -> Self {
        Self { root: root.into(), ttl }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.as_path())
    }

    /// An entry stored at `stored_at` is fresh at `now` while `now - stored_at <= ttl`.
    pub fn is_fresh(&self, stored_at: SystemTime, now: SystemTime) -> bool {
        match self.ttl {
            Some(ttl) => age_of(stored_at, now) <= ttl,
            None => true,
        }
    }

    /// Look up an entry's age and freshness without reading its content.
    pub async fn stat(&self, key: &CacheKey) -> Result<Option<EntryInfo>, Error> {
        let path = self.path_for(key);
        let Some(stored_at) = modified_time(&path).await? else {
            return Ok(None);
        };
        let now = SystemTime::now();
        Ok(Some(EntryInfo { age: age_of(stored_at, now), fresh: self.is_fresh(stored_at, now), stored_at, path }))
    }

    /// Read a fresh entry.
    ///
    /// Returns `Ok(None)` if there is no entry or it has expired. A fresh entry
    /// that fails to parse is an error, not a miss.
    pub async fn read(&self, key: &CacheKey) -> Result<Option<CacheEntry>, Error> {
        let path = self.path_for(key);
        let Some(stored_at) = modified_time(&path).await? else {
            return Ok(None);
        };
        if !self.is_fresh(stored_at, SystemTime::now()) {
            tracing::debug!(path = %path.display(), "cache entry expired");
            return Ok(None);
        }

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if is_absent(&err) => return Ok(None),
            Err(source) => return Err(Error::CacheRead { path, source }),
        };
        let response = CachedResponse::parse(&bytes).map_err(|source| Error::Corrupt { path: path.clone(), source })?;

        Ok(Some(CacheEntry { path, response, stored_at }))
    }

    /// Persist a `200 OK` response, replacing any existing entry.
    ///
    /// The entry is written to a temporary sibling with owner-only permissions
    /// and renamed into place, so readers see either the old or the new entry.
    /// Concurrent writers to the same key race; the last rename wins.
    pub async fn write(&self, key: &CacheKey, response: &CachedResponse) -> Result<PathBuf, Error> {
        if response.status != StatusCode::OK {
            return Err(Error::NotCacheable(response.status.as_u16()));
        }

        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| Error::CacheWrite { path: parent.to_path_buf(), source })?;
        }

        let temp = temp_path(&path);
        let data = response.encode();
        if let Err(source) = write_new_file(&temp, &data).await {
            let _ = fs::remove_file(&temp).await;
            return Err(Error::CacheWrite { path: temp, source });
        }
        if let Err(source) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(Error::CacheWrite { path, source });
        }

        tracing::debug!(path = %path.display(), bytes = data.len(), "cache entry written");
        Ok(path)
    }
}

fn age_of(stored_at: SystemTime, now: SystemTime) -> Duration {
    now.duration_since(stored_at).unwrap_or_default()
}

/// Missing file, or a path component that is not a directory.
fn is_absent(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory)
}

async fn modified_time(path: &Path) -> Result<Option<SystemTime>, Error> {
    let metadata = match fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(err) if is_absent(&err) => return Ok(None),
        Err(source) => return Err(Error::CacheRead { path: path.to_path_buf(), source }),
    };
    metadata
        .modified()
        .map(Some)
        .map_err(|source| Error::CacheRead { path: path.to_path_buf(), source })
}

/// Whether a file name belongs to an in-flight write rather than a committed entry.
///
/// Keys built from a URL end in a name starting with `-`, so the prefix cannot collide.
pub(crate) fn is_temp_name(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with(TEMP_PREFIX)
}

/// Sibling temp file for `path`. The name does not embed the entry's own name,
/// so any entry name that fits on disk also has a temp file that fits.
fn temp_path(path: &Path) -> PathBuf {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!("{TEMP_PREFIX}{}-{n}", std::process::id()))
}

async fn write_new_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.create_new(true).write(true);
    #[cfg(unix)]
    {
        options.mode(0o600);
    }
    let mut file = options.open(path).await?;
    file.write_all(data).await?;
    file.flush().await?;
    Ok(())
}
