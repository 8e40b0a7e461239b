//! Request to path mapping.
//!
//! `www.example.com/file-path-here?query=here` becomes
//! `com/example/www/file-path-here-query-here`.

use std::fmt;
use std::path::{Path, PathBuf};

use url::{Position, Url};

use crate::Error;

/// Separator emitted in place of a run of disallowed characters.
pub const SEPARATOR: char = '-';

/// Replace every run of characters outside `[A-Za-z0-9.]` with a single `-`.
pub fn sanitize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_run = false;
    for c in s.chars() {
        if c.is_ascii_alphanumeric() || c == '.' {
            in_run = false;
            out.push(c);
        } else if !in_run {
            in_run = true;
            out.push(SEPARATOR);
        }
    }
    out
}

/// Relative location of a cached response under the cache root.
///
/// Hosts are reversed label by label so entries group by top-level domain.
/// Method, headers and body are not part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    path: PathBuf,
}

impl CacheKey {
    /// Build a key from a host (optionally `host:port`) and a request target (path plus query).
    pub fn from_parts(host: &str, request_target: &str) -> Self {
        let mut path: PathBuf = host.split('.').rev().collect();
        path.push(sanitize(request_target));
        Self { path }
    }

    /// Build a key from an absolute URL. The fragment is ignored.
    pub fn from_url(url: &Url) -> Result<Self, Error> {
        let host = url
            .host_str()
            .ok_or_else(|| Error::InvalidUrl(format!("{url} has no host")))?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        Ok(Self::from_parts(&host, &url[Position::BeforePath..Position::AfterQuery]))
    }

    pub fn as_path(&self) -> &Path {
        &self.path
    }
}

impl AsRef<Path> for CacheKey {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
