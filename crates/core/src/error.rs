//! Unified error types for httpstash.
//!
//! Every variant renders with a stable code prefix so tool callers can match on it.

use std::path::PathBuf;

use rmcp::model::{ErrorCode, ErrorData as McpError};

use crate::cache::wire::WireError;

/// Unified error type shared by the store, the transport and the server tools.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., unknown method name).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// URL could not be parsed or has no host.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// The underlying executor failed to produce a response.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),

    /// The underlying executor timed out.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Only `200 OK` responses are persisted.
    #[error("NOT_CACHEABLE: status {0}")]
    NotCacheable(u16),

    /// Creating the entry's directories or writing the entry failed.
    #[error("CACHE_WRITE: {}: {source}", path.display())]
    CacheWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An entry exists but could not be opened or read.
    #[error("CACHE_READ: {}: {source}", path.display())]
    CacheRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An entry exists but is not a valid serialized response.
    #[error("CACHE_CORRUPT: {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: WireError,
    },

    /// Directory traversal failed during replay.
    #[error("CACHE_WALK: {0}")]
    Walk(String),

    /// Replay stopped because its cancellation token fired.
    #[error("CANCELLED: replay cancelled")]
    Cancelled,
}

impl Error {
    /// Path of the cache entry this error refers to, if any.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Error::CacheWrite { path, .. } | Error::CacheRead { path, .. } | Error::Corrupt { path, .. } => {
                Some(path.as_path())
            }
            _ => None,
        }
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let code = match &err {
            Error::InvalidInput(_) => -32602,
            Error::InvalidUrl(_) => -32003,
            Error::HttpError(_) => -32008,
            Error::FetchTimeout(_) => -32006,
            Error::NotCacheable(_) => -32001,
            Error::CacheWrite { .. } | Error::CacheRead { .. } | Error::Corrupt { .. } | Error::Walk(_) => -32002,
            Error::Cancelled => -32013,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}
