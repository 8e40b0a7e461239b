//! Filesystem-backed HTTP response cache.
//!
//! Each response lives in its own file, at a path derived from the request's
//! host and target:
//!
//! - Hosts are reversed into nested directories (`com/example/www`)
//! - Path and query are sanitized into a single file name
//! - File contents are the raw HTTP/1.x response dump
//! - The file's modification time is the entry's storage time

pub mod key;
pub mod replay;
pub mod store;
pub mod wire;

pub use crate::Error;

pub use key::{CacheKey, sanitize};
pub use replay::{DEFAULT_REPLAY_BUFFER, ReplayStream, ReplayedResponse, replay, replay_with_capacity};
pub use store::{CacheEntry, CacheStore, EntryInfo};
pub use wire::{CachedResponse, HeaderLine, WireError};
