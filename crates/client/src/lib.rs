//! Client code for httpstash.
//!
//! This crate provides the caching transport and the executors it delegates
//! cache misses to.

pub mod fetch;
pub mod transport;

pub use fetch::{Executor, FetchConfig, FetchRequest, ReqwestExecutor, parse_url};
pub use transport::{CacheOutcome, CachingTransport, Fetched, KeyFn, url_key};
