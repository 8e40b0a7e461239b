//! Core types and shared functionality for httpstash.
//!
//! This crate provides:
//! - Request to path key derivation
//! - Wire-format response dump and parse
//! - Filesystem cache store with TTL freshness
//! - Cancellable replay of a whole cache tree
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheKey, CacheStore, CachedResponse, ReplayStream};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
