//! Cache-related MCP tools.
//!
//! This module provides tools for inspecting the on-disk response cache.

pub mod lookup;
pub mod replay;

pub use lookup::{CacheLookupParams, lookup_impl};
pub use replay::{CacheReplayParams, replay_impl};
