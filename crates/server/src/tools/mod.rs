//! MCP tool implementations.
//!
//! This module contains all tools exposed by the httpstash-mcp server.

pub mod cache;
pub mod http_fetch;

pub use http_fetch::{HttpFetchOutput, HttpFetchParams};
