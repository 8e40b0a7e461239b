//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use httpstash_client::{CachingTransport, ReqwestExecutor};
use httpstash_core::AppConfig;

use crate::tools::cache::{CacheLookupParams, CacheReplayParams, lookup_impl, replay_impl};
use crate::tools::http_fetch::{HttpFetchParams, fetch_impl};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for httpstash.
#[derive(Clone)]
pub struct HttpStashServer {
    transport: Arc<CachingTransport<ReqwestExecutor>>,
    config: Arc<AppConfig>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl HttpStashServer {
    /// Create a new server handler around a caching transport.
    pub fn new(transport: CachingTransport<ReqwestExecutor>, config: AppConfig) -> Self {
        Self { transport: Arc::new(transport), config: Arc::new(config), tool_router: Self::tool_router() }
    }

    /// Fetch a URL through the response cache.
    #[tool(
        description = "Fetch a URL through the on-disk response cache. Fresh 200 responses for cacheable methods are served from disk; misses go to the network and successful responses are stored."
    )]
    async fn http_fetch(&self, params: Parameters<HttpFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.transport, params.0).await
    }

    /// Inspect the cache entry a URL maps to.
    #[tool(description = "Show the cache file a URL maps to, whether it exists, its age and whether it is still fresh.")]
    async fn cache_lookup(&self, params: Parameters<CacheLookupParams>) -> Result<CallToolResult, McpError> {
        lookup_impl(&self.transport, params.0).await
    }

    /// Replay every cached response.
    #[tool(
        description = "Walk the whole cache and list every stored response (path, status, content type, size). Stops at the limit or the deadline."
    )]
    async fn cache_replay(&self, params: Parameters<CacheReplayParams>) -> Result<CallToolResult, McpError> {
        replay_impl(self.transport.store(), self.config.replay_buffer, params.0).await
    }
}

impl ServerHandler for HttpStashServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "httpstash-mcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(root: &std::path::Path) -> HttpStashServer {
        let config = AppConfig { cache_dir: Some(root.to_path_buf()), ..Default::default() };
        let transport = CachingTransport::from_config(&config, root).unwrap();
        HttpStashServer::new(transport, config)
    }

    #[tokio::test]
    async fn test_tools_registered() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());

        let mut names: Vec<String> = server.tool_router.list_all().into_iter().map(|t| t.name.to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["cache_lookup", "cache_replay", "http_fetch"]);
    }

    #[tokio::test]
    async fn test_server_info() {
        let dir = tempfile::tempdir().unwrap();
        let info = server(dir.path()).get_info();
        assert_eq!(info.server_info.name, "httpstash-mcp");
        assert!(info.capabilities.tools.is_some());
    }
}
