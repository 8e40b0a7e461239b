//! httpstash-mcp server entry point.
//!
//! Boots the MCP server on stdio transport over a caching HTTP client.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use anyhow::Result;
use httpstash_client::CachingTransport;
use httpstash_core::AppConfig;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    let root = config.cache_root()?;

    tracing::info!(
        root = %root.display(),
        ttl_secs = ?config.ttl().map(|ttl| ttl.as_secs()),
        methods = ?config.methods,
        "Starting httpstash-mcp server on stdio transport"
    );

    let transport = CachingTransport::from_config(&config, root)?;
    let handler = handler::HttpStashServer::new(transport, config);
    let server = serve_server(handler, stdio()).await?;

    server.waiting().await?;

    Ok(())
}
