//! mcp-swcache server entry point.
//!
//! This is the main binary that boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use swcache_client::{Dispatcher, FetchConfig, HttpUpstream, Lifetime};
use swcache_core::{AppConfig, CacheDb, ProxyContext};
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
    tracing::info!(
        db_path = %config.db_path.display(),
        routes = ?config.sse.routes,
        enabled = config.enabled,
        "Starting mcp-swcache server on stdio transport"
    );

    let db = CacheDb::open(&config.db_path).await?;
    let upstream = Arc::new(HttpUpstream::new(FetchConfig::from(&config))?);
    let context = ProxyContext::new(db, config.enabled);
    let dispatcher = Dispatcher::new(context, upstream, &config).await?;
    let lifetime = Lifetime::new();

    let handler = handler::SwCacheServer::new(dispatcher, lifetime.clone());
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    if lifetime.pending() > 0 {
        tracing::info!(
            pending = lifetime.pending(),
            grace_ms = config.shutdown_grace_ms,
            "Waiting for background recordings"
        );
    }
    lifetime.settle_within(config.shutdown_grace()).await;

    Ok(())
}
