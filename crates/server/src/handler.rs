//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use crate::tools::cache::{CacheGetParams, CachePurgeParams, get_impl, purge_impl};
use crate::tools::{SseOpenParams, SwControlParams, control_impl, open_impl};

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
use swcache_client::{Dispatcher, Lifetime};

/// The main MCP server handler for mcp-swcache.
#[derive(Clone)]
pub struct SwCacheServer {
    tool_router: ToolRouter<Self>,
    dispatcher: Dispatcher,
    lifetime: Lifetime,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl SwCacheServer {
    /// Create a new server handler.
    ///
    /// Background recordings are registered on `lifetime`; the caller settles
    /// it before exiting.
    pub fn new(dispatcher: Dispatcher, lifetime: Lifetime) -> Self {
        Self { tool_router: Self::tool_router(), dispatcher, lifetime }
    }

    /// Open an event stream through the caching proxy.
    #[tool(
        description = "Open a URL as a server-sent event stream through the caching proxy. Live streams on configured routes are recorded; when the origin is unreachable the last recording is replayed. Returns parsed events and whether they came from the network (live), a recording (replay), or an unintercepted request (passthrough)."
    )]
    async fn sse_open(&self, params: Parameters<SseOpenParams>) -> Result<CallToolResult, McpError> {
        open_impl(&self.dispatcher, &self.lifetime, params.0).await
    }

    /// Get a recorded stream by URL.
    #[tool(description = "Return the recorded events for a URL without contacting the network. Fails with REPLAY_MISS when nothing is recorded.")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(self.dispatcher.proxy(), params.0).await
    }

    /// Evict recordings by count and age.
    #[tool(description = "Evict recorded streams beyond a count budget or older than an age budget. Defaults to the configured limits.")]
    async fn cache_purge(&self, params: Parameters<CachePurgeParams>) -> Result<CallToolResult, McpError> {
        purge_impl(self.dispatcher.proxy(), params.0).await
    }

    /// Apply a control message.
    #[tool(description = "Send a control message: UPDATE_SW_ENABLED toggles caching, CLEAR_SW_CACHE drops every recording.")]
    async fn sw_control(&self, params: Parameters<SwControlParams>) -> Result<CallToolResult, McpError> {
        control_impl(&self.dispatcher, params.0).await
    }
}

impl ServerHandler for SwCacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "mcp-swcache".into(),
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
    use std::sync::Arc;
    use swcache_client::testing::ScriptedUpstream;
    use swcache_core::{AppConfig, CacheDb, ProxyContext};

    #[tokio::test]
    async fn test_lists_all_tools() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let dispatcher = Dispatcher::new(ProxyContext::new(db, true), Arc::new(ScriptedUpstream::new()), &AppConfig::default())
            .await
            .unwrap();
        let server = SwCacheServer::new(dispatcher, Lifetime::new());

        let mut names: Vec<String> = server.tool_router.list_all().into_iter().map(|t| t.name.to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["cache_get", "cache_purge", "sse_open", "sw_control"]);
        assert_eq!(server.get_info().server_info.name, "mcp-swcache");
    }
}
