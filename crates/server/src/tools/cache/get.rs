//! cache_get tool implementation.
//!
//! Returns the recorded stream for a URL without touching the network.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_client::StreamCacheProxy;
use swcache_client::fetch::canonicalize;
use swcache_client::sse::codec;
use swcache_core::{Error, StreamEvent};

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// URL of the recorded stream.
    pub url: String,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    pub url: String,
    /// Cache key the record is stored under.
    pub key: String,
    pub content_type: String,
    /// RFC 3339 capture time.
    pub captured_at: String,
    pub events: Vec<StreamEvent>,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(proxy: &StreamCacheProxy, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let url = canonicalize(&params.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
    let key = proxy.cache_key(&url);

    let record = proxy
        .partition()
        .match_record(&key)
        .await?
        .ok_or_else(|| Error::ReplayMiss(key.clone()))?;
    let events = codec::from_record(&record)?;

    let output = CacheGetOutput {
        url: record.url,
        key,
        content_type: record.content_type,
        captured_at: record.captured_at,
        events,
    };
    let json = serde_json::to_string_pretty(&output).map_err(Error::from)?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
