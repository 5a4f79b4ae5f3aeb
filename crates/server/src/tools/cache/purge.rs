//! cache_purge tool implementation.
//!
//! Runs count and age eviction on the event-stream partition.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_client::StreamCacheProxy;
use swcache_core::{Error, ExpirationPolicy, ExpirationTracker};

/// Parameters for the cache_purge tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeParams {
    /// Keep at most this many recordings (default: configured max_entries).
    pub max_entries: Option<usize>,

    /// Drop recordings older than this many seconds (default: configured max_age_seconds).
    pub max_age_seconds: Option<u64>,
}

/// Output from the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeOutput {
    /// Number of entries deleted.
    pub deleted: u64,
    /// Keys that were evicted, age-expired first.
    pub keys: Vec<String>,
}

/// Implementation of the cache_purge tool.
pub async fn purge_impl(proxy: &StreamCacheProxy, params: CachePurgeParams) -> Result<CallToolResult, McpError> {
    let defaults = proxy.tracker().policy();

    if params.max_entries == Some(0) {
        return Err(Error::InvalidInput("max_entries must be at least 1".to_string()).into());
    }

    let policy = ExpirationPolicy {
        max_entries: params.max_entries.unwrap_or(defaults.max_entries),
        max_age: params.max_age_seconds.map(std::time::Duration::from_secs).unwrap_or(defaults.max_age),
    };

    let tracker = ExpirationTracker::new(proxy.partition().clone(), policy);
    let keys = tracker.expire_entries().await?;

    tracing::info!(partition = proxy.partition().name(), deleted = keys.len(), "Cache purge completed");

    let output = CachePurgeOutput { deleted: keys.len() as u64, keys };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use swcache_client::testing::ScriptedUpstream;
    use swcache_core::{CacheDb, SseConfig, StoredRecord};

    async fn proxy_with(keys: &[&str]) -> StreamCacheProxy {
        let db = CacheDb::open_in_memory().await.unwrap();
        let proxy = StreamCacheProxy::open(&db, Arc::new(ScriptedUpstream::new()), SseConfig::default())
            .await
            .unwrap();
        for key in keys {
            let record = StoredRecord::new(*key, "application/json", b"[]".to_vec());
            proxy.partition().put(key, &record).await.unwrap();
            proxy.tracker().record_write(key).await.unwrap();
        }
        proxy
    }

    fn output(result: CallToolResult) -> CachePurgeOutput {
        let text = result.content.first().and_then(|c| c.as_text()).map(|t| t.text.clone()).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[tokio::test]
    async fn test_purge_impl_defaults_keep_everything() {
        let proxy = proxy_with(&["a", "b"]).await;
        let out = output(purge_impl(&proxy, CachePurgeParams::default()).await.unwrap());
        assert_eq!(out.deleted, 0);
        assert_eq!(proxy.partition().keys().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_purge_impl_max_entries() {
        let proxy = proxy_with(&["a", "b", "c"]).await;
        let params = CachePurgeParams { max_entries: Some(1), max_age_seconds: None };
        let out = output(purge_impl(&proxy, params).await.unwrap());

        assert_eq!(out.deleted, 2);
        assert_eq!(out.keys, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(proxy.partition().keys().await.unwrap(), vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn test_purge_impl_rejects_zero_entries() {
        let proxy = proxy_with(&[]).await;
        let params = CachePurgeParams { max_entries: Some(0), max_age_seconds: None };
        assert!(purge_impl(&proxy, params).await.is_err());
    }
}
