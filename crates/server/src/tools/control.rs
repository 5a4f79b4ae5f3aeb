//! sw_control tool implementation.

use rmcp::{ErrorData as McpError, model::*};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_client::Dispatcher;
use swcache_core::{ControlMessage, Error};

/// Parameters for the sw_control tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwControlParams {
    /// `{"type":"UPDATE_SW_ENABLED","enabled":false}` or `{"type":"CLEAR_SW_CACHE"}`.
    pub message: ControlMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwControlOutput {
    /// Caching state after the message was applied.
    pub enabled: bool,
    /// Partitions remaining after the message was applied.
    pub partitions: Vec<String>,
}

pub async fn control_impl(dispatcher: &Dispatcher, params: SwControlParams) -> Result<CallToolResult, McpError> {
    dispatcher.control(params.message).await;

    let output = SwControlOutput {
        enabled: dispatcher.context().is_enabled(),
        partitions: dispatcher.context().db().partition_names().await?,
    };
    let json = serde_json::to_string_pretty(&output).map_err(Error::from)?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
