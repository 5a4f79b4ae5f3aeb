//! sse_open tool implementation.
//!
//! Opens a URL through the dispatcher and reads it as an event stream until
//! the stream closes, enough events arrive, or it goes quiet. Recording of a
//! live stream continues in the background after the tool returns.

use std::time::Duration;

use futures_util::StreamExt;
use rmcp::{ErrorData as McpError, model::*};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_client::{Dispatcher, EventParser, Lifetime, StreamRequest};
use swcache_core::{Error, StreamEvent};

const DEFAULT_MAX_EVENTS: usize = 100;
const DEFAULT_IDLE_TIMEOUT_MS: u64 = 5_000;
const MAX_IDLE_TIMEOUT_MS: u64 = 120_000;
/// Cap on the body echoed back for non-stream responses.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Input parameters for sse_open tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SseOpenParams {
    /// The URL to open.
    pub url: String,

    /// Stop after this many events (default: 100).
    #[serde(default)]
    pub max_events: Option<usize>,

    /// Stop when no bytes arrive for this long, in milliseconds (default: 5000).
    #[serde(default)]
    pub idle_timeout_ms: Option<u64>,
}

/// Why reading stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Closed,
    MaxEvents,
    IdleTimeout,
    BodyError,
    /// A non-stream body exceeded the echo cap and was cut short.
    Truncated,
}

/// Output structure for sse_open tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SseOpenOutput {
    /// Canonical URL that was requested.
    pub url: String,
    /// live, replay, or passthrough.
    pub source: String,
    pub status: u16,
    pub content_type: Option<String>,
    /// Parsed events, in arrival order.
    pub events: Vec<StreamEvent>,
    pub stopped: StopReason,
    /// Body failure message when `stopped` is `body_error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Body text of a response that is not an event stream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Implementation of the sse_open tool.
pub async fn open_impl(
    dispatcher: &Dispatcher, lifetime: &Lifetime, params: SseOpenParams,
) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(Error::InvalidInput("url cannot be empty".into()).into());
    }

    let max_events = params.max_events.unwrap_or(DEFAULT_MAX_EVENTS);
    if max_events == 0 {
        return Err(Error::InvalidInput("max_events must be at least 1".into()).into());
    }

    let idle_ms = params.idle_timeout_ms.unwrap_or(DEFAULT_IDLE_TIMEOUT_MS);
    if idle_ms == 0 || idle_ms > MAX_IDLE_TIMEOUT_MS {
        return Err(Error::InvalidInput(format!("idle_timeout_ms must be within 1..={MAX_IDLE_TIMEOUT_MS}")).into());
    }
    let idle = Duration::from_millis(idle_ms);

    let request = StreamRequest::parse(&params.url)?;
    let url = request.url.to_string();

    let response = dispatcher.dispatch(lifetime, request).await?;
    let status = response.status.as_u16();
    let source = response.source.as_str().to_string();
    let content_type = response.content_type().map(str::to_string);
    let is_stream = response.is_event_stream();

    let mut body = response.body;
    let mut parser = EventParser::new();
    let mut events = Vec::new();
    let mut raw = Vec::new();
    let mut error = None;

    let stopped = loop {
        let chunk = match tokio::time::timeout(idle, body.next()).await {
            Err(_) => break StopReason::IdleTimeout,
            Ok(None) => break StopReason::Closed,
            Ok(Some(Err(e))) => {
                error = Some(e.to_string());
                break StopReason::BodyError;
            }
            Ok(Some(Ok(chunk))) => chunk,
        };

        if is_stream {
            events.extend(parser.feed_bytes(&chunk));
            if events.len() >= max_events {
                events.truncate(max_events);
                break StopReason::MaxEvents;
            }
        } else {
            raw.extend_from_slice(&chunk);
            if raw.len() > MAX_BODY_BYTES {
                raw.truncate(MAX_BODY_BYTES);
                break StopReason::Truncated;
            }
        }
    };

    tracing::debug!(%url, %source, events = events.len(), ?stopped, "sse_open finished reading");

    let output = SseOpenOutput {
        url,
        source,
        status,
        content_type,
        events,
        stopped,
        error,
        body: (!is_stream).then(|| String::from_utf8_lossy(&raw).into_owned()),
    };

    let json = serde_json::to_string_pretty(&output).map_err(Error::from)?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
