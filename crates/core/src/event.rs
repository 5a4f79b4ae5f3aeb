//! Server-push event model.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Event type assumed when the wire carries no `event:` field.
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// One server-push event, in the shape it is recorded and replayed.
///
/// `data` may contain embedded newlines; each one becomes a separate
/// `data:` line on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StreamEvent {
    #[serde(rename = "type", default = "default_event_type")]
    pub event_type: String,
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Reconnection hint in milliseconds, kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<String>,
}

fn default_event_type() -> String {
    DEFAULT_EVENT_TYPE.into()
}

impl StreamEvent {
    /// A default-typed event carrying `data`.
    pub fn message(data: impl Into<String>) -> Self {
        Self { event_type: default_event_type(), data: data.into(), id: None, retry: None }
    }

    pub fn with_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_retry(mut self, retry: impl Into<String>) -> Self {
        self.retry = Some(retry.into());
        self
    }

    pub fn is_default_type(&self) -> bool {
        self.event_type == DEFAULT_EVENT_TYPE
    }
}
