//! Runtime kill-switch and control messages.
//!
//! The enablement flag is process-wide but never ambient: every component
//! that consults it receives a `ProxyContext` clone at construction.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::cache::CacheDb;

/// Control messages accepted from the management channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Turn caching on or off. Off demotes every route to pass-through.
    UpdateSwEnabled { enabled: bool },
    /// Drop every cache partition.
    ClearSwCache,
}

/// Shared handle to the enablement flag and the durable store.
#[derive(Clone, Debug)]
pub struct ProxyContext {
    enabled: Arc<AtomicBool>,
    db: CacheDb,
}

impl ProxyContext {
    pub fn new(db: CacheDb, enabled: bool) -> Self {
        Self { enabled: Arc::new(AtomicBool::new(enabled)), db }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
        tracing::info!(enabled, "Caching state updated");
    }

    pub fn db(&self) -> &CacheDb {
        &self.db
    }

    /// Apply a control message.
    ///
    /// A failed cache clear is logged and swallowed; the flag update cannot fail.
    pub async fn apply(&self, message: ControlMessage) {
        match message {
            ControlMessage::UpdateSwEnabled { enabled } => self.set_enabled(enabled),
            ControlMessage::ClearSwCache => match self.db.clear_all().await {
                Ok(cleared) => tracing::info!(partitions = cleared, "All caches cleared"),
                Err(e) => tracing::error!(error = %e, "Cache clear failed"),
            },
        }
    }
}
