//! Core types and shared functionality for swcache.
//!
//! This crate provides:
//! - The `StreamEvent` data model for server-push streams
//! - Partitioned record cache with SQLite backend
//! - Count/age expiration tracking
//! - Unified error types
//! - Configuration structures and the runtime kill-switch

pub mod cache;
pub mod config;
pub mod control;
pub mod error;
pub mod event;

pub use cache::{CacheDb, ExpirationPolicy, ExpirationTracker, Partition, StoredRecord};
pub use config::{AppConfig, KeyPolicy, SseConfig};
pub use control::{ControlMessage, ProxyContext};
pub use error::Error;
pub use event::{DEFAULT_EVENT_TYPE, StreamEvent};
