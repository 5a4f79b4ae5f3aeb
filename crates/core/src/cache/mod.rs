//! SQLite-backed partitioned cache for recorded event streams.
//!
//! This module provides a persistent, request-keyed record store using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - Named partitions with `match`/`put`/`keys`/`delete` semantics
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Count and age eviction driven by per-key write timestamps

pub mod connection;
pub mod expiration;
pub mod migrations;
pub mod records;

pub use crate::Error;

pub use connection::CacheDb;
pub use expiration::{ExpirationPolicy, ExpirationTracker};
pub use records::{Partition, StoredRecord};
