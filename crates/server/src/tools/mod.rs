//! MCP tool implementations.
//!
//! This module contains all tools exposed by the mcp-swcache server.

pub mod cache;
pub mod control;
pub mod sse_open;

pub use control::{SwControlParams, control_impl};
pub use sse_open::{SseOpenParams, open_impl};
