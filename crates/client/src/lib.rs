//! Network side of swcache.
//!
//! This crate provides the upstream fetch layer, the incremental event
//! parser and stored-log codec, the stream duplicator, and the caching
//! proxy with its dispatcher.

pub mod dispatch;
pub mod fetch;
pub mod lifetime;
pub mod proxy;
pub mod sse;
pub mod tee;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use dispatch::{Dispatcher, Route};
pub use fetch::{
    BodyError, BodyStream, FetchConfig, HttpUpstream, StreamRequest, Upstream, UpstreamResponse, cache_key,
    canonicalize,
};
pub use lifetime::Lifetime;
pub use proxy::{ProxyResponse, ResponseSource, StreamCacheProxy};
pub use sse::{EventParser, ReplayStream};
pub use tee::{Branch, tee};
