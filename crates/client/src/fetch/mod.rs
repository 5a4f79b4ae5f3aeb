//! Upstream fetch layer.
//!
//! ### Request shape
//! - URLs are canonicalized before dispatch (see [`url::canonicalize`]).
//! - Bodies are exposed as byte streams so long-lived event streams can be
//!   forwarded chunk by chunk instead of being buffered.
//!
//! ### Failure classes
//! - [`Upstream::fetch`] fails only when no response head arrives
//!   (`Error::Network`). HTTP error statuses are ordinary responses.
//! - Mid-body failures surface as [`BodyError`] items inside the stream.

pub mod url;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::header::{self, HeaderMap};
use reqwest::{Client, StatusCode, Url};

pub use self::url::{UrlError, cache_key, canonicalize};

use swcache_core::Error;

/// MIME type of a server-push event stream.
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// Failure inside a response body.
///
/// Cloneable so one upstream failure can be delivered to every tee branch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BodyError {
    #[error("upstream body error: {0}")]
    Upstream(String),

    #[error("branch buffer exceeded {cap} bytes")]
    Overflow { cap: usize },
}

impl From<BodyError> for Error {
    fn from(err: BodyError) -> Self {
        match err {
            BodyError::Upstream(msg) => Error::Network(msg),
            BodyError::Overflow { cap } => Error::Storage(format!("recording buffer exceeded {cap} bytes")),
        }
    }
}

/// A response body delivered incrementally.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, BodyError>> + Send + 'static>>;

/// A request routed through the proxy.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub url: Url,
    pub headers: HeaderMap,
}

impl StreamRequest {
    /// A GET request for an already-canonical URL.
    pub fn get(url: Url) -> Self {
        Self { url, headers: HeaderMap::new() }
    }

    /// Canonicalize `input` and build a GET request for it.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let url = canonicalize(input).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self::get(url))
    }
}

/// Response head plus a streaming body.
pub struct UpstreamResponse {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyStream,
}

impl std::fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("url", &self.url.as_str())
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl UpstreamResponse {
    /// Content-Type header value, if present and valid ASCII.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Whether the response declares a server-push event stream.
    pub fn is_event_stream(&self) -> bool {
        self.content_type()
            .map(|ct| ct.to_ascii_lowercase().contains(EVENT_STREAM_CONTENT_TYPE))
            .unwrap_or(false)
    }
}

/// The network behind the proxy.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Send `request` and return as soon as the response head arrives.
    async fn fetch(&self, request: &StreamRequest) -> Result<UpstreamResponse, Error>;
}

/// Configuration for the HTTP upstream.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "swcache/0.1")
    pub user_agent: String,

    /// Connect timeout (default: 20s). Body reads are unbounded.
    pub connect_timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { user_agent: "swcache/0.1".to_string(), connect_timeout: Duration::from_millis(20_000), max_redirects: 5 }
    }
}

impl From<&swcache_core::AppConfig> for FetchConfig {
    fn from(config: &swcache_core::AppConfig) -> Self {
        Self { user_agent: config.user_agent.clone(), connect_timeout: config.timeout(), ..Default::default() }
    }
}

/// reqwest-backed upstream.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    http: Client,
}

impl HttpUpstream {
    /// Create a new upstream client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::HttpError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, request: &StreamRequest) -> Result<UpstreamResponse, Error> {
        let mut builder = self.http.get(request.url.as_str()).headers(request.headers.clone());
        if !request.headers.contains_key(header::ACCEPT) {
            builder = builder.header(header::ACCEPT, EVENT_STREAM_CONTENT_TYPE);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Network(format!("{}: {}", request.url, e)))?;

        let url = response.url().clone();
        let status = response.status();
        let headers = response.headers().clone();

        tracing::debug!("upstream {} -> {} ({})", request.url, url, status);

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| BodyError::Upstream(e.to_string())))
            .boxed();

        Ok(UpstreamResponse { url, status, headers, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use futures_util::stream;

    fn response_with(content_type: Option<&'static str>) -> UpstreamResponse {
        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(ct));
        }
        UpstreamResponse {
            url: Url::parse("https://example.com/events").unwrap(),
            status: StatusCode::OK,
            headers,
            body: stream::empty().boxed(),
        }
    }

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "swcache/0.1");
        assert_eq!(config.connect_timeout, Duration::from_millis(20_000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_fetch_config_from_app_config() {
        let app = swcache_core::AppConfig { user_agent: "swcache-test/1".into(), timeout_ms: 500, ..Default::default() };
        let config = FetchConfig::from(&app);
        assert_eq!(config.user_agent, "swcache-test/1");
        assert_eq!(config.connect_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_event_stream_detection() {
        assert!(response_with(Some("text/event-stream")).is_event_stream());
        assert!(response_with(Some("text/event-stream; charset=utf-8")).is_event_stream());
        assert!(response_with(Some("Text/Event-Stream")).is_event_stream());
        assert!(!response_with(Some("application/json")).is_event_stream());
        assert!(!response_with(None).is_event_stream());
    }

    #[test]
    fn test_request_parse() {
        let request = StreamRequest::parse("example.com/events#x").unwrap();
        assert_eq!(request.url.as_str(), "https://example.com/events");
        assert!(matches!(StreamRequest::parse(""), Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_body_error_mapping() {
        assert!(matches!(Error::from(BodyError::Upstream("reset".into())), Error::Network(_)));
        assert!(matches!(Error::from(BodyError::Overflow { cap: 4 }), Error::Storage(_)));
    }

    #[tokio::test]
    async fn test_http_upstream_new() {
        let upstream = HttpUpstream::new(FetchConfig::default());
        assert!(upstream.is_ok());
    }
}
