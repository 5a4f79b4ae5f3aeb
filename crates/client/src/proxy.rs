//! Stream cache proxy.
//!
//! ### Per-request flow
//! - The request always goes to the network first.
//! - A 2xx `text/event-stream` response is teed: one branch is returned
//!   immediately, the other is parsed and recorded in the background.
//! - Any other response passes through untouched and is never recorded.
//! - A network failure falls back to the last recording for the key. With
//!   no recording the original failure is returned.
//!
//! ### Recording
//! - A recording replaces the previous one only after the live stream ended
//!   cleanly and produced at least one complete event.
//! - Failures while recording are logged and never reach the caller.
//! - Eviction runs after each successful write. Replay never touches
//!   expiration metadata.

use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::Serialize;
use swcache_core::{Error, ExpirationPolicy, ExpirationTracker, Partition, SseConfig, StreamEvent};

use crate::fetch::{BodyStream, EVENT_STREAM_CONTENT_TYPE, StreamRequest, Upstream, UpstreamResponse, cache_key};
use crate::lifetime::Lifetime;
use crate::sse::{EventParser, ReplayStream, codec};
use crate::tee::{Branch, tee};

/// Where a proxied response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    /// Live event stream from the origin, recorded in the background.
    Live,
    /// Synthetic stream rebuilt from a recording.
    Replay,
    /// Origin response forwarded unmodified.
    Passthrough,
}

impl ResponseSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseSource::Live => "live",
            ResponseSource::Replay => "replay",
            ResponseSource::Passthrough => "passthrough",
        }
    }
}

/// Response handed back to the caller.
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyStream,
    pub source: ResponseSource,
}

impl std::fmt::Debug for ProxyResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl ProxyResponse {
    pub fn passthrough(response: UpstreamResponse) -> Self {
        Self {
            status: response.status,
            headers: response.headers,
            body: response.body,
            source: ResponseSource::Passthrough,
        }
    }

    /// Synthetic 200 event stream replaying `events` in order.
    pub fn replay(events: Vec<StreamEvent>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(EVENT_STREAM_CONTENT_TYPE));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        Self { status: StatusCode::OK, headers, body: ReplayStream::new(events).boxed(), source: ResponseSource::Replay }
    }

    fn live(status: StatusCode, headers: HeaderMap, body: Branch) -> Self {
        Self { status, headers, body: body.boxed(), source: ResponseSource::Live }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    pub fn is_event_stream(&self) -> bool {
        self.content_type()
            .map(|ct| ct.to_ascii_lowercase().contains(EVENT_STREAM_CONTENT_TYPE))
            .unwrap_or(false)
    }
}

/// Network-first proxy for event-stream routes with record and replay.
#[derive(Clone)]
pub struct StreamCacheProxy {
    upstream: Arc<dyn Upstream>,
    config: SseConfig,
    recorder: Recorder,
}

impl StreamCacheProxy {
    /// Open the configured partition and build a proxy over `upstream`.
    pub async fn open(db: &swcache_core::CacheDb, upstream: Arc<dyn Upstream>, config: SseConfig) -> Result<Self, Error> {
        let partition = db.open_partition(&config.cache_name).await?;
        let policy = ExpirationPolicy::new(config.max_entries, config.max_age_seconds);
        let tracker = ExpirationTracker::new(partition.clone(), policy);

        Ok(Self { upstream, config, recorder: Recorder { partition, tracker } })
    }

    pub fn config(&self) -> &SseConfig {
        &self.config
    }

    pub fn partition(&self) -> &Partition {
        &self.recorder.partition
    }

    pub fn tracker(&self) -> &ExpirationTracker {
        &self.recorder.tracker
    }

    /// Cache key for a canonical request URL.
    pub fn cache_key(&self, url: &reqwest::Url) -> String {
        cache_key(url, self.config.key_policy)
    }

    /// Recorded events for `url`, if any.
    pub async fn recorded(&self, url: &reqwest::Url) -> Result<Option<Vec<StreamEvent>>, Error> {
        let key = self.cache_key(url);
        match self.recorder.partition.match_record(&key).await? {
            Some(record) => Ok(Some(codec::from_record(&record)?)),
            None => Ok(None),
        }
    }

    /// Serve one intercepted request.
    ///
    /// Background recording is registered on `lifetime` and may outlive
    /// both this call and the returned body.
    pub async fn handle(&self, lifetime: &Lifetime, request: StreamRequest) -> Result<ProxyResponse, Error> {
        let key = self.cache_key(&request.url);

        let response = match self.upstream.fetch(&request).await {
            Ok(response) => response,
            Err(failure) => return self.replay(&key, &request, failure).await,
        };

        if !response.status.is_success() || !response.is_event_stream() {
            tracing::debug!(
                url = %request.url,
                status = %response.status,
                content_type = response.content_type().unwrap_or(""),
                "not an event stream; passing through"
            );
            return Ok(ProxyResponse::passthrough(response));
        }

        let UpstreamResponse { status, headers, body, .. } = response;
        let (live, recording) = tee(body, self.config.max_buffered_bytes);

        let recorder = self.recorder.clone();
        let url = request.url.to_string();
        lifetime.wait_until(async move { recorder.record(key, url, recording).await });

        Ok(ProxyResponse::live(status, headers, live))
    }

    async fn replay(&self, key: &str, request: &StreamRequest, failure: Error) -> Result<ProxyResponse, Error> {
        let record = match self.recorder.partition.match_record(key).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::debug!(url = %request.url, error = %failure, "network failed with no recording");
                return Err(failure);
            }
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "recording lookup failed");
                return Err(failure);
            }
        };

        match codec::from_record(&record) {
            Ok(events) => {
                tracing::debug!(
                    url = %request.url,
                    events = events.len(),
                    captured_at = %record.captured_at,
                    error = %failure,
                    "network failed; replaying recording"
                );
                Ok(ProxyResponse::replay(events))
            }
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "recording is unreadable");
                Err(failure)
            }
        }
    }
}

/// Background side of a live request.
#[derive(Clone, Debug)]
struct Recorder {
    partition: Partition,
    tracker: ExpirationTracker,
}

impl Recorder {
    async fn record(self, key: String, url: String, mut body: Branch) {
        let mut parser = EventParser::new();
        let mut events = Vec::new();

        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => events.extend(parser.feed_bytes(&bytes)),
                Err(e) => {
                    tracing::warn!(%url, error = %e, "recording aborted; previous recording kept");
                    return;
                }
            }
        }

        if let Err(e) = parser.finish() {
            tracing::debug!(%url, error = %e, "dropped unterminated trailing event");
        }

        if events.is_empty() {
            tracing::debug!(%url, "stream closed without complete events; nothing recorded");
            return;
        }

        if let Err(e) = self.store(&key, &url, &events).await {
            tracing::warn!(%url, error = %e, "failed to store recording");
        }
    }

    async fn store(&self, key: &str, url: &str, events: &[StreamEvent]) -> Result<(), Error> {
        let record = codec::to_record(url, events)?;
        self.tracker.store(key, &record).await?;

        tracing::debug!(url, events = events.len(), "recorded event stream");

        if let Err(e) = self.tracker.expire_entries().await {
            tracing::warn!(partition = self.partition.name(), error = %e, "eviction failed");
        }
        Ok(())
    }
}
