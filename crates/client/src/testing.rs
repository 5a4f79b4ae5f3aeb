//! Scripted in-process upstream for tests.
//!
//! Each URL owns a queue of outcomes consumed in order, one per fetch.
//! A fetch with nothing queued fails like an unreachable origin.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, stream};
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderValue};
use swcache_core::Error;

use crate::fetch::{BodyError, EVENT_STREAM_CONTENT_TYPE, StreamRequest, Upstream, UpstreamResponse, canonicalize};

#[derive(Debug, Clone)]
enum Outcome {
    Respond { status: u16, content_type: String, chunks: Vec<String>, end: End },
    Fail(String),
}

/// How a scripted body finishes after its chunks.
#[derive(Debug, Clone)]
enum End {
    Close,
    Fail(String),
    Hang,
}

#[derive(Debug, Default)]
pub struct ScriptedUpstream {
    scripts: Mutex<HashMap<String, VecDeque<Outcome>>>,
    calls: AtomicUsize,
}

impl ScriptedUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a 200 `text/event-stream` response delivering `chunks`.
    pub fn stream(self, url: &str, chunks: &[&str]) -> Self {
        self.respond(url, 200, EVENT_STREAM_CONTENT_TYPE, chunks)
    }

    /// Queue an event stream that fails with `error` after `chunks`.
    pub fn broken_stream(self, url: &str, chunks: &[&str], error: &str) -> Self {
        self.push(url, event_stream(chunks, End::Fail(error.to_string())))
    }

    /// Queue an event stream that delivers `chunks` and then never ends.
    pub fn stream_then_hang(self, url: &str, chunks: &[&str]) -> Self {
        self.push(url, event_stream(chunks, End::Hang))
    }

    /// Queue an arbitrary response.
    pub fn respond(self, url: &str, status: u16, content_type: &str, chunks: &[&str]) -> Self {
        self.push(
            url,
            Outcome::Respond {
                status,
                content_type: content_type.to_string(),
                chunks: chunks.iter().map(|c| c.to_string()).collect(),
                end: End::Close,
            },
        )
    }

    /// Queue a connection failure.
    pub fn fail(self, url: &str, message: &str) -> Self {
        self.push(url, Outcome::Fail(message.to_string()))
    }

    /// Number of fetches served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn push(self, url: &str, outcome: Outcome) -> Self {
        let key = canonicalize(url).map(|u| u.to_string()).unwrap_or_else(|_| url.to_string());
        self.scripts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(key)
            .or_default()
            .push_back(outcome);
        self
    }

    fn next_outcome(&self, url: &str) -> Option<Outcome> {
        self.scripts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get_mut(url)
            .and_then(VecDeque::pop_front)
    }
}

fn event_stream(chunks: &[&str], end: End) -> Outcome {
    Outcome::Respond {
        status: 200,
        content_type: EVENT_STREAM_CONTENT_TYPE.to_string(),
        chunks: chunks.iter().map(|c| c.to_string()).collect(),
        end,
    }
}

#[async_trait]
impl Upstream for ScriptedUpstream {
    async fn fetch(&self, request: &StreamRequest) -> Result<UpstreamResponse, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let outcome = self
            .next_outcome(request.url.as_str())
            .unwrap_or_else(|| Outcome::Fail(format!("no scripted response for {}", request.url)));

        match outcome {
            Outcome::Fail(message) => Err(Error::Network(format!("{}: {}", request.url, message))),
            Outcome::Respond { status, content_type, chunks, end } => {
                let status = StatusCode::from_u16(status).map_err(|e| Error::HttpError(e.to_string()))?;

                let mut headers = HeaderMap::new();
                let value = HeaderValue::from_str(&content_type).map_err(|e| Error::HttpError(e.to_string()))?;
                headers.insert(header::CONTENT_TYPE, value);

                let mut items: Vec<Result<Bytes, BodyError>> = chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect();
                let body = match end {
                    End::Close => stream::iter(items).boxed(),
                    End::Fail(message) => {
                        items.push(Err(BodyError::Upstream(message)));
                        stream::iter(items).boxed()
                    }
                    End::Hang => stream::iter(items).chain(stream::pending()).boxed(),
                };

                Ok(UpstreamResponse { url: request.url.clone(), status, headers, body })
            }
        }
    }
}
