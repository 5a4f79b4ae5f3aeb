//! Event log codec.
//!
//! Recorded streams are stored as a JSON array of events under the
//! `application/json` content type. Replay turns a stored array back into
//! standard event-stream framing, one chunk per event.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use swcache_core::{Error, StoredRecord, StreamEvent};

use crate::fetch::BodyError;

/// Content type of a stored event log.
pub const RECORD_CONTENT_TYPE: &str = "application/json";

/// Serialize an ordered event sequence.
pub fn encode(events: &[StreamEvent]) -> Result<Vec<u8>, Error> {
    Ok(serde_json::to_vec(events)?)
}

/// Deserialize an ordered event sequence.
pub fn decode(body: &[u8]) -> Result<Vec<StreamEvent>, Error> {
    Ok(serde_json::from_slice(body)?)
}

/// Reject events whose single-line fields would break wire framing.
///
/// `data` may hold any line endings; they are normalized when rendered.
pub fn validate(events: &[StreamEvent]) -> Result<(), Error> {
    let breaks_line = |value: &str| value.contains(['\r', '\n']);
    for event in events {
        if breaks_line(&event.event_type) {
            return Err(Error::Codec(format!("event type {:?} spans lines", event.event_type)));
        }
        if let Some(id) = &event.id
            && (breaks_line(id) || id.contains('\0'))
        {
            return Err(Error::Codec(format!("event id {id:?} is not a single line")));
        }
        if let Some(retry) = &event.retry
            && breaks_line(retry)
        {
            return Err(Error::Codec(format!("retry {retry:?} spans lines")));
        }
    }
    Ok(())
}

/// Build the durable record for a capture of `url`.
pub fn to_record(url: &str, events: &[StreamEvent]) -> Result<StoredRecord, Error> {
    validate(events)?;
    Ok(StoredRecord::new(url, RECORD_CONTENT_TYPE, encode(events)?))
}

/// Decode the events held by a stored record.
pub fn from_record(record: &StoredRecord) -> Result<Vec<StreamEvent>, Error> {
    if !record.content_type.starts_with(RECORD_CONTENT_TYPE) {
        return Err(Error::Codec(format!("unexpected record content type {}", record.content_type)));
    }
    let events = decode(&record.body)?;
    validate(&events)?;
    Ok(events)
}

/// Render one event in wire framing.
///
/// `event:` is written only for non-default types and `retry:` only when
/// present. Every line of `data` becomes its own `data:` line, with CRLF
/// and lone CR treated as line breaks the way a parser reads them.
pub fn render_event(event: &StreamEvent) -> String {
    let mut chunk = String::with_capacity(event.data.len() + 32);
    if let Some(id) = &event.id {
        chunk.push_str("id: ");
        chunk.push_str(id);
        chunk.push('\n');
    }
    if !event.is_default_type() {
        chunk.push_str("event: ");
        chunk.push_str(&event.event_type);
        chunk.push('\n');
    }
    if let Some(retry) = &event.retry {
        chunk.push_str("retry: ");
        chunk.push_str(retry);
        chunk.push('\n');
    }
    let data = event.data.replace("\r\n", "\n").replace('\r', "\n");
    for line in data.split('\n') {
        chunk.push_str("data: ");
        chunk.push_str(line);
        chunk.push('\n');
    }
    chunk.push('\n');
    chunk
}

/// Render a whole sequence eagerly.
pub fn render_all(events: &[StreamEvent]) -> String {
    events.iter().map(render_event).collect()
}

/// Lazily rendered replay of a stored sequence.
///
/// Finite and single-use; every cache hit builds a fresh one.
#[derive(Debug)]
pub struct ReplayStream {
    events: std::vec::IntoIter<StreamEvent>,
}

impl ReplayStream {
    pub fn new(events: Vec<StreamEvent>) -> Self {
        Self { events: events.into_iter() }
    }
}

impl Stream for ReplayStream {
    type Item = Result<Bytes, BodyError>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let next = self.get_mut().events.next();
        Poll::Ready(next.map(|event| Ok(Bytes::from(render_event(&event)))))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.events.size_hint()
    }
}
