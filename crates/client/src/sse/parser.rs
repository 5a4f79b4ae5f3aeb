//! Incremental server-push event parser.
//!
//! Input may be split at any byte: inside a field name, inside a UTF-8
//! sequence, or between the `\r` and `\n` of a CRLF terminator. The
//! emitted sequence is identical to a single-shot parse of the whole text.
//!
//! An event is complete only at its blank-line terminator. Whatever is
//! still buffered when the input ends is discarded by [`EventParser::finish`].

use swcache_core::{DEFAULT_EVENT_TYPE, Error, StreamEvent};

const BOM: char = '\u{FEFF}';

#[derive(Debug, Default)]
pub struct EventParser {
    line: String,
    after_cr: bool,
    started: bool,
    utf8_tail: Vec<u8>,
    data: Vec<String>,
    event_type: Option<String>,
    id: Option<String>,
    retry: Option<String>,
}

impl EventParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, decoding UTF-8 across chunk boundaries.
    ///
    /// Invalid sequences decode to U+FFFD.
    pub fn feed_bytes(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut buf = std::mem::take(&mut self.utf8_tail);
        buf.extend_from_slice(chunk);

        let mut text = String::with_capacity(buf.len());
        let mut rest: &[u8] = &buf;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    text.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }
        self.utf8_tail = rest.to_vec();

        self.feed(&text)
    }

    /// Feed decoded text and return every event it completes.
    pub fn feed(&mut self, chunk: &str) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        for ch in chunk.chars() {
            if !self.started {
                self.started = true;
                if ch == BOM {
                    continue;
                }
            }

            if self.after_cr {
                self.after_cr = false;
                if ch == '\n' {
                    continue;
                }
            }

            match ch {
                '\r' => {
                    self.after_cr = true;
                    self.end_line(&mut events);
                }
                '\n' => self.end_line(&mut events),
                _ => self.line.push(ch),
            }
        }

        events
    }

    /// Whether any bytes of an unterminated event are buffered.
    pub fn has_partial(&self) -> bool {
        !self.line.is_empty()
            || !self.utf8_tail.is_empty()
            || !self.data.is_empty()
            || self.event_type.is_some()
            || self.id.is_some()
            || self.retry.is_some()
    }

    /// End of input.
    ///
    /// Returns `Error::Parse` when an unterminated trailing event was
    /// discarded. Events already emitted are unaffected.
    pub fn finish(self) -> Result<(), Error> {
        if self.has_partial() {
            return Err(Error::Parse(format!(
                "stream ended inside an event ({} data line(s), {} byte(s) unterminated)",
                self.data.len(),
                self.line.len() + self.utf8_tail.len()
            )));
        }
        Ok(())
    }

    fn end_line(&mut self, events: &mut Vec<StreamEvent>) {
        let line = std::mem::take(&mut self.line);

        if line.is_empty() {
            if let Some(event) = self.dispatch() {
                events.push(event);
            }
            return;
        }

        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_str(), ""),
        };

        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event_type = Some(value.to_string()),
            "id" => {
                if !value.contains('\0') {
                    self.id = Some(value.to_string());
                }
            }
            "retry" => {
                if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                    self.retry = Some(value.to_string());
                }
            }
            _ => {}
        }
    }

    fn dispatch(&mut self) -> Option<StreamEvent> {
        let event_type = self.event_type.take();
        let id = self.id.take();
        let retry = self.retry.take();

        // Blocks without data lines are not events.
        if self.data.is_empty() {
            return None;
        }

        let data = std::mem::take(&mut self.data).join("\n");
        Some(StreamEvent {
            event_type: event_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string()),
            data,
            id,
            retry,
        })
    }
}

/// Parse a complete text in one shot, dropping any unterminated tail.
pub fn parse_all(text: &str) -> Vec<StreamEvent> {
    let mut parser = EventParser::new();
    parser.feed(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fields_across_chunks() {
        let mut parser = EventParser::new();
        let first = parser.feed("event: update\nid: abc\nretry: 1500\ndata: line-1\nd");
        assert!(first.is_empty());

        let second = parser.feed("ata: line-2\n\n");
        assert_eq!(
            second,
            vec![StreamEvent::message("line-1\nline-2").with_type("update").with_id("abc").with_retry("1500")]
        );
    }

    #[test]
    fn defaults_type_to_message() {
        let events = parse_all("data: hi\n\nevent:\ndata: empty type\n\n");
        assert_eq!(events[0].event_type, "message");
        assert_eq!(events[1].event_type, "message");
    }

    #[test]
    fn ignores_comments_and_unknown_fields() {
        let events = parse_all(": ping\nfoo: bar\ndata: ok\n\n");
        assert_eq!(events, vec![StreamEvent::message("ok")]);
    }

    #[test]
    fn field_without_colon_has_empty_value() {
        let events = parse_all("data\n\n");
        assert_eq!(events, vec![StreamEvent::message("")]);
    }

    #[test]
    fn only_one_leading_space_is_stripped() {
        let events = parse_all("data:  two\ndata:none\n\n");
        assert_eq!(events[0].data, " two\nnone");
    }

    #[test]
    fn blocks_without_data_are_dropped() {
        let events = parse_all("id: 1\nevent: ping\n\ndata: real\n\n");
        assert_eq!(events, vec![StreamEvent::message("real")]);
    }

    #[test]
    fn id_does_not_leak_into_next_event() {
        let events = parse_all("id: 1\ndata: a\n\ndata: b\n\n");
        assert_eq!(events[0].id.as_deref(), Some("1"));
        assert_eq!(events[1].id, None);
    }

    #[test]
    fn invalid_retry_and_nul_id_are_ignored() {
        let events = parse_all("retry: soon\nid: a\0b\ndata: x\n\n");
        assert_eq!(events, vec![StreamEvent::message("x")]);
    }

    #[test]
    fn crlf_split_between_chunks() {
        let mut parser = EventParser::new();
        let mut events = parser.feed("data: a\r");
        events.extend(parser.feed("\n\r"));
        events.extend(parser.feed("\ndata: b\r\r"));
        assert_eq!(events, vec![StreamEvent::message("a"), StreamEvent::message("b")]);
    }

    #[test]
    fn utf8_split_between_chunks() {
        let text = "data: h\u{e9}llo \u{1F600}\n\n".as_bytes();
        let mut parser = EventParser::new();
        let mut events = Vec::new();
        for byte in text {
            events.extend(parser.feed_bytes(std::slice::from_ref(byte)));
        }
        assert_eq!(events, vec![StreamEvent::message("h\u{e9}llo \u{1F600}")]);
        assert!(parser.finish().is_ok());
    }

    #[test]
    fn leading_bom_is_skipped() {
        let events = parse_all("\u{FEFF}data: x\n\n");
        assert_eq!(events, vec![StreamEvent::message("x")]);
    }

    #[test]
    fn trailing_partial_event_is_discarded() {
        let mut parser = EventParser::new();
        let events = parser.feed("data: done\n\ndata: half");
        assert_eq!(events, vec![StreamEvent::message("done")]);
        assert!(matches!(parser.finish(), Err(Error::Parse(_))));
    }

    #[test]
    fn clean_end_finishes_ok() {
        let mut parser = EventParser::new();
        parser.feed(": keepalive\n\ndata: x\n\n");
        assert!(!parser.has_partial());
        assert!(parser.finish().is_ok());
    }
}
