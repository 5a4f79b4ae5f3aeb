use futures_util::StreamExt;
use proptest::prelude::*;
use swcache_client::ReplayStream;
use swcache_client::sse::{codec, parse_all};
use swcache_core::StreamEvent;

fn event_strategy() -> impl Strategy<Value = StreamEvent> {
    (
        proptest::option::of(proptest::string::string_regex("[a-z_]{1,10}").expect("type regex")),
        proptest::collection::vec(proptest::string::string_regex("[ -~\u{e9}\u{1F680}\r]{0,16}").expect("data regex"), 1..4),
        proptest::option::of(proptest::string::string_regex("[a-zA-Z0-9-]{0,8}").expect("id regex")),
        proptest::option::of(proptest::string::string_regex("[0-9]{1,6}").expect("retry regex")),
    )
        .prop_map(|(event_type, lines, id, retry)| {
            let mut event = StreamEvent::message(lines.join("\n"));
            if let Some(t) = event_type {
                event = event.with_type(t);
            }
            event.id = id;
            event.retry = retry;
            event
        })
}

/// Line endings inside `data` come back as `\n` after a wire trip.
fn normalized(events: Vec<StreamEvent>) -> Vec<StreamEvent> {
    events
        .into_iter()
        .map(|mut event| {
            event.data = event.data.replace("\r\n", "\n").replace('\r', "\n");
            event
        })
        .collect()
}

fn replay_text(events: Vec<StreamEvent>) -> String {
    let runtime = tokio::runtime::Builder::new_current_thread().build().expect("runtime");
    runtime.block_on(async {
        let chunks: Vec<_> = ReplayStream::new(events).collect().await;
        chunks.into_iter().map(|c| String::from_utf8(c.expect("replay chunk").to_vec()).expect("utf-8")).collect()
    })
}

proptest! {
    #[test]
    fn stored_log_replays_to_identical_events(events in proptest::collection::vec(event_strategy(), 0..8)) {
        let record = codec::to_record("https://example.com/events", &events).expect("encode");
        let stored = codec::from_record(&record).expect("decode");
        prop_assert_eq!(&stored, &events);

        let wire = replay_text(stored);
        prop_assert_eq!(parse_all(&wire), normalized(events));
    }

    #[test]
    fn default_type_is_never_written(data in "[a-z]{1,8}") {
        let wire = codec::render_event(&StreamEvent::message(data.clone()));
        prop_assert!(!wire.contains("event:"));
        prop_assert_eq!(wire, format!("data: {data}\n\n"));
    }
}
