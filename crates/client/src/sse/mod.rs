//! Server-push event stream handling: incremental parsing and the stored
//! event log format.

pub mod codec;
pub mod parser;

pub use codec::{RECORD_CONTENT_TYPE, ReplayStream, render_event};
pub use parser::{EventParser, parse_all};
