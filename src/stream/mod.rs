pub mod ndjson;
pub mod sse;

pub use ndjson::NdjsonParser;
pub use sse::{is_done_event, SseEvent, SseParser};
