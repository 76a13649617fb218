//! Incremental line-based SSE parser, for providers that speak
//! Server-Sent Events (OpenAI family, Anthropic, Gemini). Feeds on
//! arbitrarily-chunked text and emits only complete events, buffering
//! partial lines across calls.

/// One parsed SSE event: an optional named `event:` type and its (possibly
/// multi-line, newline-joined) `data:` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// `true` when `event`'s data payload is the OpenAI-style `[DONE]`
/// sentinel.
#[must_use]
pub fn is_done_event(event: &SseEvent) -> bool {
    event.data.trim() == "[DONE]"
}

#[derive(Default)]
pub struct SseParser {
    buffer: String,
    event_type: Option<String>,
    data_lines: Vec<String>,
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of text (already UTF-8 decoded by the caller) and
    /// return every complete event found so far. Incomplete trailing data
    /// is retained for the next call.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        loop {
            let Some(newline_pos) = self.buffer.find('\n') else {
                break;
            };
            let mut line = self.buffer[..newline_pos].to_string();
            self.buffer.drain(..=newline_pos);
            if line.ends_with('\r') {
                line.pop();
            }
            self.process_line(&line, &mut events);
        }
        events
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<SseEvent>) {
        if line.is_empty() {
            if !self.data_lines.is_empty() {
                events.push(SseEvent {
                    event: self.event_type.take(),
                    data: self.data_lines.join("\n"),
                });
                self.data_lines.clear();
            }
            self.event_type = None;
            return;
        }
        if line.starts_with(':') {
            return;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            self.event_type = Some(rest.trim_start().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            self.data_lines.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
        }
        // id:/retry: fields are accepted per the SSE grammar but unused by
        // any supported provider; silently ignored rather than rejected.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_simple_event() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: {\"a\":1}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "{\"a\":1}");
        assert_eq!(events[0].event, None);
    }

    #[test]
    fn parses_named_event_type() {
        let mut parser = SseParser::new();
        let events = parser.feed("event: message_start\ndata: {}\n\n");
        assert_eq!(events[0].event.as_deref(), Some("message_start"));
    }

    #[test]
    fn joins_multiline_data_with_newline() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: line1\ndata: line2\n\n");
        assert_eq!(events[0].data, "line1\nline2");
    }

    #[test]
    fn handles_incremental_chunk_boundaries() {
        let mut parser = SseParser::new();
        assert!(parser.feed("data: {\"a").is_empty());
        assert!(parser.feed("\":1}").is_empty());
        let events = parser.feed("\n\n");
        assert_eq!(events[0].data, "{\"a\":1}");
    }

    #[test]
    fn handles_crlf_line_endings() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: hi\r\n\r\n");
        assert_eq!(events[0].data, "hi");
    }

    #[test]
    fn ignores_comment_lines() {
        let mut parser = SseParser::new();
        let events = parser.feed(": keep-alive\ndata: hi\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hi");
    }

    #[test]
    fn detects_done_sentinel() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: [DONE]\n\n");
        assert!(is_done_event(&events[0]));
    }

    #[test]
    fn two_events_in_one_chunk_both_parse() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: one\n\ndata: two\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "one");
        assert_eq!(events[1].data, "two");
    }
}
