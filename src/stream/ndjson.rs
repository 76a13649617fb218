//! Newline-delimited JSON parser for Ollama's chat endpoint, which streams
//! one complete JSON object per line rather than SSE framing.

#[derive(Default)]
pub struct NdjsonParser {
    buffer: String,
}

impl NdjsonParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every complete line found so far, with
    /// trailing whitespace trimmed. Blank lines are skipped.
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);
        let mut lines = Vec::new();
        loop {
            let Some(pos) = self.buffer.find('\n') else {
                break;
            };
            let line = self.buffer[..pos].trim().to_string();
            self.buffer.drain(..=pos);
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }
}
