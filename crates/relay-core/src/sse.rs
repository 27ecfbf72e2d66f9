//! Incremental decoder for upstream Server-Sent-Events bodies.
//!
//! Bytes are buffered until a blank line terminates an event, so events
//! split across network chunks (including multi-byte UTF-8 sequences) are
//! reassembled before decoding.

/// One decoded upstream event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, if present
    pub event: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
    /// Value of the `id:` field, if present
    pub id: Option<String>,
    /// Any other named fields, in arrival order (e.g. Zhipu's `meta:`)
    pub fields: Vec<(String, String)>,
}

impl SseEvent {
    /// Value of a non-standard field
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Buffering SSE decoder
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Create an empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of body bytes and return every event it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend(chunk.iter().filter(|b| **b != b'\r'));

        let mut events = Vec::new();
        while let Some(pos) = find_blank_line(&self.buffer) {
            let raw: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            if let Some(event) = parse_event(&raw[..pos]) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing event that was not terminated by a blank line
    pub fn finish(&mut self) -> Option<SseEvent> {
        let raw = std::mem::take(&mut self.buffer);
        parse_event(&raw)
    }
}

fn find_blank_line(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn parse_event(raw: &[u8]) -> Option<SseEvent> {
    let text = String::from_utf8_lossy(raw);
    let mut event = SseEvent::default();
    let mut data_lines = Vec::new();

    for line in text.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);

        match field {
            "event" => event.event = Some(value.to_string()),
            "data" => data_lines.push(value.to_string()),
            "id" => event.id = Some(value.to_string()),
            "retry" => {}
            other => event.fields.push((other.to_string(), value.to_string())),
        }
    }

    if data_lines.is_empty() && event.event.is_none() && event.fields.is_empty() {
        return None;
    }

    event.data = data_lines.join("\n");
    Some(event)
}
