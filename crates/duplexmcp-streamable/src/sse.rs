//! Server-Sent Events encoding and incremental decoding.
//!
//! Pure, no-I/O SSE handling shared by the server (encoding outbound events)
//! and the client (parsing response bodies chunk by chunk). Only the fields
//! this transport uses are modeled: `id`, `event`, and `data`.

/// One Server-Sent Event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseEvent {
    /// Event ID, carried for resumption.
    pub id: Option<String>,
    /// Event type; absent means the default "message".
    pub event: Option<String>,
    /// Event data; multiline data spans several `data:` lines.
    pub data: String,
}

impl SseEvent {
    /// A plain message event.
    pub fn message(data: impl Into<String>) -> Self {
        Self {
            id: None,
            event: None,
            data: data.into(),
        }
    }

    /// A message event tagged with an ID.
    pub fn with_id(id: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            event: None,
            data: data.into(),
        }
    }
}

/// Encode an event in wire format, terminated by a blank line.
pub fn encode_event(event: &SseEvent) -> String {
    let mut output = String::new();
    if let Some(id) = &event.id {
        output.push_str("id: ");
        output.push_str(id);
        output.push('\n');
    }
    if let Some(kind) = &event.event {
        output.push_str("event: ");
        output.push_str(kind);
        output.push('\n');
    }
    if event.data.is_empty() {
        output.push_str("data: \n");
    } else {
        for line in event.data.lines() {
            output.push_str("data: ");
            output.push_str(line);
            output.push('\n');
        }
    }
    output.push('\n');
    output
}

/// Incremental SSE parser.
///
/// Feed body chunks as they arrive; complete events come out as soon as
/// their terminating blank line is seen. Comment lines (leading `:`) are
/// keepalives and are ignored.
#[derive(Default)]
pub struct SseParser {
    buffer: String,
    current_id: Option<String>,
    current_event: Option<String>,
    current_data: Vec<String>,
    last_event_id: Option<String>,
}

impl SseParser {
    /// Create an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning any events completed by them.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(event) = self.take_event() {
                    events.push(event);
                }
            } else if line.starts_with(':') {
                // Comment / keepalive.
            } else if let Some((field, value)) = line.split_once(':') {
                let value = value.strip_prefix(' ').unwrap_or(value);
                match field {
                    "id" => self.current_id = Some(value.to_string()),
                    "event" => self.current_event = Some(value.to_string()),
                    "data" => self.current_data.push(value.to_string()),
                    _ => {}
                }
            } else {
                match line {
                    "id" => self.current_id = Some(String::new()),
                    "event" => self.current_event = Some(String::new()),
                    "data" => self.current_data.push(String::new()),
                    _ => {}
                }
            }
        }
        events
    }

    fn take_event(&mut self) -> Option<SseEvent> {
        if self.current_data.is_empty() {
            self.current_id = None;
            self.current_event = None;
            return None;
        }
        let event = SseEvent {
            id: self.current_id.take(),
            event: self.current_event.take(),
            data: self.current_data.join("\n"),
        };
        if let Some(id) = &event.id {
            self.last_event_id = Some(id.clone());
        }
        self.current_data.clear();
        Some(event)
    }

    /// The ID of the last complete event seen, for `Last-Event-ID` headers.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }
}
