//! services/api/src/adapters/sse.rs
//!
//! Line decoder for the server-sent-event body of a streamed chat
//! completion. Network chunks do not respect line boundaries (nor UTF-8
//! boundaries), so bytes are buffered until a full line is available.

use bytes::BytesMut;
use serde::Deserialize;

/// One meaningful line of the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// The payload of a `data:` line.
    Data(String),
    /// The `data: [DONE]` terminator.
    Done,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a network chunk and returns the events of every completed line.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(newline + 1);
            if let Some(event) = parse_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes a final line that was not terminated by a newline.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let rest = self.buffer.split();
        parse_line(&String::from_utf8_lossy(&rest))
    }
}

/// Comments (`:`), blank lines and fields other than `data` carry no text.
fn parse_line(line: &str) -> Option<SseEvent> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let data = line.strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        Some(SseEvent::Done)
    } else {
        Some(SseEvent::Data(data.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

/// Reads `choices[0].delta.content` from a `data:` payload.
///
/// `Ok(None)` for role-only or empty deltas; `Err` when the payload is not
/// a chunk object at all.
pub fn delta_content(data: &str) -> Result<Option<String>, serde_json::Error> {
    let chunk: StreamChunk = serde_json::from_str(data)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty()))
}
