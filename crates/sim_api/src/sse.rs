use serde_json::Value;

use crate::events::{decode_event, DecodedEvent};

/// Incremental parser for server-sent-event text streams.
///
/// The event name comes from the frame's `event:` line, falling back to a
/// `type` field in the JSON body. Comment frames, keep-alives, malformed
/// JSON, and unknown event names are skipped.
///
/// Bytes are buffered raw and only complete frames are decoded as UTF-8, so
/// a multibyte character split across network chunks survives intact.
#[derive(Debug, Default)]
pub struct SseStreamParser {
    buffer: Vec<u8>,
}

impl SseStreamParser {
    /// Feed arbitrary bytes into the parser and drain complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<DecodedEvent> {
        self.buffer
            .extend(bytes.iter().copied().filter(|byte| *byte != b'\r'));
        let mut events = Vec::new();

        while let Some(split) = frame_end(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..split + 2).collect();
            let frame = String::from_utf8_lossy(&frame[..split]);

            if let Some(event) = parse_frame(&frame) {
                events.push(event);
            }
        }

        events
    }

    /// Parse a complete SSE payload string in one shot.
    pub fn parse_frames(input: &str) -> Vec<DecodedEvent> {
        let mut parser = Self::default();
        parser.feed(input.as_bytes())
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
    }
}

fn frame_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|window| window == b"\n\n")
}

fn parse_frame(frame: &str) -> Option<DecodedEvent> {
    let mut name = None;
    let mut data_lines = Vec::new();

    for line in frame.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            name = Some(value.trim());
        } else if let Some(value) = line.strip_prefix("data:") {
            let value = value.trim();
            if !value.is_empty() {
                data_lines.push(value);
            }
        }
    }

    if data_lines.is_empty() {
        return None;
    }

    let payload: Value = serde_json::from_str(&data_lines.join("\n")).ok()?;
    let name = match name {
        Some(name) => name.to_string(),
        None => payload.get("type")?.as_str()?.to_string(),
    };

    decode_event(&name, &payload)
}
