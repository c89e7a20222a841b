//! Server-sent-event framing for [`OutputEvent`]s.
//!
//! One event is one frame:
//!
//! ```text
//! event: tool_result
//! data: {"toolUseId":"t-2","result":"42"}
//!
//! ```
//!
//! The encoder is pure and total. The decoder is for consumers of the feed
//! (the client dispatcher, tests) and tolerates the extras a real SSE
//! server adds: comments, `id:`/`retry:` lines and CRLF line endings.

use thiserror::Error;

use crate::agents::event::{OutputEvent, EVENT_KINDS};

#[derive(Error, Debug)]
pub enum WireError {
    #[error("Unknown event kind: {0}")]
    UnknownKind(String),

    #[error("Frame has no event line")]
    MissingEvent,

    #[error("Invalid event payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// An `(event, data)` pair, the unit an SSE frame carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

impl From<&OutputEvent> for SseEvent {
    fn from(event: &OutputEvent) -> Self {
        SseEvent {
            event: event.kind().to_string(),
            data: event.payload().to_string(),
        }
    }
}

pub fn to_sse(event: &OutputEvent) -> SseEvent {
    SseEvent::from(event)
}

/// Encode an event as one complete SSE frame.
pub fn encode(event: &OutputEvent) -> String {
    encode_sse(&to_sse(event))
}

pub fn encode_sse(sse: &SseEvent) -> String {
    format!("event: {}\ndata: {}\n\n", sse.event, sse.data)
}

/// Parse one frame (without its trailing blank line) back into an event.
pub fn decode_frame(frame: &str) -> Result<OutputEvent, WireError> {
    let mut kind: Option<&str> = None;
    let mut data: Vec<&str> = Vec::new();

    for line in frame.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => kind = Some(value),
            "data" => data.push(value),
            // id, retry and unknown fields carry nothing for us
            _ => {}
        }
    }

    let kind = kind.ok_or(WireError::MissingEvent)?;
    if !EVENT_KINDS.contains(&kind) {
        return Err(WireError::UnknownKind(kind.to_string()));
    }

    let payload: serde_json::Value = if data.is_empty() {
        serde_json::Value::Object(Default::default())
    } else {
        serde_json::from_str(&data.join("\n"))?
    };

    let tagged = serde_json::json!({ "event": kind, "data": payload });
    Ok(serde_json::from_value(tagged)?)
}

/// Incremental frame decoder for a chunked byte stream.
///
/// Chunks may split frames anywhere; incomplete data is buffered until the
/// blank line that ends its frame arrives.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: String,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every frame it completed, in order.
    pub fn feed(&mut self, chunk: &str) -> Vec<Result<OutputEvent, WireError>> {
        self.buffer.push_str(chunk);

        // Normalized on the whole buffer: a chunk may end between `\r` and `\n`
        let buffer = std::mem::take(&mut self.buffer).replace("\r\n", "\n");
        let mut frames: Vec<&str> = buffer.split("\n\n").collect();

        // The last piece has not seen its terminator yet
        if let Some(incomplete) = frames.pop() {
            self.buffer = incomplete.to_string();
        }

        frames
            .into_iter()
            .filter(|frame| !is_blank(frame))
            .map(decode_frame)
            .collect()
    }

    /// Decode whatever is left once the stream has ended.
    pub fn flush(&mut self) -> Option<Result<OutputEvent, WireError>> {
        let rest = std::mem::take(&mut self.buffer);
        if is_blank(&rest) {
            None
        } else {
            Some(decode_frame(&rest))
        }
    }
}

/// Whether a frame has nothing but whitespace and comments.
fn is_blank(frame: &str) -> bool {
    frame
        .lines()
        .all(|line| line.trim().is_empty() || line.starts_with(':'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    mod encode {
        use super::*;

        #[test]
        fn sse_pair_formats_frame() {
            let frame = encode_sse(&SseEvent {
                event: "text_delta".to_string(),
                data: r#"{"text":"hi"}"#.to_string(),
            });
            assert_eq!(frame, "event: text_delta\ndata: {\"text\":\"hi\"}\n\n");
        }

        #[test]
        fn message_start_has_empty_object_payload() {
            assert_eq!(
                encode(&OutputEvent::MessageStart {}),
                "event: message_start\ndata: {}\n\n"
            );
        }

        #[test]
        fn payload_keeps_field_order() {
            let event = OutputEvent::ToolCall {
                id: "t-1".into(),
                name: "fetch".into(),
                input: json!({"url": "https://x"}),
            };
            assert_eq!(
                encode(&event),
                "event: tool_call\ndata: {\"id\":\"t-1\",\"name\":\"fetch\",\"input\":{\"url\":\"https://x\"}}\n\n"
            );
        }

        #[test]
        fn newlines_in_text_stay_escaped() {
            let frame = encode(&OutputEvent::TextDelta { text: "a\nb".into() });
            assert_eq!(frame.matches('\n').count(), 3);
        }
    }

    mod decode {
        use super::*;

        #[test]
        fn decodes_encoded_event() {
            let event = OutputEvent::ToolResult {
                tool_use_id: "t-2".into(),
                result: "42".into(),
            };
            let frame = encode(&event);
            assert_eq!(decode_frame(frame.trim_end()).unwrap(), event);
        }

        #[test]
        fn ignores_comments_and_ids() {
            let frame = ": keep-alive\nid: 7\nretry: 1000\nevent: turn_complete\ndata: {\"numTurns\":2,\"cost\":0.5}";
            assert_eq!(
                decode_frame(frame).unwrap(),
                OutputEvent::TurnComplete { num_turns: 2, cost: 0.5 }
            );
        }

        #[test]
        fn joins_multiple_data_lines() {
            let frame = "event: custom\ndata: {\"name\":\"x\",\ndata: \"value\":1}";
            assert_eq!(
                decode_frame(frame).unwrap(),
                OutputEvent::Custom { name: "x".into(), value: json!(1) }
            );
        }

        #[test]
        fn rejects_unknown_kind() {
            match decode_frame("event: telemetry\ndata: {}") {
                Err(WireError::UnknownKind(kind)) => assert_eq!(kind, "telemetry"),
                other => panic!("Expected UnknownKind, got {:?}", other),
            }
        }

        #[test]
        fn rejects_bad_json() {
            assert!(matches!(
                decode_frame("event: text_delta\ndata: {oops"),
                Err(WireError::Json(_))
            ));
        }

        #[test]
        fn rejects_missing_event_line() {
            assert!(matches!(decode_frame("data: {}"), Err(WireError::MissingEvent)));
        }
    }

    mod frame_decoder {
        use super::*;

        #[test]
        fn reassembles_split_frames() {
            let mut decoder = FrameDecoder::new();
            let stream = format!(
                "{}{}",
                encode(&OutputEvent::MessageStart {}),
                encode(&OutputEvent::TextDelta { text: "hello".into() })
            );
            let (a, b) = stream.split_at(17);

            let first = decoder.feed(a);
            let second = decoder.feed(b);

            assert!(first.is_empty());
            let events: Vec<OutputEvent> = second.into_iter().map(Result::unwrap).collect();
            assert_eq!(
                events,
                vec![
                    OutputEvent::MessageStart {},
                    OutputEvent::TextDelta { text: "hello".into() }
                ]
            );
            assert!(decoder.flush().is_none());
        }

        #[test]
        fn handles_crlf() {
            let mut decoder = FrameDecoder::new();
            let events = decoder.feed("event: message_start\r\ndata: {}\r\n\r\n");
            assert_eq!(events.len(), 1);
            assert!(events[0].is_ok());
        }

        #[test]
        fn crlf_terminator_split_across_chunks() {
            let mut decoder = FrameDecoder::new();
            assert!(decoder.feed("event: message_start\r\ndata: {}\r\n\r").is_empty());

            let events: Vec<OutputEvent> = decoder
                .feed("\nevent: text_delta\r\ndata: {\"text\":\"hi\"}\r\n\r\n")
                .into_iter()
                .map(Result::unwrap)
                .collect();
            assert_eq!(
                events,
                vec![
                    OutputEvent::MessageStart {},
                    OutputEvent::TextDelta { text: "hi".into() }
                ]
            );
            assert!(decoder.flush().is_none());
        }

        #[test]
        fn skips_keep_alive_comments() {
            let mut decoder = FrameDecoder::new();
            assert!(decoder.feed(":\n\n").is_empty());
        }

        #[test]
        fn flush_decodes_unterminated_tail() {
            let mut decoder = FrameDecoder::new();
            assert!(decoder.feed("event: session_error\ndata: {\"subtype\":\"max_turns\"}").is_empty());
            assert_eq!(
                decoder.flush().unwrap().unwrap(),
                OutputEvent::SessionError { subtype: "max_turns".into() }
            );
        }
    }
}
