//! Canonical client-facing event type.
//!
//! Whatever the agent protocol looks like this week, the browser only ever
//! sees these ten kinds. Adding a kind is a protocol change; the translator
//! never emits anything else.

use serde::{Deserialize, Serialize};

/// All event kinds, in the order they are declared on [`OutputEvent`].
pub const EVENT_KINDS: [&str; 10] = [
    "message_start",
    "text_delta",
    "tool_start",
    "tool_input_delta",
    "tool_call",
    "tool_progress",
    "tool_result",
    "turn_complete",
    "session_error",
    "custom",
];

/// A synthetic event injected by the caller after a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomEvent {
    pub name: String,
    pub value: serde_json::Value,
}

impl CustomEvent {
    pub fn new(name: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// One canonical output event.
///
/// Serialized adjacently tagged, `{"event": <kind>, "data": <payload>}`,
/// which is exactly the shape the wire encoder splits into an SSE frame.
/// Payload fields appear in declaration order (serde_json `preserve_order`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutputEvent {
    /// The agent started a new assistant message. Payload is `{}`.
    MessageStart {},

    TextDelta {
        text: String,
    },

    ToolStart {
        id: String,
        name: String,
    },

    /// A fragment of tool input JSON, routed to the most recently opened tool.
    #[serde(rename_all = "camelCase")]
    ToolInputDelta {
        id: String,
        partial_json: String,
    },

    /// The finalized, structured tool invocation.
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    #[serde(rename_all = "camelCase")]
    ToolProgress {
        tool_name: String,
        #[serde(serialize_with = "whole_as_integer")]
        elapsed: f64,
    },

    #[serde(rename_all = "camelCase")]
    ToolResult {
        tool_use_id: String,
        result: String,
    },

    #[serde(rename_all = "camelCase")]
    TurnComplete {
        num_turns: u32,
        #[serde(serialize_with = "whole_as_integer")]
        cost: f64,
    },

    SessionError {
        subtype: String,
    },

    Custom {
        name: String,
        value: serde_json::Value,
    },
}

impl OutputEvent {
    /// The wire name of this event's kind.
    pub fn kind(&self) -> &'static str {
        match self {
            OutputEvent::MessageStart {} => "message_start",
            OutputEvent::TextDelta { .. } => "text_delta",
            OutputEvent::ToolStart { .. } => "tool_start",
            OutputEvent::ToolInputDelta { .. } => "tool_input_delta",
            OutputEvent::ToolCall { .. } => "tool_call",
            OutputEvent::ToolProgress { .. } => "tool_progress",
            OutputEvent::ToolResult { .. } => "tool_result",
            OutputEvent::TurnComplete { .. } => "turn_complete",
            OutputEvent::SessionError { .. } => "session_error",
            OutputEvent::Custom { .. } => "custom",
        }
    }

    /// The JSON payload. Always an object, `{}` when there is nothing to say.
    pub fn payload(&self) -> serde_json::Value {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(mut map)) => map
                .remove("data")
                .filter(|data| data.is_object())
                .unwrap_or_else(empty_object),
            _ => empty_object(),
        }
    }

    /// The tool invocation id this event belongs to, if any.
    pub fn tool_id(&self) -> Option<&str> {
        match self {
            OutputEvent::ToolStart { id, .. }
            | OutputEvent::ToolInputDelta { id, .. }
            | OutputEvent::ToolCall { id, .. } => Some(id.as_str()),
            OutputEvent::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
            _ => None,
        }
    }
}

impl From<CustomEvent> for OutputEvent {
    fn from(event: CustomEvent) -> Self {
        OutputEvent::Custom {
            name: event.name,
            value: event.value,
        }
    }
}

/// Whole numbers go out as `5`, not `5.0`, the way a JavaScript client
/// would write them.
fn whole_as_integer<S: serde::Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}
