//! Claude stream-json message types.
//!
//! # Purpose
//!
//! These structs mirror the JSON lines the Claude CLI writes to stdout when
//! run with `--output-format stream-json --include-partial-messages`. Every
//! line is one [`AgentMessage`]. The vocabulary keeps growing, so parsing is
//! deliberately lenient:
//!
//! - only `type` is required
//! - every other field is `Option` with `#[serde(default)]`
//! - unknown fields are ignored
//!
//! # Example
//!
//! ```json
//! {"type":"stream_event","event":{"type":"content_block_delta","delta":{"type":"text_delta","text":"Hi"}}}
//! {"type":"assistant","message":{"role":"assistant","content":[{"type":"tool_use","id":"t1","name":"Read","input":{}}]}}
//! {"type":"result","subtype":"success","num_turns":1,"total_cost_usd":0.01}
//! ```

use serde::{Deserialize, Serialize};

/// One raw message from the agent process.
///
/// Different message types populate different optional fields:
///
/// | `type`            | fields                                           |
/// |-------------------|--------------------------------------------------|
/// | `stream_event`    | `event`                                          |
/// | `assistant`/`user`| `message`                                        |
/// | `tool_progress`   | `tool_name`, `elapsed_time_seconds`              |
/// | `result`          | `subtype`, `num_turns`, `total_cost_usd`         |
/// | `control_request` | `request_id`, `request`                          |
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    /// The message type.
    ///
    /// # Rust Concept: #[serde(rename = "...")]
    ///
    /// The JSON key is "type", which is a reserved keyword in Rust, so the
    /// field gets a different name and `rename` maps it back.
    #[serde(rename = "type")]
    pub message_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// ID of the parent Task tool_use for subagent messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,

    /// The wrapped Anthropic streaming event (for `stream_event`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<StreamEvent>,

    /// A complete message with content blocks (for `assistant` and `user`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageBody>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_time_seconds: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_turns: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,

    /// Final text of a `result` message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Permission request details (for `control_request`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<ControlRequest>,
}

impl AgentMessage {
    /// A bare message of the given type, every other field empty.
    pub fn new(message_type: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            ..Default::default()
        }
    }

    /// A `result` message with a non-success subtype, used to surface agent
    /// failures that the agent itself never reported.
    pub fn error_result(subtype: impl Into<String>) -> Self {
        Self {
            subtype: Some(subtype.into()),
            is_error: Some(true),
            ..Self::new("result")
        }
    }

    /// Parse one stdout line. Returns `None` for anything that is not a JSON
    /// object with a string `type`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        serde_json::from_str(trimmed).ok()
    }
}

/// The Anthropic streaming event inside a `stream_event` message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// `message_start`, `content_block_start`, `content_block_delta`, ...
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_block: Option<ContentBlock>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<Delta>,
}

/// A complete message with its content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default)]
    pub content: MessageContent,
}

/// Message content is either a plain string or a list of blocks.
///
/// # Rust Concept: #[serde(untagged)]
///
/// An untagged enum tries each variant in order and keeps the first that
/// deserializes, so `"hi"` becomes `Text` and `[...]` becomes `Blocks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Blocks(Vec::new())
    }
}

impl MessageContent {
    /// The content blocks; a plain-string body has none.
    pub fn blocks(&self) -> &[ContentBlock] {
        match self {
            MessageContent::Text(_) => &[],
            MessageContent::Blocks(blocks) => blocks,
        }
    }
}

/// A content block (text, thinking, tool_use, tool_result).
///
/// All type-specific fields are optional so one struct covers every block
/// type:
/// - text: `text`
/// - tool_use: `id`, `name`, `input`
/// - tool_result: `tool_use_id`, `content`, `is_error`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,

    /// Tool result content: a string, or a list of content blocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ContentBlock {
    /// Tool result content flattened to a string.
    ///
    /// Strings pass through verbatim. Arrays of text blocks are concatenated.
    /// Anything else is JSON-encoded, and a missing body becomes "".
    pub fn result_text(&self) -> String {
        match &self.content {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Array(items)) => {
                let texts: Vec<&str> = items
                    .iter()
                    .filter(|item| item.get("type").and_then(|t| t.as_str()) == Some("text"))
                    .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
                    .collect();
                if texts.len() == items.len() && !texts.is_empty() {
                    texts.concat()
                } else {
                    serde_json::Value::Array(items.clone()).to_string()
                }
            }
            Some(other) => other.to_string(),
        }
    }
}

/// Incremental update inside a `content_block_delta` event.
///
/// - `text_delta`: a chunk of assistant text in `text`
/// - `input_json_delta`: a fragment of tool input JSON in `partial_json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(rename = "type")]
    pub delta_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_json: Option<String>,
}

/// A control request from the agent: a permission prompt or a hook callback.
///
/// ```json
/// {"subtype": "can_use_tool", "tool_name": "Write", "input": {"file_path": "/tmp/x"}}
/// {"subtype": "hook_callback", "callback_id": "sandbox_pre_tool_use",
///  "input": {"hook_event_name": "PreToolUse", "tool_name": "Read", "tool_input": {..}}}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlRequest {
    pub subtype: String,

    #[serde(default)]
    pub tool_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,

    /// Which registered hook fired (for `hook_callback`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_id: Option<String>,
}

// ============================================================================
// TESTS
// ============================================================================
