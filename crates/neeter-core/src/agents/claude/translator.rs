//! Claude message translator.
//!
//! Turns raw [`AgentMessage`]s into canonical [`OutputEvent`]s.
//!
//! # How This Translator Works
//!
//! Each message is matched on its `type` (and for `stream_event`, on the
//! inner event type). The rules, first match wins:
//!
//! | input                                      | output                        |
//! |--------------------------------------------|-------------------------------|
//! | `stream_event/message_start`               | `message_start`               |
//! | `stream_event/content_block_start` tool_use| `tool_start` (opens the tool) |
//! | `stream_event/content_block_delta` text    | `text_delta`                  |
//! | `stream_event/content_block_delta` json    | `tool_input_delta` (open tool)|
//! | `assistant` with tool_use blocks           | `tool_call` per block         |
//! | `user` with tool_result blocks             | `tool_result` + hook customs  |
//! | `tool_progress`                            | `tool_progress`               |
//! | `result` success / other                   | `turn_complete` / `session_error` |
//! | anything else                              | nothing                       |
//!
//! # Correlation State
//!
//! Streaming JSON deltas do not repeat the tool id, so the translator
//! remembers the most recently opened tool per session and routes deltas to
//! it. It also remembers every tool id's name so the tool-result hook can be
//! told which tool produced a result, and which ids already had their
//! `tool_call`: a result for any other id is dropped. That is the only state
//! it keeps, and it is keyed by session id so one translator serves every
//! session.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::agents::event::{CustomEvent, OutputEvent};
use crate::session::{Session, SessionId};

use super::types::{AgentMessage, ContentBlock, StreamEvent};

/// Hook invoked after each tool result: `(tool_name, result, session)`.
///
/// Every returned entry becomes a `custom` event, in order, right after the
/// `tool_result` it belongs to.
pub type ToolResultHook<C> =
    Box<dyn Fn(&str, &str, &Session<C>) -> Vec<CustomEvent> + Send + Sync>;

/// Per-session correlation state.
#[derive(Debug, Default, Clone)]
struct ToolCorrelation {
    /// The open tool: `(id, name)` of the most recently started invocation.
    open: Option<(String, String)>,
    /// Tool names by invocation id, for resolving tool results.
    names: HashMap<String, String>,
    /// Ids that already had their `tool_call`; only these may get a result.
    called: HashSet<String>,
}

impl ToolCorrelation {
    fn open_tool(&mut self, id: &str, name: &str) {
        self.open = Some((id.to_string(), name.to_string()));
        self.names.insert(id.to_string(), name.to_string());
    }
}

/// Maps raw agent messages to canonical output events.
///
/// Translation itself never blocks or awaits; the only side effect is the
/// tiny per-session correlation state.
pub struct MessageTranslator<C> {
    on_tool_result: Option<ToolResultHook<C>>,
    correlation: Mutex<HashMap<SessionId, ToolCorrelation>>,
}

impl<C> Default for MessageTranslator<C> {
    fn default() -> Self {
        Self {
            on_tool_result: None,
            correlation: Mutex::new(HashMap::new()),
        }
    }
}

impl<C> MessageTranslator<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a translator with a tool-result hook.
    pub fn with_tool_result_hook<F>(hook: F) -> Self
    where
        F: Fn(&str, &str, &Session<C>) -> Vec<CustomEvent> + Send + Sync + 'static,
    {
        Self {
            on_tool_result: Some(Box::new(hook)),
            ..Self::default()
        }
    }

    /// Translate one raw message into zero or more events, in emission order.
    pub fn translate(&self, message: &AgentMessage, session: &Session<C>) -> Vec<OutputEvent> {
        match message.message_type.as_str() {
            "stream_event" => match &message.event {
                Some(event) => self.translate_stream_event(event, session.id()),
                None => Vec::new(),
            },
            "assistant" => self.translate_tool_calls(message, session.id()),
            "user" => self.translate_tool_results(message, session),
            "tool_progress" => vec![OutputEvent::ToolProgress {
                tool_name: message.tool_name.clone().unwrap_or_default(),
                elapsed: message.elapsed_time_seconds.unwrap_or(0.0),
            }],
            "result" => vec![translate_result(message)],
            // Unknown types are protocol evolution, not errors
            _ => Vec::new(),
        }
    }

    /// Parse one JSON line and translate it. Malformed lines yield nothing.
    pub fn translate_line(&self, line: &str, session: &Session<C>) -> Vec<OutputEvent> {
        match AgentMessage::parse_line(line) {
            Some(message) => self.translate(&message, session),
            None => {
                log::debug!("Ignoring unparseable agent line for session {}", session.id());
                Vec::new()
            }
        }
    }

    /// The `(id, name)` of the session's open tool, if any.
    pub fn open_tool(&self, session_id: &SessionId) -> Option<(String, String)> {
        self.correlation
            .lock()
            .unwrap()
            .get(session_id)
            .and_then(|state| state.open.clone())
    }

    /// Drop all correlation state for a session (after eviction).
    pub fn forget(&self, session_id: &SessionId) {
        self.correlation.lock().unwrap().remove(session_id);
    }

    fn translate_stream_event(&self, event: &StreamEvent, session_id: &SessionId) -> Vec<OutputEvent> {
        match event.event_type.as_str() {
            "message_start" => vec![OutputEvent::MessageStart {}],

            "content_block_start" => {
                let block = match &event.content_block {
                    Some(block) if block.block_type == "tool_use" => block,
                    _ => return Vec::new(),
                };
                let (id, name) = match (&block.id, &block.name) {
                    (Some(id), Some(name)) => (id, name),
                    _ => return Vec::new(),
                };

                self.with_correlation(session_id, |state| state.open_tool(id, name));
                vec![OutputEvent::ToolStart {
                    id: id.clone(),
                    name: name.clone(),
                }]
            }

            "content_block_delta" => {
                let delta = match &event.delta {
                    Some(delta) => delta,
                    None => return Vec::new(),
                };

                match delta.delta_type.as_str() {
                    "text_delta" => match &delta.text {
                        Some(text) => vec![OutputEvent::TextDelta { text: text.clone() }],
                        None => Vec::new(),
                    },
                    "input_json_delta" => {
                        let partial_json = delta.partial_json.clone().unwrap_or_default();
                        match self.open_tool(session_id) {
                            Some((id, _)) => vec![OutputEvent::ToolInputDelta { id, partial_json }],
                            None => {
                                log::debug!(
                                    "Dropping input_json_delta with no open tool in session {}",
                                    session_id
                                );
                                Vec::new()
                            }
                        }
                    }
                    _ => Vec::new(),
                }
            }

            _ => Vec::new(),
        }
    }

    fn translate_tool_calls(&self, message: &AgentMessage, session_id: &SessionId) -> Vec<OutputEvent> {
        let tool_uses: Vec<(&str, &str, &ContentBlock)> = tool_blocks(message, "tool_use")
            .filter_map(|block| match (&block.id, &block.name) {
                (Some(id), Some(name)) => Some((id.as_str(), name.as_str(), block)),
                _ => None,
            })
            .collect();

        if tool_uses.is_empty() {
            return Vec::new();
        }

        self.with_correlation(session_id, |state| {
            for (id, name, _) in &tool_uses {
                state.open_tool(id, name);
                state.called.insert(id.to_string());
            }
        });

        tool_uses
            .into_iter()
            .map(|(id, name, block)| OutputEvent::ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                input: block
                    .input
                    .clone()
                    .unwrap_or_else(|| serde_json::Value::Object(Default::default())),
            })
            .collect()
    }

    fn translate_tool_results(&self, message: &AgentMessage, session: &Session<C>) -> Vec<OutputEvent> {
        let mut events = Vec::new();

        for block in tool_blocks(message, "tool_result") {
            let tool_use_id = match &block.tool_use_id {
                Some(id) => id.clone(),
                None => continue,
            };
            let result = block.result_text();

            // Resolve the name first; the hook runs without the lock held
            let called = self
                .correlation
                .lock()
                .unwrap()
                .get(session.id())
                .filter(|state| state.called.contains(&tool_use_id))
                .map(|state| state.names.get(&tool_use_id).cloned());
            let tool_name = match called {
                Some(name) => name,
                None => {
                    log::debug!(
                        "Dropping tool_result for {} with no tool_call in session {}",
                        tool_use_id,
                        session.id()
                    );
                    continue;
                }
            };

            events.push(OutputEvent::ToolResult {
                tool_use_id,
                result: result.clone(),
            });

            if let (Some(hook), Some(tool_name)) = (&self.on_tool_result, tool_name) {
                events.extend(hook(&tool_name, &result, session).into_iter().map(OutputEvent::from));
            }
        }

        events
    }

    fn with_correlation<R>(&self, session_id: &SessionId, f: impl FnOnce(&mut ToolCorrelation) -> R) -> R {
        let mut map = self.correlation.lock().unwrap();
        f(map.entry(session_id.clone()).or_default())
    }
}

/// Content blocks of the given type in an `assistant`/`user` message.
fn tool_blocks<'a>(message: &'a AgentMessage, block_type: &'a str) -> impl Iterator<Item = &'a ContentBlock> + 'a {
    message
        .message
        .iter()
        .flat_map(|body| body.content.blocks().iter())
        .filter(move |block| block.block_type == block_type)
}

fn translate_result(message: &AgentMessage) -> OutputEvent {
    match message.subtype.as_deref() {
        Some("success") => OutputEvent::TurnComplete {
            num_turns: message.num_turns.unwrap_or(0),
            cost: message.total_cost_usd.unwrap_or(0.0),
        },
        other => OutputEvent::SessionError {
            subtype: other.unwrap_or("unknown").to_string(),
        },
    }
}

// ============================================================================
// TESTS
// ============================================================================
