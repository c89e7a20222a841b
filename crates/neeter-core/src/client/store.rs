//! Chat store: the client-side mirror of one session's conversation.
//!
//! All mutation goes through named actions. Each action that changes state
//! notifies every listener exactly once, after the change, with a snapshot.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of one tool invocation as the client sees it.
///
/// `pending → streaming_input → running → complete | error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallPhase {
    Pending,
    StreamingInput,
    Running,
    Complete,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallInfo {
    pub id: String,
    pub name: String,
    /// Finalized input; `{}` until the tool call is finalized.
    pub input: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status: ToolCallPhase,
}

impl ToolCallInfo {
    fn pending(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            input: serde_json::Value::Object(Default::default()),
            partial_input: None,
            result: None,
            error: None,
            status: ToolCallPhase::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// `msg-<uuid>`
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallInfo>,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: format!("msg-{}", Uuid::new_v4()),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatState {
    pub session_id: Option<String>,
    pub messages: Vec<ChatMessage>,
    /// Assistant text received but not yet flushed into a message.
    pub streaming_text: String,
    pub is_streaming: bool,
    pub is_thinking: bool,
}

impl ChatState {
    fn tool_call_mut(&mut self, id: &str) -> Option<&mut ToolCallInfo> {
        self.messages
            .iter_mut()
            .rev()
            .flat_map(|m| m.tool_calls.iter_mut())
            .find(|tc| tc.id == id)
    }

    /// The last message, if it is from the assistant.
    fn last_assistant_mut(&mut self) -> Option<&mut ChatMessage> {
        self.messages
            .last_mut()
            .filter(|m| m.role == Role::Assistant)
    }

    fn push_tool_call(&mut self, id: &str, name: &str) {
        let tool_call = ToolCallInfo::pending(id, name);
        match self.last_assistant_mut() {
            Some(message) => message.tool_calls.push(tool_call),
            None => {
                let mut message = ChatMessage::new(Role::Assistant, "");
                message.tool_calls.push(tool_call);
                self.messages.push(message);
            }
        }
    }
}

/// Handle returned by [`ChatStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&ChatState) + Send + Sync>;

#[derive(Default)]
pub struct ChatStore {
    state: Mutex<ChatState>,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_subscription: Mutex<u64>,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of the current state.
    pub fn state(&self) -> ChatState {
        self.state.lock().unwrap().clone()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ChatState) + Send + Sync + 'static,
    {
        let mut next = self.next_subscription.lock().unwrap();
        let id = SubscriptionId(*next);
        *next += 1;
        self.listeners
            .lock()
            .unwrap()
            .push((id, Arc::new(listener)));
        id
    }

    /// Returns whether the listener was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock().unwrap();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    /// Apply `action`; notify when it reports a change.
    fn update(&self, action: impl FnOnce(&mut ChatState) -> bool) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            if !action(&mut *state) {
                return;
            }
            state.clone()
        };

        // Listeners run unlocked so they may read the store or unsubscribe
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(&snapshot);
        }
    }

    pub fn set_session_id(&self, id: impl Into<String>) {
        let id = id.into();
        self.update(|s| {
            s.session_id = Some(id);
            true
        });
    }

    pub fn add_user_message(&self, text: impl Into<String>) {
        let message = ChatMessage::new(Role::User, text);
        self.update(|s| {
            s.messages.push(message);
            true
        });
    }

    pub fn add_system_message(&self, text: impl Into<String>) {
        let message = ChatMessage::new(Role::System, text);
        self.update(|s| {
            s.messages.push(message);
            true
        });
    }

    pub fn append_streaming_text(&self, text: &str) {
        self.update(|s| {
            s.streaming_text.push_str(text);
            !text.is_empty()
        });
    }

    /// Move buffered text into the conversation.
    ///
    /// Joins the last assistant message when it has no tool calls so one
    /// reply streamed across flushes stays one message.
    pub fn flush_streaming_text(&self) {
        self.update(|s| {
            if s.streaming_text.is_empty() {
                return false;
            }
            let text = std::mem::take(&mut s.streaming_text);
            match s.last_assistant_mut().filter(|m| m.tool_calls.is_empty()) {
                Some(message) => message.content.push_str(&text),
                None => s.messages.push(ChatMessage::new(Role::Assistant, text)),
            }
            true
        });
    }

    pub fn start_tool_call(&self, id: &str, name: &str) {
        self.update(|s| {
            s.push_tool_call(id, name);
            true
        });
    }

    pub fn append_tool_input(&self, id: &str, partial_json: &str) {
        self.update(|s| match s.tool_call_mut(id) {
            Some(tc) => {
                tc.partial_input
                    .get_or_insert_with(String::new)
                    .push_str(partial_json);
                tc.status = ToolCallPhase::StreamingInput;
                true
            }
            None => {
                log::debug!("Input delta for unknown tool call {}", id);
                false
            }
        });
    }

    /// Record the finalized input. Creates the tool call when its start was
    /// never seen (non-streaming agents).
    pub fn finalize_tool_call(&self, id: &str, name: &str, input: serde_json::Value) {
        self.update(|s| {
            if s.tool_call_mut(id).is_none() {
                s.push_tool_call(id, name);
            }
            if let Some(tc) = s.tool_call_mut(id) {
                tc.name = name.to_string();
                tc.input = input;
                tc.status = ToolCallPhase::Running;
            }
            true
        });
    }

    pub fn complete_tool_call(&self, id: &str, result: impl Into<String>) {
        let result = result.into();
        self.update(|s| match s.tool_call_mut(id) {
            Some(tc) => {
                tc.result = Some(result);
                tc.status = ToolCallPhase::Complete;
                true
            }
            None => false,
        });
    }

    pub fn error_tool_call(&self, id: &str, error: impl Into<String>) {
        let error = error.into();
        self.update(|s| match s.tool_call_mut(id) {
            Some(tc) => {
                tc.error = Some(error);
                tc.status = ToolCallPhase::Error;
                true
            }
            None => false,
        });
    }

    pub fn set_streaming(&self, streaming: bool) {
        self.update(|s| std::mem::replace(&mut s.is_streaming, streaming) != streaming);
    }

    pub fn set_thinking(&self, thinking: bool) {
        self.update(|s| std::mem::replace(&mut s.is_thinking, thinking) != thinking);
    }

    /// Back to the initial state in one step.
    pub fn reset(&self) {
        self.update(|s| {
            *s = ChatState::default();
            true
        });
    }
}
