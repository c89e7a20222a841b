//! Folds the canonical event feed into a [`ChatStore`].

use std::collections::HashMap;

use crate::agents::event::OutputEvent;
use crate::wire::FrameDecoder;

use super::store::ChatStore;

/// Handler for one named `custom` event: `(store, value)`.
pub type CustomHandler = Box<dyn Fn(&ChatStore, &serde_json::Value) + Send + Sync>;

/// Applies each event kind's store actions, in emission order.
#[derive(Default)]
pub struct EventDispatcher {
    custom: HashMap<String, CustomHandler>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `custom` events called `name`, replacing any
    /// earlier one.
    pub fn on_custom<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&ChatStore, &serde_json::Value) + Send + Sync + 'static,
    {
        self.custom.insert(name.into(), Box::new(handler));
        self
    }

    pub fn dispatch(&self, store: &ChatStore, event: &OutputEvent) {
        match event {
            OutputEvent::MessageStart {} => store.set_thinking(true),

            OutputEvent::TextDelta { text } => {
                store.set_thinking(false);
                store.append_streaming_text(text);
            }

            OutputEvent::ToolStart { id, name } => {
                store.set_thinking(false);
                store.flush_streaming_text();
                store.start_tool_call(id, name);
            }

            OutputEvent::ToolInputDelta { id, partial_json } => {
                store.append_tool_input(id, partial_json);
            }

            OutputEvent::ToolCall { id, name, input } => {
                store.flush_streaming_text();
                store.finalize_tool_call(id, name, input.clone());
            }

            // Progress is informational; the card already shows `running`
            OutputEvent::ToolProgress { .. } => {}

            OutputEvent::ToolResult { tool_use_id, result } => {
                store.complete_tool_call(tool_use_id, result.clone());
                if store.state().is_streaming {
                    store.set_thinking(true);
                }
            }

            OutputEvent::TurnComplete { .. } => {
                store.flush_streaming_text();
                store.set_thinking(false);
                store.set_streaming(false);
            }

            OutputEvent::SessionError { subtype } => {
                store.flush_streaming_text();
                store.set_thinking(false);
                store.add_system_message(format!("Session ended: {}", subtype));
                store.set_streaming(false);
            }

            OutputEvent::Custom { name, value } => match self.custom.get(name) {
                Some(handler) => handler(store, value),
                None => log::debug!("No handler for custom event {}", name),
            },
        }
    }

    pub fn dispatch_all<'a>(&self, store: &ChatStore, events: impl IntoIterator<Item = &'a OutputEvent>) {
        for event in events {
            self.dispatch(store, event);
        }
    }

    /// Decode a chunk of the SSE byte stream and dispatch every complete
    /// frame. Undecodable frames are skipped. Returns how many were applied.
    pub fn dispatch_frames(&self, store: &ChatStore, decoder: &mut FrameDecoder, chunk: &str) -> usize {
        let mut applied = 0;
        for frame in decoder.feed(chunk) {
            match frame {
                Ok(event) => {
                    self.dispatch(store, &event);
                    applied += 1;
                }
                Err(e) => log::debug!("Skipping frame: {}", e),
            }
        }
        applied
    }

    /// The event stream closed.
    pub fn disconnect(&self, store: &ChatStore) {
        store.flush_streaming_text();
        store.set_streaming(false);
    }

    /// Local bookkeeping for a user turn about to be posted.
    pub fn begin_turn(&self, store: &ChatStore, text: &str) {
        store.add_user_message(text);
        store.set_streaming(true);
        store.set_thinking(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::store::{Role, ToolCallPhase};
    use crate::wire::encode;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn tool_turn() -> Vec<OutputEvent> {
        vec![
            OutputEvent::MessageStart {},
            OutputEvent::TextDelta { text: "Looking".into() },
            OutputEvent::TextDelta { text: " it up".into() },
            OutputEvent::ToolStart { id: "t1".into(), name: "search".into() },
            OutputEvent::ToolInputDelta { id: "t1".into(), partial_json: r#"{"q":"#.into() },
            OutputEvent::ToolInputDelta { id: "t1".into(), partial_json: r#""rust"}"#.into() },
            OutputEvent::ToolCall { id: "t1".into(), name: "search".into(), input: json!({"q": "rust"}) },
            OutputEvent::ToolResult { tool_use_id: "t1".into(), result: "[]".into() },
            OutputEvent::TextDelta { text: "Nothing found.".into() },
            OutputEvent::TurnComplete { num_turns: 1, cost: 0.01 },
        ]
    }

    mod reduction {
        use super::*;

        #[test]
        fn full_turn() {
            let store = ChatStore::new();
            let dispatcher = EventDispatcher::new();
            dispatcher.begin_turn(&store, "find rust");
            dispatcher.dispatch_all(&store, &tool_turn());

            let state = store.state();
            assert!(!state.is_streaming);
            assert!(!state.is_thinking);
            assert_eq!(state.streaming_text, "");

            let roles: Vec<Role> = state.messages.iter().map(|m| m.role).collect();
            assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Assistant]);

            let with_tool = &state.messages[1];
            assert_eq!(with_tool.content, "Looking it up");
            let tc = &with_tool.tool_calls[0];
            assert_eq!(tc.status, ToolCallPhase::Complete);
            assert_eq!(tc.partial_input.as_deref(), Some(r#"{"q":"rust"}"#));
            assert_eq!(tc.input, json!({"q": "rust"}));
            assert_eq!(tc.result.as_deref(), Some("[]"));

            assert_eq!(state.messages[2].content, "Nothing found.");
        }

        #[test]
        fn thinking_follows_the_turn() {
            let store = ChatStore::new();
            let dispatcher = EventDispatcher::new();
            dispatcher.begin_turn(&store, "hi");
            assert!(store.state().is_thinking);

            dispatcher.dispatch(&store, &OutputEvent::TextDelta { text: "x".into() });
            assert!(!store.state().is_thinking);

            dispatcher.dispatch(&store, &OutputEvent::ToolStart { id: "t".into(), name: "Read".into() });
            dispatcher.dispatch(&store, &OutputEvent::ToolResult { tool_use_id: "t".into(), result: String::new() });
            assert!(store.state().is_thinking);
        }

        #[test]
        fn tool_result_after_turn_end_leaves_thinking_off() {
            let store = ChatStore::new();
            let dispatcher = EventDispatcher::new();
            dispatcher.dispatch(&store, &OutputEvent::ToolStart { id: "t".into(), name: "Read".into() });
            dispatcher.dispatch(&store, &OutputEvent::ToolResult { tool_use_id: "t".into(), result: String::new() });
            assert!(!store.state().is_thinking);
        }

        #[test]
        fn session_error_adds_system_message() {
            let store = ChatStore::new();
            let dispatcher = EventDispatcher::new();
            dispatcher.begin_turn(&store, "go");
            dispatcher.dispatch(&store, &OutputEvent::TextDelta { text: "partial".into() });
            dispatcher.dispatch(&store, &OutputEvent::SessionError { subtype: "max_turns".into() });

            let state = store.state();
            assert!(!state.is_streaming);
            assert!(!state.is_thinking);
            let last = state.messages.last().unwrap();
            assert_eq!(last.role, Role::System);
            assert_eq!(last.content, "Session ended: max_turns");
            assert_eq!(state.messages[1].content, "partial");
        }

        #[test]
        fn disconnect_flushes_and_stops_streaming() {
            let store = ChatStore::new();
            let dispatcher = EventDispatcher::new();
            dispatcher.begin_turn(&store, "go");
            dispatcher.dispatch(&store, &OutputEvent::TextDelta { text: "cut off".into() });
            dispatcher.disconnect(&store);

            let state = store.state();
            assert!(!state.is_streaming);
            assert_eq!(state.messages.last().unwrap().content, "cut off");
        }
    }

    mod custom_events {
        use super::*;

        #[test]
        fn registered_handler_receives_value() {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&seen);
            let dispatcher = EventDispatcher::new().on_custom("preview_reload", move |_, value| {
                sink.lock().unwrap().push(value.clone());
            });

            let store = ChatStore::new();
            dispatcher.dispatch(&store, &OutputEvent::Custom { name: "preview_reload".into(), value: json!({}) });
            dispatcher.dispatch(&store, &OutputEvent::Custom { name: "other".into(), value: json!(1) });

            assert_eq!(*seen.lock().unwrap(), vec![json!({})]);
        }

        #[test]
        fn handler_can_drive_the_store() {
            let dispatcher = EventDispatcher::new().on_custom("notice", |store, value| {
                store.add_system_message(value.as_str().unwrap_or_default());
            });

            let store = ChatStore::new();
            dispatcher.dispatch(&store, &OutputEvent::Custom { name: "notice".into(), value: json!("saved") });
            assert_eq!(store.state().messages[0].content, "saved");
        }
    }

    mod frames {
        use super::*;

        #[test]
        fn dispatches_decoded_frames_across_chunks() {
            let store = ChatStore::new();
            let dispatcher = EventDispatcher::new();
            let mut decoder = FrameDecoder::new();

            let stream: String = tool_turn().iter().map(encode).collect();
            let (head, tail) = stream.split_at(stream.len() / 2);

            let applied = dispatcher.dispatch_frames(&store, &mut decoder, head)
                + dispatcher.dispatch_frames(&store, &mut decoder, tail);
            assert_eq!(applied, tool_turn().len());

            let reference = ChatStore::new();
            dispatcher.dispatch_all(&reference, &tool_turn());
            let strip_ids = |store: &ChatStore| {
                store
                    .state()
                    .messages
                    .into_iter()
                    .map(|m| (m.role, m.content, m.tool_calls))
                    .collect::<Vec<_>>()
            };
            assert_eq!(strip_ids(&store), strip_ids(&reference));
        }

        #[test]
        fn skips_unknown_kinds() {
            let store = ChatStore::new();
            let dispatcher = EventDispatcher::new();
            let mut decoder = FrameDecoder::new();

            let applied = dispatcher.dispatch_frames(
                &store,
                &mut decoder,
                "event: heartbeat\ndata: {}\n\nevent: message_start\ndata: {}\n\n",
            );
            assert_eq!(applied, 1);
            assert!(store.state().is_thinking);
        }
    }
}
