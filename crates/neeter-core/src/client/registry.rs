//! Widget registry: how each tool call is presented.
//!
//! Registrations are plain function pointers so a registry can be built
//! once and shared freely.

use std::collections::HashMap;

use super::store::{ToolCallInfo, ToolCallPhase};

/// What a widget renderer gets to look at.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetProps<'a> {
    pub phase: ToolCallPhase,
    pub tool_use_id: &'a str,
    pub input: &'a serde_json::Value,
    pub partial_input: Option<&'a str>,
    /// The tool result, parsed as JSON.
    pub result: serde_json::Value,
    pub error: Option<&'a str>,
}

#[derive(Clone)]
pub struct WidgetRegistration {
    pub tool_name: String,
    pub label: String,
    /// A label derived from the parsed result; `None` keeps `label`.
    pub rich_label: Option<fn(&serde_json::Value) -> Option<String>>,
    pub render: fn(&WidgetProps<'_>) -> String,
}

impl std::fmt::Debug for WidgetRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetRegistration")
            .field("tool_name", &self.tool_name)
            .field("label", &self.label)
            .field("rich_label", &self.rich_label.is_some())
            .finish_non_exhaustive()
    }
}

/// How a tool call card should look.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCard {
    pub label: String,
    pub phase: ToolCallPhase,
    pub body: CardBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CardBody {
    /// Output of a registered widget for a completed call.
    Widget(String),
    Error(Option<String>),
    /// The first characters of input still streaming in.
    Preview(String),
    Empty,
}

/// Characters of streaming input shown in a card preview.
const PREVIEW_CHARS: usize = 80;

/// `mcp__server__tool` → `tool`. Other names pass through.
pub fn strip_mcp_prefix(name: &str) -> &str {
    match name.strip_prefix("mcp__") {
        Some(rest) => rest.split_once("__").map(|(_, tool)| tool).unwrap_or(name),
        None => name,
    }
}

#[derive(Debug, Clone, Default)]
pub struct WidgetRegistry {
    widgets: HashMap<String, WidgetRegistration>,
}

impl WidgetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a widget, replacing any earlier one for the same tool.
    pub fn register(&mut self, registration: WidgetRegistration) {
        self.widgets
            .insert(registration.tool_name.clone(), registration);
    }

    /// Look up by tool name; MCP prefixes are ignored.
    pub fn get(&self, tool_name: &str) -> Option<&WidgetRegistration> {
        self.widgets.get(strip_mcp_prefix(tool_name))
    }

    /// Pick the card for a tool call.
    ///
    /// A completed call with a registered widget and a JSON result renders
    /// the widget; everything else falls back to the label plus whatever raw
    /// detail the phase has.
    pub fn card_for(&self, tool_call: &ToolCallInfo) -> ToolCard {
        let short = strip_mcp_prefix(&tool_call.name);
        let registration = self.get(short);
        let label = registration
            .map(|r| r.label.clone())
            .unwrap_or_else(|| short.to_string());

        let card = |label: String, body: CardBody| ToolCard {
            label,
            phase: tool_call.status,
            body,
        };

        if tool_call.status == ToolCallPhase::Complete {
            let rendered = registration.zip(tool_call.result.as_deref()).and_then(|(reg, raw)| {
                let parsed: serde_json::Value = serde_json::from_str(raw).ok()?;
                let display = reg
                    .rich_label
                    .and_then(|rich| rich(&parsed))
                    .unwrap_or_else(|| label.clone());
                let props = WidgetProps {
                    phase: tool_call.status,
                    tool_use_id: &tool_call.id,
                    input: &tool_call.input,
                    partial_input: tool_call.partial_input.as_deref(),
                    result: parsed,
                    error: tool_call.error.as_deref(),
                };
                Some((display, (reg.render)(&props)))
            });
            if let Some((display, body)) = rendered {
                return card(display, CardBody::Widget(body));
            }
        }

        match tool_call.status {
            ToolCallPhase::Error => card(label, CardBody::Error(tool_call.error.clone())),
            ToolCallPhase::StreamingInput => match tool_call.partial_input.as_deref() {
                Some(partial) if !partial.is_empty() => card(
                    label,
                    CardBody::Preview(partial.chars().take(PREVIEW_CHARS).collect()),
                ),
                _ => card(label, CardBody::Empty),
            },
            _ => card(label, CardBody::Empty),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render_count(props: &WidgetProps<'_>) -> String {
        format!("{} results", props.result["results"].as_array().map(Vec::len).unwrap_or(0))
    }

    fn rich_label(result: &serde_json::Value) -> Option<String> {
        result["query"].as_str().map(|q| format!("Searched \"{}\"", q))
    }

    fn registry() -> WidgetRegistry {
        let mut registry = WidgetRegistry::new();
        registry.register(WidgetRegistration {
            tool_name: "search".to_string(),
            label: "Search".to_string(),
            rich_label: Some(rich_label),
            render: render_count,
        });
        registry
    }

    fn tool_call(name: &str, status: ToolCallPhase) -> ToolCallInfo {
        ToolCallInfo {
            id: "tc-1".to_string(),
            name: name.to_string(),
            input: json!({}),
            partial_input: None,
            result: None,
            error: None,
            status,
        }
    }

    #[test]
    fn strips_mcp_prefix() {
        assert_eq!(strip_mcp_prefix("mcp__weather__forecast"), "forecast");
        assert_eq!(strip_mcp_prefix("Read"), "Read");
        assert_eq!(strip_mcp_prefix("mcp__broken"), "mcp__broken");
    }

    #[test]
    fn get_ignores_mcp_prefix() {
        let registry = registry();
        assert!(registry.get("mcp__tools__search").is_some());
        assert!(registry.get("search").is_some());
        assert!(registry.get("fetch").is_none());
    }

    #[test]
    fn completed_call_renders_widget_with_rich_label() {
        let mut tc = tool_call("mcp__tools__search", ToolCallPhase::Complete);
        tc.result = Some(r#"{"query":"rust","results":[1,2]}"#.to_string());

        let card = registry().card_for(&tc);
        assert_eq!(card.label, "Searched \"rust\"");
        assert_eq!(card.body, CardBody::Widget("2 results".to_string()));
    }

    #[test]
    fn rich_label_falls_back_to_label() {
        let mut tc = tool_call("search", ToolCallPhase::Complete);
        tc.result = Some(r#"{"results":[]}"#.to_string());

        let card = registry().card_for(&tc);
        assert_eq!(card.label, "Search");
        assert_eq!(card.body, CardBody::Widget("0 results".to_string()));
    }

    #[test]
    fn unparsable_result_falls_back_to_raw_card() {
        let mut tc = tool_call("search", ToolCallPhase::Complete);
        tc.result = Some("plain text".to_string());

        let card = registry().card_for(&tc);
        assert_eq!(card.label, "Search");
        assert_eq!(card.body, CardBody::Empty);
    }

    #[test]
    fn unregistered_tool_uses_short_name() {
        let mut tc = tool_call("mcp__fs__read_file", ToolCallPhase::Complete);
        tc.result = Some("{}".to_string());

        let card = registry().card_for(&tc);
        assert_eq!(card.label, "read_file");
        assert_eq!(card.body, CardBody::Empty);
    }

    #[test]
    fn streaming_input_shows_truncated_preview() {
        let mut tc = tool_call("Write", ToolCallPhase::StreamingInput);
        tc.partial_input = Some("x".repeat(200));

        match registry().card_for(&tc).body {
            CardBody::Preview(text) => assert_eq!(text.len(), 80),
            other => panic!("Expected Preview, got {:?}", other),
        }
    }

    #[test]
    fn error_card_carries_message() {
        let mut tc = tool_call("search", ToolCallPhase::Error);
        tc.error = Some("timeout".to_string());

        let card = registry().card_for(&tc);
        assert_eq!(card.phase, ToolCallPhase::Error);
        assert_eq!(card.body, CardBody::Error(Some("timeout".to_string())));
    }
}
