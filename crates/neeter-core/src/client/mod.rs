//! Client-side mirror of a session's event feed.
//!
//! A consumer reads the SSE stream, hands each frame to the
//! [`EventDispatcher`], and renders from the [`ChatStore`].

mod dispatch;
mod registry;
mod store;

pub use dispatch::{CustomHandler, EventDispatcher};
pub use registry::{strip_mcp_prefix, CardBody, ToolCard, WidgetProps, WidgetRegistration, WidgetRegistry};
pub use store::{ChatMessage, ChatState, ChatStore, Role, SubscriptionId, ToolCallInfo, ToolCallPhase};
