//! Claude protocol types, translation and spawn configuration.
//!
//! Parses Claude's stream-json output and converts it to [`OutputEvent`]s.
//!
//! [`OutputEvent`]: crate::agents::event::OutputEvent

pub mod spawn;
mod translator;
mod types;

pub use spawn::{
    control_response, hook_response, initialize_request, user_turn_envelope, AgentConfig, SANDBOX_HOOK_ID,
};
pub use translator::{MessageTranslator, ToolResultHook};
pub use types::*;
