//! # neeter-core
//!
//! Core logic for neeter, a bridge that streams a Claude agent's session to
//! a web client as server-sent events.
//!
//! This crate is framework-agnostic and can be used by:
//! - the HTTP crate (axum router)
//! - the daemon binary
//! - any Rust client that consumes the event feed
//!
//! ## Key Concepts
//!
//! - **Session**: one long-lived agent conversation with its message queue
//! - **MessageTranslator**: raw agent messages in, canonical events out
//! - **OutputEvent**: the fixed ten-kind event vocabulary the client sees
//! - **ChatStore**: the client-side mirror built by folding those events

pub mod agents;
pub mod client;
pub mod logging;
pub mod runner;
pub mod sandbox;
pub mod session;
pub mod wire;

// Re-export commonly used types
pub use agents::claude::{AgentConfig, AgentMessage, MessageTranslator};
pub use agents::event::{CustomEvent, OutputEvent};
pub use runner::ClaudeLauncher;
pub use sandbox::{Decision, SandboxGuard};
pub use session::{Session, SessionError, SessionId, SessionManager};
