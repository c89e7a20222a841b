//! Session lifecycle.
//!
//! A session keeps one agent conversation alive across many HTTP requests.

mod manager;
mod state;

pub use manager::{
    AgentLauncher, EvictionListener, SessionError, SessionFactory, SessionManager, SessionSeed,
    SessionSetup,
};
pub use state::{MessageStream, Session, SessionId, SessionStatus};
