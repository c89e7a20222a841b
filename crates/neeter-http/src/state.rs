//! Shared state for the HTTP server.

use std::sync::Arc;

use neeter_core::{MessageTranslator, SessionManager};

/// Shared state available to all HTTP handlers.
pub struct AppState<C> {
    pub sessions: Arc<SessionManager<C>>,
    /// One translator serves every session; it keys its state by session id.
    pub translator: Arc<MessageTranslator<C>>,
}

impl<C: Send + Sync + 'static> AppState<C> {
    /// Ties the two together: evicting a session also drops its translator
    /// state, whoever does the evicting.
    pub fn new(sessions: Arc<SessionManager<C>>, translator: Arc<MessageTranslator<C>>) -> Self {
        let forget = Arc::clone(&translator);
        sessions.on_evict(move |id| forget.forget(id));
        Self {
            sessions,
            translator,
        }
    }
}

// Manual impl: derive would demand `C: Clone`
impl<C> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            translator: Arc::clone(&self.translator),
        }
    }
}
