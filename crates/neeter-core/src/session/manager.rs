//! SessionManager - the single owner of the live session table.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use super::state::{Session, SessionId};
use crate::agents::claude::AgentConfig;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    #[error("Session already has a live event stream: {0}")]
    AlreadySubscribed(SessionId),

    #[error("Session is closed: {0}")]
    Closed(SessionId),

    #[error("Session factory failed: {0}")]
    Factory(String),
}

/// Input handed to the session factory.
#[derive(Debug, Clone)]
pub struct SessionSeed {
    /// The id the new session will be stored under.
    pub id: SessionId,
    /// Caller-supplied creation payload (the `POST /sessions` body, or null).
    pub payload: serde_json::Value,
}

/// What the factory returns: the session's context plus how to launch its agent.
#[derive(Debug, Clone)]
pub struct SessionSetup<C> {
    pub context: C,
    pub agent: AgentConfig,
}

pub type SessionFactory<C> =
    Box<dyn Fn(&SessionSeed) -> Result<SessionSetup<C>, String> + Send + Sync>;

/// Called with the id of every evicted session.
pub type EvictionListener = Box<dyn Fn(&SessionId) + Send + Sync>;

/// Starts the agent computation behind a freshly created session.
///
/// Implementations must return immediately; the agent runs on its own task
/// and talks to the session only through `push`, `take_prompts`, `finish`,
/// `fail` and the cancellation token.
pub trait AgentLauncher<C>: Send + Sync {
    fn launch(&self, session: Arc<Session<C>>, config: AgentConfig);
}

/// Manages all live sessions.
///
/// The table sits behind one `RwLock`, so insert, lookup and evict are
/// atomic with respect to each other. Sessions are fully built before they
/// are inserted.
pub struct SessionManager<C> {
    sessions: RwLock<HashMap<SessionId, Arc<Session<C>>>>,
    factory: SessionFactory<C>,
    launcher: Arc<dyn AgentLauncher<C>>,
    on_evict: RwLock<Vec<EvictionListener>>,
}

impl<C> SessionManager<C> {
    pub fn new<F>(factory: F, launcher: Arc<dyn AgentLauncher<C>>) -> Self
    where
        F: Fn(&SessionSeed) -> Result<SessionSetup<C>, String> + Send + Sync + 'static,
    {
        Self {
            sessions: RwLock::new(HashMap::new()),
            factory: Box::new(factory),
            launcher,
            on_evict: RwLock::new(Vec::new()),
        }
    }

    /// Register a listener run after each successful eviction, e.g. to drop
    /// per-session state held outside the table.
    pub fn on_evict<F>(&self, listener: F)
    where
        F: Fn(&SessionId) + Send + Sync + 'static,
    {
        self.on_evict.write().unwrap().push(Box::new(listener));
    }

    /// Create a session and launch its agent.
    ///
    /// Does not wait for the agent to start. A factory error leaves the table
    /// untouched.
    pub fn create(&self, payload: serde_json::Value) -> Result<Arc<Session<C>>, SessionError> {
        let seed = SessionSeed {
            id: SessionId::new(),
            payload,
        };
        let setup = (self.factory)(&seed).map_err(SessionError::Factory)?;
        let session = Arc::new(Session::new(seed.id.clone(), setup.context));

        self.sessions
            .write()
            .unwrap()
            .insert(seed.id.clone(), Arc::clone(&session));
        log::info!("Created session {}", seed.id);

        self.launcher.launch(Arc::clone(&session), setup.agent);
        Ok(session)
    }

    /// Look up a session. `None` means "no such session", which is a normal
    /// outcome; a session that exists but failed is still returned.
    pub fn get(&self, id: &SessionId) -> Option<Arc<Session<C>>> {
        self.sessions.read().unwrap().get(id).cloned()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.read().unwrap().contains_key(id)
    }

    /// Remove a session and cancel its agent.
    ///
    /// Returns whether a session was removed; evicting an absent id is a no-op.
    pub fn evict(&self, id: &SessionId) -> bool {
        let removed = self.sessions.write().unwrap().remove(id);
        match removed {
            Some(session) => {
                session.abort();
                for listener in self.on_evict.read().unwrap().iter() {
                    listener(id);
                }
                log::info!("Evicted session {}", id);
                true
            }
            None => false,
        }
    }

    /// List all live session IDs.
    pub fn list(&self) -> Vec<SessionId> {
        self.sessions.read().unwrap().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
