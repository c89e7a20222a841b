//! Per-session state.
//!
//! A [`Session`] is one conversation between one agent process and the web
//! client reading its event feed. It owns two queues:
//!
//! - the **message queue**: raw agent messages pushed by the agent runner and
//!   read by exactly one event stream at a time
//! - the **prompt queue**: user turns posted over HTTP and consumed by the
//!   agent runner
//!
//! Both are unbounded tokio channels, so neither side ever blocks on the other.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

use super::manager::SessionError;
use crate::agents::claude::AgentMessage;

/// Unique identifier for a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Where a session is in its lifecycle.
///
/// Only `Active` sessions accept new messages. The other three are terminal
/// and a session never moves between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    /// The agent process exited normally.
    Finished,
    /// The session was cancelled by the caller.
    Aborted,
    /// The agent process failed; carries a human-readable reason.
    Failed(String),
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

type MessageSlot = Arc<Mutex<Option<UnboundedReceiver<AgentMessage>>>>;

/// A single conversation with its queues and cancellation handle.
///
/// `C` is the caller-defined context payload (for example the sandbox
/// directory of a live-preview session). The core never looks inside it.
pub struct Session<C> {
    id: SessionId,
    context: C,
    created_at: Instant,
    last_activity_at: Mutex<Instant>,
    status: Mutex<SessionStatus>,
    queue_tx: Mutex<Option<UnboundedSender<AgentMessage>>>,
    queue_rx: MessageSlot,
    prompt_tx: Mutex<Option<UnboundedSender<String>>>,
    prompt_rx: Mutex<Option<UnboundedReceiver<String>>>,
    cancel: CancellationToken,
}

impl<C> Session<C> {
    pub fn new(id: SessionId, context: C) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (prompt_tx, prompt_rx) = mpsc::unbounded_channel();
        let now = Instant::now();

        Self {
            id,
            context,
            created_at: now,
            last_activity_at: Mutex::new(now),
            status: Mutex::new(SessionStatus::Active),
            queue_tx: Mutex::new(Some(queue_tx)),
            queue_rx: Arc::new(Mutex::new(Some(queue_rx))),
            prompt_tx: Mutex::new(Some(prompt_tx)),
            prompt_rx: Mutex::new(Some(prompt_rx)),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_activity_at(&self) -> Instant {
        *self.last_activity_at.lock().unwrap()
    }

    pub fn status(&self) -> SessionStatus {
        self.status.lock().unwrap().clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the session is aborted.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// A clone of the cancellation token, for tasks that need to await it.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn touch(&self) {
        *self.last_activity_at.lock().unwrap() = Instant::now();
    }

    /// Enqueue a raw agent message.
    ///
    /// Never blocks. Returns `false` when the message was dropped because the
    /// session is no longer active (aborted, finished or failed).
    pub fn push(&self, message: AgentMessage) -> bool {
        let guard = self.queue_tx.lock().unwrap();
        let sent = match guard.as_ref() {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        };
        drop(guard);

        if sent {
            self.touch();
        } else {
            log::debug!("Dropping agent message for closed session {}", self.id);
        }
        sent
    }

    /// Lease the message queue as a forward-only stream.
    ///
    /// Only one stream may be live at a time. Dropping it hands the queue
    /// back, so a reconnecting client continues from the next unread message.
    pub fn messages(&self) -> Result<MessageStream, SessionError> {
        let receiver = self
            .queue_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| SessionError::AlreadySubscribed(self.id.clone()))?;

        Ok(MessageStream {
            receiver: Some(receiver),
            slot: Arc::clone(&self.queue_rx),
        })
    }

    /// Enqueue a user turn for the agent runner.
    pub fn send_user_message(&self, text: impl Into<String>) -> Result<(), SessionError> {
        let guard = self.prompt_tx.lock().unwrap();
        let tx = guard
            .as_ref()
            .ok_or_else(|| SessionError::Closed(self.id.clone()))?;
        tx.send(text.into())
            .map_err(|_| SessionError::Closed(self.id.clone()))?;
        drop(guard);

        self.touch();
        Ok(())
    }

    /// Hand the prompt queue to the agent runner. Returns `None` after the
    /// first call.
    pub fn take_prompts(&self) -> Option<UnboundedReceiver<String>> {
        self.prompt_rx.lock().unwrap().take()
    }

    /// Cancel the agent computation.
    ///
    /// Later pushes are dropped. Messages queued before the abort stay
    /// readable, after which the stream ends. Calling it twice is a no-op.
    pub fn abort(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        log::info!("Aborting session {}", self.id);
        self.transition(SessionStatus::Aborted);
        self.cancel.cancel();
        self.close();
    }

    /// The agent finished normally; the stream ends once drained.
    pub fn finish(&self) {
        self.transition(SessionStatus::Finished);
        self.close();
    }

    /// The agent failed; the stream ends once drained.
    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        log::warn!("Session {} failed: {}", self.id, reason);
        self.transition(SessionStatus::Failed(reason));
        self.close();
    }

    fn transition(&self, next: SessionStatus) {
        let mut status = self.status.lock().unwrap();
        if !status.is_terminal() {
            *status = next;
        }
    }

    fn close(&self) {
        self.queue_tx.lock().unwrap().take();
        self.prompt_tx.lock().unwrap().take();
    }
}

/// A leased, single-pass view of a session's message queue.
///
/// Yields messages in `push` order and ends once the session is closed and
/// the queue drained. After that it keeps returning `None`.
pub struct MessageStream {
    receiver: Option<UnboundedReceiver<AgentMessage>>,
    slot: MessageSlot,
}

impl MessageStream {
    /// Wait for the next message.
    pub async fn next_message(&mut self) -> Option<AgentMessage> {
        match self.receiver.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }
}

impl futures::Stream for MessageStream {
    type Item = AgentMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.receiver.as_mut() {
            Some(rx) => rx.poll_recv(cx),
            None => Poll::Ready(None),
        }
    }
}

impl Drop for MessageStream {
    fn drop(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            if let Ok(mut slot) = self.slot.lock() {
                *slot = Some(receiver);
            }
        }
    }
}
