//! SSE event stream for one session.
//!
//! Reads the session's raw messages, translates each one, and yields the
//! resulting events as SSE frames in order. Holding the stream holds the
//! session's single subscriber lease; dropping it (client disconnect)
//! releases the lease without touching the session.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::response::sse::Event;
use futures::Stream;
use neeter_core::session::{MessageStream, SessionStatus};
use neeter_core::wire::to_sse;
use neeter_core::{MessageTranslator, OutputEvent, Session, SessionManager};

pub struct EventStream<C> {
    session: Arc<Session<C>>,
    manager: Arc<SessionManager<C>>,
    translator: Arc<MessageTranslator<C>>,
    messages: MessageStream,
    /// Translated but not yet yielded; one message can produce several events.
    pending: VecDeque<OutputEvent>,
    finished: bool,
}

impl<C> EventStream<C> {
    pub fn new(
        session: Arc<Session<C>>,
        manager: Arc<SessionManager<C>>,
        translator: Arc<MessageTranslator<C>>,
        messages: MessageStream,
    ) -> Self {
        Self {
            session,
            manager,
            translator,
            messages,
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// The queue ran dry for good. A failed session is released here, since
    /// its feed has already carried the error to the client.
    fn on_end(&self) {
        let id = self.session.id();
        match self.session.status() {
            SessionStatus::Failed(reason) => {
                log::info!("Releasing failed session {}: {}", id, reason);
                self.manager.evict(id);
            }
            status => log::debug!("Event stream for session {} ended ({:?})", id, status),
        }
    }
}

pub fn sse_event(event: &OutputEvent) -> Event {
    let frame = to_sse(event);
    Event::default().event(frame.event).data(frame.data)
}

impl<C> Stream for EventStream<C> {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(sse_event(&event))));
            }
            if this.finished {
                return Poll::Ready(None);
            }

            match Pin::new(&mut this.messages).poll_next(cx) {
                Poll::Ready(Some(message)) => {
                    let events = this.translator.translate(&message, &this.session);
                    this.pending.extend(events);
                }
                Poll::Ready(None) => {
                    this.finished = true;
                    this.on_end();
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
