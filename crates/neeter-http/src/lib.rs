//! # neeter-http
//!
//! Exposes neeter sessions over HTTP: create a session, subscribe to its
//! event feed as server-sent events, post user turns, and tear it down.
//!
//! The router is generic over the session context `C`, so an embedding
//! binary can add its own routes against the same [`AppState`].

mod error;
mod routes;
mod sse;
mod state;

use std::net::SocketAddr;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

pub use error::ApiError;
pub use routes::{CreateSessionResponse, ListSessionsResponse, SendMessageRequest};
pub use sse::{sse_event, EventStream};
pub use state::AppState;

/// The session routes, relative to wherever they get mounted.
pub fn router<C: Send + Sync + 'static>(state: AppState<C>) -> Router {
    session_routes().with_state(state)
}

/// The session routes with the state still open, for callers that merge in
/// routes of their own before applying state.
pub fn session_routes<C: Send + Sync + 'static>() -> Router<AppState<C>> {
    Router::new()
        .route(
            "/sessions",
            post(routes::create_session::<C>).get(routes::list_sessions::<C>),
        )
        .route("/sessions/{id}", axum::routing::delete(routes::delete_session::<C>))
        .route("/sessions/{id}/events", get(routes::stream_events::<C>))
        .route("/sessions/{id}/messages", post(routes::post_message::<C>))
}

/// Builds the full application around an API router.
pub struct AppBuilder {
    api: Router,
    prefix: String,
    static_dir: Option<String>,
}

impl AppBuilder {
    pub fn new(api: Router) -> Self {
        Self {
            api,
            prefix: String::new(),
            static_dir: None,
        }
    }

    /// Mount the API under this path, e.g. `/api`.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Serve files from this directory for every path the API doesn't claim.
    pub fn static_dir(mut self, dir: impl Into<String>) -> Self {
        self.static_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> Router {
        let prefix = self.prefix.trim_end_matches('/');
        let mut app = if prefix.is_empty() {
            Router::new().merge(self.api)
        } else {
            Router::new().nest(prefix, self.api)
        };

        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

        if let Some(dir) = self.static_dir {
            app = app.fallback_service(ServeDir::new(dir));
        }
        app
    }
}

/// Bind `addr` and serve `app` until `shutdown` resolves.
///
/// Open event streams are dropped on shutdown, which releases their leases.
pub async fn serve<F>(addr: SocketAddr, app: Router, shutdown: F) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        log::error!("Failed to bind HTTP server to {}: {}", addr, e);
        e
    })?;

    log::info!("HTTP server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            log::info!("HTTP server shutting down");
        })
        .await
}

// ============================================================================
// TESTS
// ============================================================================
