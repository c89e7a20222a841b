//! HTTP route handlers for sessions.
//!
//! | method | path                      | success                 |
//! |--------|---------------------------|-------------------------|
//! | POST   | `/sessions`               | 201 `{"sessionId"}`     |
//! | GET    | `/sessions`               | 200 `{"sessions":[..]}` |
//! | GET    | `/sessions/{id}/events`   | 200 SSE stream          |
//! | POST   | `/sessions/{id}/messages` | 202                     |
//! | DELETE | `/sessions/{id}`          | 204                     |

use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{
        sse::{KeepAlive, KeepAliveStream, Sse},
        Json,
    },
};
use neeter_core::{SessionError, SessionId};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::sse::EventStream;
use crate::state::AppState;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: SessionId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<SessionId>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

/// Handler for POST /sessions
///
/// The optional JSON body is handed to the session factory as the seed.
pub async fn create_session<C: Send + Sync + 'static>(
    State(state): State<AppState<C>>,
    body: Bytes,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError> {
    let payload = if body.iter().all(u8::is_ascii_whitespace) {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid session payload: {}", e)))?
    };

    let session = state.sessions.create(payload)?;
    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: session.id().clone(),
        }),
    ))
}

/// Handler for GET /sessions
pub async fn list_sessions<C: Send + Sync + 'static>(
    State(state): State<AppState<C>>,
) -> Json<ListSessionsResponse> {
    Json(ListSessionsResponse {
        sessions: state.sessions.list(),
    })
}

/// Handler for GET /sessions/{id}/events
///
/// Held open until the session's queue ends or the client goes away.
pub async fn stream_events<C: Send + Sync + 'static>(
    State(state): State<AppState<C>>,
    Path(id): Path<String>,
) -> Result<Sse<KeepAliveStream<EventStream<C>>>, ApiError> {
    let id = SessionId(id);
    let session = state
        .sessions
        .get(&id)
        .ok_or_else(|| SessionError::NotFound(id.clone()))?;
    let messages = session.messages()?;

    log::info!("Client subscribed to session {}", id);
    let stream = EventStream::new(session, state.sessions.clone(), state.translator.clone(), messages);
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)))
}

/// Handler for POST /sessions/{id}/messages
pub async fn post_message<C: Send + Sync + 'static>(
    State(state): State<AppState<C>>,
    Path(id): Path<String>,
    request: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let id = SessionId(id);
    let session = state
        .sessions
        .get(&id)
        .ok_or_else(|| SessionError::NotFound(id.clone()))?;

    let Json(request) = request.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if request.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text must not be empty".to_string()));
    }

    session.send_user_message(request.text)?;
    Ok(StatusCode::ACCEPTED)
}

/// Handler for DELETE /sessions/{id}
pub async fn delete_session<C: Send + Sync + 'static>(
    State(state): State<AppState<C>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = SessionId(id);
    if !state.sessions.evict(&id) {
        return Err(SessionError::NotFound(id).into());
    }
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, Response};
    use axum::Router;
    use neeter_core::session::{AgentLauncher, SessionSeed, SessionSetup, SessionStatus};
    use neeter_core::{AgentConfig, AgentMessage, MessageTranslator, Session, SessionManager};
    use serde_json::json;
    use std::sync::Arc;
    use tower::ServiceExt;

    /// Launches nothing; the session just sits there.
    struct IdleLauncher;

    impl<C: Send + Sync> AgentLauncher<C> for IdleLauncher {
        fn launch(&self, _session: Arc<Session<C>>, _config: AgentConfig) {}
    }

    /// Plays back a fixed transcript, then ends the session.
    struct ScriptedLauncher {
        lines: Vec<&'static str>,
        failure: Option<&'static str>,
    }

    impl<C: Send + Sync> AgentLauncher<C> for ScriptedLauncher {
        fn launch(&self, session: Arc<Session<C>>, _config: AgentConfig) {
            for line in &self.lines {
                session.push(AgentMessage::parse_line(line).unwrap());
            }
            match self.failure {
                Some(reason) => session.fail(reason),
                None => session.finish(),
            }
        }
    }

    fn test_app(launcher: Arc<dyn AgentLauncher<serde_json::Value>>) -> (Router, AppState<serde_json::Value>) {
        let manager = SessionManager::new(
            |seed: &SessionSeed| {
                Ok(SessionSetup {
                    context: seed.payload.clone(),
                    agent: AgentConfig::new("claude"),
                })
            },
            launcher,
        );
        let state = AppState::new(Arc::new(manager), Arc::new(MessageTranslator::new()));
        (crate::router(state.clone()), state)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<serde_json::Value>) -> Response<Body> {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                request = request.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        app.clone().oneshot(request.body(body).unwrap()).await.unwrap()
    }

    async fn body_string(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn create(app: &Router) -> String {
        let response = send(app, Method::POST, "/sessions", None).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        body["sessionId"].as_str().unwrap().to_string()
    }

    mod create_session {
        use super::*;

        #[tokio::test]
        async fn returns_new_session_id() {
            let (app, state) = test_app(Arc::new(IdleLauncher));
            let id = create(&app).await;
            assert!(state.sessions.contains(&SessionId(id)));
        }

        #[tokio::test]
        async fn passes_body_to_factory() {
            let (app, state) = test_app(Arc::new(IdleLauncher));
            let response = send(&app, Method::POST, "/sessions", Some(json!({"name": "demo"}))).await;
            let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();

            let session = state
                .sessions
                .get(&SessionId(body["sessionId"].as_str().unwrap().to_string()))
                .unwrap();
            assert_eq!(session.context(), &json!({"name": "demo"}));
        }

        #[tokio::test]
        async fn rejects_invalid_json() {
            let (app, state) = test_app(Arc::new(IdleLauncher));
            let request = Request::builder()
                .method(Method::POST)
                .uri("/sessions")
                .body(Body::from("{nope"))
                .unwrap();
            let response = app.oneshot(request).await.unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert!(state.sessions.is_empty());
        }

        #[tokio::test]
        async fn lists_sessions() {
            let (app, _) = test_app(Arc::new(IdleLauncher));
            let id = create(&app).await;

            let response = send(&app, Method::GET, "/sessions", None).await;
            let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
            assert_eq!(body, json!({"sessions": [id]}));
        }
    }

    mod events {
        use super::*;

        #[tokio::test]
        async fn streams_translated_frames_in_order() {
            let launcher = ScriptedLauncher {
                lines: vec![
                    r#"{"type":"stream_event","event":{"type":"message_start"}}"#,
                    r#"{"type":"system","subtype":"init"}"#,
                    r#"{"type":"stream_event","event":{"type":"content_block_delta","delta":{"type":"text_delta","text":"hi"}}}"#,
                    r#"{"type":"result","subtype":"success","num_turns":1,"total_cost_usd":0.5}"#,
                ],
                failure: None,
            };
            let (app, _) = test_app(Arc::new(launcher));
            let id = create(&app).await;

            let response = send(&app, Method::GET, &format!("/sessions/{id}/events"), None).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()["content-type"], "text/event-stream");

            let body = body_string(response).await;
            assert_eq!(
                body,
                "event: message_start\ndata: {}\n\n\
                 event: text_delta\ndata: {\"text\":\"hi\"}\n\n\
                 event: turn_complete\ndata: {\"numTurns\":1,\"cost\":0.5}\n\n"
            );
        }

        #[tokio::test]
        async fn unknown_session_is_404() {
            let (app, _) = test_app(Arc::new(IdleLauncher));
            let response = send(&app, Method::GET, "/sessions/nope/events", None).await;

            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
            assert!(body["error"].as_str().unwrap().contains("nope"));
        }

        #[tokio::test]
        async fn second_subscriber_is_409_until_first_drops() {
            let (app, _) = test_app(Arc::new(IdleLauncher));
            let id = create(&app).await;
            let uri = format!("/sessions/{id}/events");

            let first = send(&app, Method::GET, &uri, None).await;
            assert_eq!(first.status(), StatusCode::OK);

            let second = send(&app, Method::GET, &uri, None).await;
            assert_eq!(second.status(), StatusCode::CONFLICT);

            drop(first);
            let third = send(&app, Method::GET, &uri, None).await;
            assert_eq!(third.status(), StatusCode::OK);
        }

        #[tokio::test]
        async fn failed_session_is_released_after_drain() {
            let launcher = ScriptedLauncher {
                lines: vec![r#"{"type":"result","subtype":"error_agent_exited","is_error":true}"#],
                failure: Some("agent exited with code 1"),
            };
            let (app, state) = test_app(Arc::new(launcher));
            let id = create(&app).await;
            let session = state.sessions.get(&SessionId(id.clone())).unwrap();
            assert!(matches!(session.status(), SessionStatus::Failed(_)));

            let response = send(&app, Method::GET, &format!("/sessions/{id}/events"), None).await;
            let body = body_string(response).await;

            assert_eq!(body, "event: session_error\ndata: {\"subtype\":\"error_agent_exited\"}\n\n");
            assert!(state.sessions.get(&SessionId(id)).is_none());
        }
    }

    mod messages {
        use super::*;

        #[tokio::test]
        async fn queues_user_turn() {
            let (app, state) = test_app(Arc::new(IdleLauncher));
            let id = create(&app).await;
            let mut prompts = state.sessions.get(&SessionId(id.clone())).unwrap().take_prompts().unwrap();

            let response = send(
                &app,
                Method::POST,
                &format!("/sessions/{id}/messages"),
                Some(json!({"text": "hello"})),
            )
            .await;

            assert_eq!(response.status(), StatusCode::ACCEPTED);
            assert_eq!(prompts.recv().await.unwrap(), "hello");
        }

        #[tokio::test]
        async fn empty_text_is_400() {
            let (app, _) = test_app(Arc::new(IdleLauncher));
            let id = create(&app).await;

            let response = send(
                &app,
                Method::POST,
                &format!("/sessions/{id}/messages"),
                Some(json!({"text": "   "})),
            )
            .await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        #[tokio::test]
        async fn missing_text_is_400() {
            let (app, _) = test_app(Arc::new(IdleLauncher));
            let id = create(&app).await;

            let response = send(&app, Method::POST, &format!("/sessions/{id}/messages"), Some(json!({}))).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        #[tokio::test]
        async fn unknown_session_is_404() {
            let (app, _) = test_app(Arc::new(IdleLauncher));
            let response = send(&app, Method::POST, "/sessions/nope/messages", Some(json!({"text": "hi"}))).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        #[tokio::test]
        async fn closed_session_is_409() {
            let (app, state) = test_app(Arc::new(IdleLauncher));
            let id = create(&app).await;
            state.sessions.get(&SessionId(id.clone())).unwrap().finish();

            let response = send(
                &app,
                Method::POST,
                &format!("/sessions/{id}/messages"),
                Some(json!({"text": "late"})),
            )
            .await;
            assert_eq!(response.status(), StatusCode::CONFLICT);
        }
    }

    mod delete_session {
        use super::*;

        #[tokio::test]
        async fn evicts_then_404s() {
            let (app, state) = test_app(Arc::new(IdleLauncher));
            let id = create(&app).await;
            let session = state.sessions.get(&SessionId(id.clone())).unwrap();
            let uri = format!("/sessions/{id}");

            let response = send(&app, Method::DELETE, &uri, None).await;
            assert_eq!(response.status(), StatusCode::NO_CONTENT);
            assert!(session.is_cancelled());
            assert!(state.sessions.is_empty());

            let response = send(&app, Method::DELETE, &uri, None).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        #[tokio::test]
        async fn eviction_clears_translator_state() {
            let (app, state) = test_app(Arc::new(IdleLauncher));
            let id = SessionId(create(&app).await);
            let session = state.sessions.get(&id).unwrap();
            let tool_start = AgentMessage::parse_line(
                r#"{"type":"stream_event","event":{"type":"content_block_start","content_block":{"type":"tool_use","id":"t1","name":"Read"}}}"#,
            )
            .unwrap();
            state.translator.translate(&tool_start, &session);
            assert!(state.translator.open_tool(&id).is_some());

            // Evicted directly, not through the route
            state.sessions.evict(&id);
            assert!(state.translator.open_tool(&id).is_none());
        }
    }
}
