//! Live-preview mode.
//!
//! Every session gets its own sandbox directory seeded with a scaffold
//! `index.html`. The agent may only touch files inside it, the feed gets a
//! `preview_reload` custom event after each `Write`/`Edit`, and the files
//! are served back for the preview iframe.

use std::path::{Path as FsPath, PathBuf};

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use neeter_core::session::{SessionSeed, SessionSetup};
use neeter_core::{AgentConfig, CustomEvent, MessageTranslator, SandboxGuard, Session, SessionId};
use neeter_http::AppState;

/// Per-session context kept by the daemon.
#[derive(Debug, Clone, Default)]
pub struct DaemonContext {
    /// The session's sandbox. `None` in plain-chat mode.
    pub sandbox_dir: Option<PathBuf>,
}

pub const SCAFFOLD_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Preview</title>
  <script src="https://cdn.tailwindcss.com"></script>
</head>
<body>
  <div class="min-h-screen flex items-center justify-center">
    <p class="text-gray-400 text-lg">Send a message to get started.</p>
  </div>
</body>
</html>
"#;

/// Tools with no business in a preview sandbox.
pub const DISALLOWED_TOOLS: [&str; 4] = ["WebFetch", "WebSearch", "NotebookEdit", "TodoWrite"];

/// Tool results that change what the preview shows.
const RELOAD_TOOLS: [&str; 2] = ["Write", "Edit"];

pub const RELOAD_EVENT: &str = "preview_reload";

fn system_prompt(sandbox_dir: &FsPath) -> String {
    format!(
        "You are a creative web developer. Your workspace is {}.\n\
         \n\
         Rules:\n\
         - Build everything in a single index.html file unless the user asks for more files\n\
         - Tailwind CSS is available via CDN, use utility classes for styling\n\
         - Inline <script> and <style> tags are fine for interactivity and custom CSS\n\
         - NEVER read, write, or reference files outside your workspace directory\n\
         - NEVER use Bash to install packages, run servers, or modify anything outside your workspace\n\
         - When the user describes a page, build it immediately without asking clarifying questions\n\
         \n\
         The user watches the preview update in real time.",
        sandbox_dir.display()
    )
}

/// Session factory for live-preview mode.
///
/// `base` carries the daemon-wide agent options (binary, model, log dir);
/// each session gets its own working dir, prompt, and guard on top.
pub fn preview_factory(
    sandboxes_root: PathBuf,
    base: AgentConfig,
    allow_bash: bool,
) -> impl Fn(&SessionSeed) -> Result<SessionSetup<DaemonContext>, String> + Send + Sync + 'static {
    move |seed: &SessionSeed| {
        let sandbox_dir = sandboxes_root.join(seed.id.as_str());
        std::fs::create_dir_all(&sandbox_dir)
            .map_err(|e| format!("Failed to create sandbox {}: {}", sandbox_dir.display(), e))?;
        std::fs::write(sandbox_dir.join("index.html"), SCAFFOLD_HTML)
            .map_err(|e| format!("Failed to write scaffold in {}: {}", sandbox_dir.display(), e))?;

        let guard = SandboxGuard::new(&sandbox_dir).allow_bash(allow_bash);
        let agent = base
            .clone()
            .working_dir(guard.root().to_string_lossy())
            .system_prompt(system_prompt(guard.root()))
            .disallowed_tools(DISALLOWED_TOOLS)
            .sandbox(guard.clone());

        log::debug!("Prepared sandbox {} for session {}", guard.root().display(), seed.id);
        Ok(SessionSetup {
            context: DaemonContext {
                sandbox_dir: Some(guard.root().to_path_buf()),
            },
            agent,
        })
    }
}

/// Session factory for plain-chat mode: every session gets `base` as is.
pub fn chat_factory(
    base: AgentConfig,
) -> impl Fn(&SessionSeed) -> Result<SessionSetup<DaemonContext>, String> + Send + Sync + 'static {
    move |_seed: &SessionSeed| {
        Ok(SessionSetup {
            context: DaemonContext::default(),
            agent: base.clone(),
        })
    }
}

/// Translator that follows every `Write`/`Edit` result with a reload hint.
pub fn preview_translator() -> MessageTranslator<DaemonContext> {
    MessageTranslator::with_tool_result_hook(
        |tool_name: &str, _result: &str, _session: &Session<DaemonContext>| {
            if RELOAD_TOOLS.contains(&tool_name) {
                vec![CustomEvent::new(RELOAD_EVENT, serde_json::json!({}))]
            } else {
                Vec::new()
            }
        },
    )
}

/// Routes serving sandbox files, to be merged next to the session routes.
pub fn routes() -> Router<AppState<DaemonContext>> {
    Router::new()
        .route("/sessions/{id}/preview", get(preview_index))
        .route("/sessions/{id}/preview/", get(preview_index))
        .route("/sessions/{id}/preview/{*path}", get(preview_file))
}

async fn preview_index(State(state): State<AppState<DaemonContext>>, Path(id): Path<String>) -> Response {
    serve_sandbox_file(&state, SessionId(id), "index.html").await
}

async fn preview_file(
    State(state): State<AppState<DaemonContext>>,
    Path((id, path)): Path<(String, String)>,
) -> Response {
    serve_sandbox_file(&state, SessionId(id), &path).await
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

async fn serve_sandbox_file(state: &AppState<DaemonContext>, id: SessionId, requested: &str) -> Response {
    let sandbox_dir = match state.sessions.get(&id) {
        Some(session) => match &session.context().sandbox_dir {
            Some(dir) => dir.clone(),
            None => return error_response(StatusCode::NOT_FOUND, "Session has no preview"),
        },
        None => return error_response(StatusCode::NOT_FOUND, "Session not found"),
    };

    let requested = if requested.is_empty() { "index.html" } else { requested };
    let file_path = sandbox_dir.join(requested);
    if !SandboxGuard::new(&sandbox_dir).contains(&file_path) {
        log::warn!("Refusing preview path outside sandbox for session {}: {}", id, requested);
        return error_response(StatusCode::FORBIDDEN, "Forbidden");
    }

    match tokio::fs::read(&file_path).await {
        Ok(content) => {
            let mime = mime_guess::from_path(&file_path).first_or_octet_stream();
            (
                [
                    (header::CONTENT_TYPE, mime.to_string()),
                    (header::CACHE_CONTROL, "no-cache".to_string()),
                ],
                content,
            )
                .into_response()
        }
        Err(e) => {
            log::debug!("Preview file {} unavailable: {}", file_path.display(), e);
            error_response(StatusCode::NOT_FOUND, "Not found")
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
