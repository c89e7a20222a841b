//! Claude agent runner.
//!
//! Drives one Claude CLI process per session:
//! - user turns from the session's prompt queue go to stdin
//! - stdout lines are parsed and pushed onto the session's message queue
//! - `can_use_tool` permission requests and sandbox hook callbacks are
//!   answered in place
//! - stderr is logged
//!
//! The process lives as long as the session. Closing the prompt queue closes
//! stdin, which lets the CLI exit on its own; aborting the session stops it.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin};

use crate::agents::claude::{
    control_response, hook_response, initialize_request, user_turn_envelope, AgentConfig, AgentMessage,
    SANDBOX_HOOK_ID,
};
use crate::logging::Transcript;
use crate::sandbox::{Decision, SandboxGuard};
use crate::session::{AgentLauncher, Session, SessionId};

/// How long a stopped agent gets to exit after SIGINT before it is killed.
const STOP_GRACE: Duration = Duration::from_secs(3);

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Failed to spawn agent: {0}")]
    Spawn(String),

    #[error("Agent I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to capture agent {0}")]
    MissingPipe(&'static str),

    #[error("Agent already launched for session {0}")]
    AlreadyLaunched(SessionId),

    #[error("Agent exited unsuccessfully: {0}")]
    Exited(ExitStatus),
}

impl AgentError {
    /// The `result` subtype reported to the client for this failure.
    pub fn subtype(&self) -> &'static str {
        match self {
            AgentError::Spawn(_) | AgentError::MissingPipe(_) => "error_agent_spawn",
            _ => "error_agent_exited",
        }
    }
}

/// How a run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The process exited with status 0.
    Exited,
    /// The session was aborted and the process stopped.
    Cancelled,
}

/// Launches each session's agent as a Claude CLI process on the tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClaudeLauncher;

impl<C: Send + Sync + 'static> AgentLauncher<C> for ClaudeLauncher {
    fn launch(&self, session: Arc<Session<C>>, config: AgentConfig) {
        tokio::spawn(async move {
            match run_agent(Arc::clone(&session), config).await {
                Ok(RunOutcome::Exited) => {
                    log::info!("Agent for session {} exited", session.id());
                    session.finish();
                }
                Ok(RunOutcome::Cancelled) => {
                    log::info!("Agent for session {} stopped", session.id());
                }
                Err(e) => {
                    // Surface the failure on the feed before closing it
                    session.push(AgentMessage::error_result(e.subtype()));
                    session.fail(e.to_string());
                }
            }
        });
    }
}

/// Run the agent for `session` until it exits or the session is aborted.
pub async fn run_agent<C>(session: Arc<Session<C>>, config: AgentConfig) -> Result<RunOutcome, AgentError> {
    let id = session.id().clone();
    let mut prompts = session
        .take_prompts()
        .ok_or_else(|| AgentError::AlreadyLaunched(id.clone()))?;
    let transcript = Transcript::open(config.log_dir.as_deref(), id.as_str());

    let mut cmd = config.command().map_err(AgentError::Spawn)?;
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| AgentError::Spawn(format!("{}: {}", config.binary_path, e)))?;

    let mut stdin = Some(child.stdin.take().ok_or(AgentError::MissingPipe("stdin"))?);
    let stdout = child.stdout.take().ok_or(AgentError::MissingPipe("stdout"))?;
    let stderr = child.stderr.take().ok_or(AgentError::MissingPipe("stderr"))?;

    log::info!("Started agent for session {} (pid {:?})", id, child.id());
    let stderr_task = tokio::spawn(forward_stderr(id.clone(), stderr, transcript.clone()));

    // Register the sandbox hook before the first turn goes out
    if config.sandbox.is_some() {
        if let Some(pipe) = stdin.as_mut() {
            write_line(pipe, &initialize_request(&format!("init-{}", id)), &transcript).await?;
        }
    }

    let cancel = session.cancel_token();
    let mut lines = BufReader::new(stdout).lines();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                stdin.take();
                stop(&mut child).await;
                stderr_task.abort();
                return Ok(RunOutcome::Cancelled);
            }

            prompt = prompts.recv(), if stdin.is_some() => match prompt {
                Some(text) => {
                    if let Some(pipe) = stdin.as_mut() {
                        write_line(pipe, &user_turn_envelope(&text), &transcript).await?;
                    }
                }
                None => {
                    // Prompt queue closed: end of input for the agent
                    log::debug!("Closing agent stdin for session {}", id);
                    stdin.take();
                }
            },

            line = lines.next_line() => match line? {
                Some(line) => {
                    transcript.line("STDOUT", &line);
                    let message = match AgentMessage::parse_line(&line) {
                        Some(message) => message,
                        None => {
                            log::debug!("agent stdout [{}] (not JSON): {}", id, line);
                            continue;
                        }
                    };

                    match message.message_type.as_str() {
                        "control_request" => {
                            if let (Some(reply), Some(pipe)) =
                                (answer_control_request(&message, config.sandbox.as_ref()), stdin.as_mut())
                            {
                                write_line(pipe, &reply, &transcript).await?;
                            }
                            continue;
                        }
                        // Acks for our own requests
                        "control_response" => continue,
                        _ => {}
                    }

                    session.push(message);
                }
                None => break,
            },
        }
    }

    let status = child.wait().await?;
    let _ = stderr_task.await;

    if status.success() {
        Ok(RunOutcome::Exited)
    } else {
        Err(AgentError::Exited(status))
    }
}

/// Build the reply to a `can_use_tool` request or a sandbox hook callback.
/// Other control requests get no reply.
pub fn answer_control_request(message: &AgentMessage, guard: Option<&SandboxGuard>) -> Option<String> {
    let request = message.request.as_ref()?;
    let request_id = message.request_id.as_deref()?;
    let empty = serde_json::json!({});

    match request.subtype.as_str() {
        "can_use_tool" => {
            let input = request.input.as_ref().unwrap_or(&empty);
            let decision = decide(guard, &request.tool_name, input);
            log::info!("Permission for {}: {:?}", request.tool_name, decision);
            Some(control_response(request_id, &decision, Some(input)))
        }
        "hook_callback" if request.callback_id.as_deref() == Some(SANDBOX_HOOK_ID) => {
            let hook_input = request.input.as_ref().unwrap_or(&empty);
            let tool_name = hook_input.get("tool_name").and_then(|v| v.as_str()).unwrap_or_default();
            let tool_input = hook_input.get("tool_input").unwrap_or(&empty);
            let decision = decide(guard, tool_name, tool_input);
            log::debug!("PreToolUse for {}: {:?}", tool_name, decision);
            Some(hook_response(request_id, &decision))
        }
        other => {
            log::debug!("Ignoring control request {}", other);
            None
        }
    }
}

fn decide(guard: Option<&SandboxGuard>, tool_name: &str, input: &serde_json::Value) -> Decision {
    match guard {
        Some(guard) => guard.check(tool_name, input),
        None => Decision::Allow,
    }
}

async fn write_line(stdin: &mut ChildStdin, line: &str, transcript: &Transcript) -> std::io::Result<()> {
    transcript.line("STDIN", line);
    stdin.write_all(line.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}

async fn forward_stderr(id: SessionId, stderr: ChildStderr, transcript: Transcript) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        log::warn!("agent stderr [{}]: {}", id, line);
        transcript.line("STDERR", &line);
    }
}

/// Stop the process gracefully (SIGINT on Unix, then force kill).
async fn stop(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            unsafe {
                libc::kill(pid as i32, libc::SIGINT);
            }
            if tokio::time::timeout(STOP_GRACE, child.wait()).await.is_ok() {
                return;
            }
        }
    }

    let _ = child.kill().await;
}
