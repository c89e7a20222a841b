//! Claude agent spawn configuration.
//!
//! Builds the command line for a long-lived `claude` process speaking
//! stream-json on both stdin and stdout, plus the two kinds of lines we
//! write to its stdin: user turns and permission answers.

use std::path::Path;

use tokio::process::Command;

use crate::sandbox::{Decision, SandboxGuard};

/// Configuration options for spawning a Claude agent.
#[derive(Debug, Clone, Default)]
pub struct AgentConfig {
    pub binary_path: String,
    pub working_dir: Option<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    /// `default`, `acceptEdits`, `plan` or `bypassPermissions`.
    pub permission_mode: Option<String>,
    pub allowed_tools: Vec<String>,
    pub disallowed_tools: Vec<String>,
    /// Answers `can_use_tool` requests. Without one every request is allowed.
    pub sandbox: Option<SandboxGuard>,
    /// Custom shell prefix (e.g. "/bin/zsh -l -c"); spawns directly when unset.
    pub shell_prefix: Option<String>,
    /// Directory for per-session protocol transcripts.
    pub log_dir: Option<String>,
}

impl AgentConfig {
    pub fn new(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            ..Default::default()
        }
    }

    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn permission_mode(mut self, mode: impl Into<String>) -> Self {
        self.permission_mode = Some(mode.into());
        self
    }

    pub fn allowed_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn disallowed_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disallowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn sandbox(mut self, guard: SandboxGuard) -> Self {
        self.sandbox = Some(guard);
        self
    }

    pub fn shell_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.shell_prefix = Some(prefix.into());
        self
    }

    pub fn log_dir(mut self, dir: impl Into<String>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// The CLI arguments, in a stable order.
    pub fn args(&self) -> Vec<String> {
        let mode = self
            .permission_mode
            .clone()
            .unwrap_or_else(|| "default".to_string());
        let mut args = vec![
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--input-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
            "--include-partial-messages".to_string(),
            "--permission-prompt-tool".to_string(),
            "stdio".to_string(),
            "--permission-mode".to_string(),
            mode,
        ];

        if let Some(ref model) = self.model {
            if !model.is_empty() {
                args.push("--model".to_string());
                args.push(model.clone());
            }
        }

        if let Some(ref prompt) = self.system_prompt {
            args.push("--system-prompt".to_string());
            args.push(prompt.clone());
        }

        if !self.allowed_tools.is_empty() {
            args.push("--allowedTools".to_string());
            args.push(self.allowed_tools.join(","));
        }

        if !self.disallowed_tools.is_empty() {
            args.push("--disallowedTools".to_string());
            args.push(self.disallowed_tools.join(","));
        }

        args
    }

    /// Build the process command. Stdio is left for the caller to wire up.
    pub fn command(&self) -> Result<Command, String> {
        let args = self.args();

        let mut cmd = match self.shell_prefix.as_deref().filter(|p| !p.trim().is_empty()) {
            Some(prefix) => {
                let mut parts = prefix.split_whitespace();
                let shell = parts.next().ok_or_else(|| "Empty shell prefix".to_string())?;

                let mut quoted = Vec::with_capacity(args.len() + 1);
                quoted.push(
                    shlex::try_quote(&self.binary_path)
                        .map_err(|_| format!("Invalid path: {}", self.binary_path))?
                        .into_owned(),
                );
                for arg in &args {
                    quoted.push(
                        shlex::try_quote(arg)
                            .map_err(|_| format!("Invalid argument: {}", arg))?
                            .into_owned(),
                    );
                }

                let mut cmd = Command::new(shell);
                cmd.args(parts).arg(quoted.join(" "));
                cmd
            }
            None => {
                let mut cmd = Command::new(&self.binary_path);
                cmd.args(&args);
                cmd
            }
        };

        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        // A nested agent refuses to start when it thinks it runs inside another
        cmd.env_remove("CLAUDECODE");
        prepare_path_env(&mut cmd, &self.binary_path);

        Ok(cmd)
    }
}

/// Prepend the binary's parent directory to PATH so node etc. are found.
fn prepare_path_env(cmd: &mut Command, binary_path: &str) {
    if !binary_path.contains('/') {
        return;
    }
    if let Some(dir) = Path::new(binary_path).parent().and_then(|d| d.to_str()) {
        let existing = std::env::var("PATH").unwrap_or_default();
        let combined = if existing.is_empty() {
            dir.to_string()
        } else {
            format!("{}:{}", dir, existing)
        };
        cmd.env("PATH", combined);
    }
}

/// A user turn as one stdin line.
pub fn user_turn_envelope(text: &str) -> String {
    serde_json::json!({
        "type": "user",
        "message": {
            "role": "user",
            "content": text
        }
    })
    .to_string()
}

/// Callback id of the PreToolUse hook that routes every tool call through
/// the sandbox guard.
pub const SANDBOX_HOOK_ID: &str = "sandbox_pre_tool_use";

/// The `initialize` control request registering the sandbox hook.
///
/// Permission prompts only cover tools that need approval in the current
/// mode; the hook fires for every tool call, read-only ones included.
pub fn initialize_request(request_id: &str) -> String {
    serde_json::json!({
        "type": "control_request",
        "request_id": request_id,
        "request": {
            "subtype": "initialize",
            "hooks": {
                "PreToolUse": [
                    {"matcher": null, "hookCallbackIds": [SANDBOX_HOOK_ID]}
                ]
            }
        }
    })
    .to_string()
}

/// The answer to a PreToolUse `hook_callback` as one stdin line.
pub fn hook_response(request_id: &str, decision: &Decision) -> String {
    let response = match decision {
        Decision::Allow => serde_json::json!({}),
        Decision::Block { reason } => serde_json::json!({
            "decision": "block",
            "reason": reason,
            "hookSpecificOutput": {
                "hookEventName": "PreToolUse",
                "permissionDecision": "deny",
                "permissionDecisionReason": reason,
            }
        }),
    };

    serde_json::json!({
        "type": "control_response",
        "response": {
            "subtype": "success",
            "request_id": request_id,
            "response": response,
        }
    })
    .to_string()
}

/// The answer to a `can_use_tool` control request as one stdin line.
pub fn control_response(
    request_id: &str,
    decision: &Decision,
    input: Option<&serde_json::Value>,
) -> String {
    let response = match decision {
        Decision::Allow => serde_json::json!({
            "behavior": "allow",
            "updatedInput": input.cloned().unwrap_or_else(|| serde_json::json!({})),
        }),
        Decision::Block { reason } => serde_json::json!({
            "behavior": "deny",
            "message": reason,
        }),
    };

    serde_json::json!({
        "type": "control_response",
        "response": {
            "subtype": "success",
            "request_id": request_id,
            "response": response,
        }
    })
    .to_string()
}
