//! Sandbox guard for agent tool calls.
//!
//! Confines file tools to one directory. The agent asks permission through
//! `can_use_tool` control requests; the runner hands each request to
//! [`SandboxGuard::check`] and writes the decision back.
//!
//! Paths are compared component-wise after lexical normalization, so
//! `/tmp/box-evil` is not inside `/tmp/box` and `/tmp/box/../etc` is not
//! inside either.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const OUTSIDE_SANDBOX_REASON: &str = "Access outside sandbox directory is not allowed";
pub const BASH_BLOCKED_REASON: &str =
    "Bash is blocked in sandbox mode because its path references cannot be verified";

/// The outcome of a permission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Block { reason: String },
}

impl Decision {
    pub(crate) fn block(reason: &str) -> Self {
        Decision::Block {
            reason: reason.to_string(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Allows tool calls only when their path stays under `root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxGuard {
    root: PathBuf,
    allow_bash: bool,
}

impl SandboxGuard {
    /// Create a guard for `root`, resolved against the current directory.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: resolve(root.as_ref()),
            allow_bash: false,
        }
    }

    /// Let `Bash` through. Its commands can reference any path, so this
    /// trades confinement for capability.
    pub fn allow_bash(mut self, allow: bool) -> Self {
        self.allow_bash = allow;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `path` (absolute, or relative to the current directory)
    /// resolves to the root or something beneath it.
    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        resolve(path.as_ref()).starts_with(&self.root)
    }

    /// Decide whether `tool_name` may run with `input`.
    ///
    /// Inspects `file_path`, falling back to `path` (Glob and Grep use the
    /// latter). Input without either is allowed.
    pub fn check(&self, tool_name: &str, input: &serde_json::Value) -> Decision {
        if tool_name == "Bash" && !self.allow_bash {
            return Decision::block(BASH_BLOCKED_REASON);
        }

        let target = input
            .get("file_path")
            .and_then(|v| v.as_str())
            .or_else(|| input.get("path").and_then(|v| v.as_str()))
            .filter(|p| !p.is_empty());

        match target {
            Some(path) if !self.contains(path) => {
                log::info!("Blocked {} outside sandbox: {}", tool_name, path);
                Decision::block(OUTSIDE_SANDBOX_REASON)
            }
            _ => Decision::Allow,
        }
    }
}

/// Make `path` absolute and fold away `.` and `..` without touching the disk.
fn resolve(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
