//! neeter daemon: serves Claude agent sessions over HTTP + SSE.
//!
//! Plain-chat mode by default; `--sandbox-root` switches to live-preview
//! mode with one sandbox directory per session.

mod preview;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use neeter_core::{AgentConfig, ClaudeLauncher, MessageTranslator, SessionManager};
use neeter_http::{session_routes, AppBuilder, AppState};

use preview::DaemonContext;

// ============================================================================
// CLI Types
// ============================================================================

/// Bridge a Claude agent's sessions to web clients as server-sent events
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Path to the claude binary
    #[arg(long, env = "NEETER_AGENT_PATH", default_value = "claude")]
    agent_path: String,

    /// Model passed to the agent
    #[arg(long)]
    model: Option<String>,

    /// System prompt for plain-chat sessions
    #[arg(long, default_value = "You are a helpful assistant.")]
    system_prompt: String,

    /// Agent permission mode (default, acceptEdits, plan, bypassPermissions)
    #[arg(long, default_value = "default")]
    permission_mode: String,

    /// Enable live-preview mode, with per-session sandboxes under this directory
    #[arg(long)]
    sandbox_root: Option<PathBuf>,

    /// Let sandboxed agents run Bash
    #[arg(long)]
    allow_bash: bool,

    /// Serve a built front end from this directory
    #[arg(long)]
    static_dir: Option<String>,

    /// Write per-session agent transcripts here
    #[arg(long)]
    log_dir: Option<String>,

    /// Path the API is mounted under
    #[arg(long, default_value = "/api")]
    api_prefix: String,
}

impl Args {
    /// Agent options shared by every session.
    fn base_agent(&self) -> AgentConfig {
        let mut config = AgentConfig::new(&self.agent_path).permission_mode(&self.permission_mode);
        if let Some(model) = &self.model {
            config = config.model(model);
        }
        if let Some(dir) = &self.log_dir {
            config = config.log_dir(dir);
        }
        config
    }

    fn addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| format!("Invalid address {}:{}: {}", self.host, self.port, e))
    }
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> std::process::ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Args::parse()).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), String> {
    let addr = args.addr()?;
    let app = build_app(&args)?;

    neeter_http::serve(addr, app, shutdown_signal())
        .await
        .map_err(|e| format!("HTTP server failed: {}", e))
}

fn build_app(args: &Args) -> Result<axum::Router, String> {
    let launcher = Arc::new(ClaudeLauncher);
    let base = args.base_agent();

    let state: AppState<DaemonContext> = match &args.sandbox_root {
        Some(root) => {
            std::fs::create_dir_all(root)
                .map_err(|e| format!("Failed to create sandbox root {}: {}", root.display(), e))?;
            log::info!("Live-preview mode, sandboxes under {}", root.display());

            let manager = SessionManager::new(
                preview::preview_factory(root.clone(), base, args.allow_bash),
                launcher,
            );
            AppState::new(Arc::new(manager), Arc::new(preview::preview_translator()))
        }
        None => {
            log::info!("Plain-chat mode");
            let manager = SessionManager::new(
                preview::chat_factory(base.system_prompt(&args.system_prompt)),
                launcher,
            );
            AppState::new(Arc::new(manager), Arc::new(MessageTranslator::new()))
        }
    };

    let api = session_routes::<DaemonContext>()
        .merge(preview::routes())
        .with_state(state);

    let mut builder = AppBuilder::new(api).prefix(&args.api_prefix);
    if let Some(dir) = &args.static_dir {
        builder = builder.static_dir(dir);
    }
    Ok(builder.build())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

// ============================================================================
// TESTS
// ============================================================================
