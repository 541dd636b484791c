//! chatsh-server: chat-driven shell session engine.
//!
//! Spawns PTY-backed shell sessions on operator request, streams their
//! output to a chat-style transport as rate-limited message edits, and
//! reclaims finished sessions after a grace period. Ships with a console
//! transport adapter; chat-network adapters implement the
//! `ChatTransport` trait from chatsh-core.

mod app;
mod config;
mod render;
mod router;
mod scheduler;
mod session;
mod transport;

use app::App;
use clap::Parser;
use config::ServerConfig;
use std::path::PathBuf;
use tracing::{error, info};
use transport::ConsoleTransport;

/// chatsh-server — chat-driven shell session engine
#[derive(Parser, Debug)]
#[command(name = "chatsh-server", version, about = "Chat-driven shell session engine")]
struct Cli {
    /// Config file path
    #[arg(long, default_value = "~/.chatsh/config.toml")]
    config: String,

    /// Shell used to run commands
    #[arg(long)]
    shell: Option<String>,

    /// Scratch directory for derived render artifacts
    #[arg(long)]
    scratch_dir: Option<String>,

    /// Disable the terminal-emulation renderer (raw text snapshots only)
    #[arg(long)]
    no_render: bool,

    /// How long finished sessions stay available, in seconds
    #[arg(long)]
    output_lifetime: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    use tracing_subscriber::EnvFilter;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting chatsh-server");

    let config_path = PathBuf::from(&cli.config);
    let config = match ServerConfig::load(
        Some(&config_path),
        cli.shell.as_deref(),
        cli.scratch_dir.as_deref(),
        cli.no_render,
        cli.output_lifetime,
    ) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    info!(
        shell = %config.shell,
        scratch_dir = %config.scratch_dir.display(),
        render = config.render_enabled,
        "engine configured"
    );

    let (chat_transport, events) = ConsoleTransport::start();
    let app = match App::new(config, chat_transport) {
        Ok(app) => app,
        Err(e) => {
            error!(error = %e, "failed to start engine");
            std::process::exit(1);
        }
    };

    // Run until the event stream ends or a shutdown signal arrives
    tokio::select! {
        result = app.run(events) => {
            if let Err(e) = result {
                error!(error = %e, "engine error");
                std::process::exit(1);
            }
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    info!("chatsh-server stopped");
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
