//! birdcmd agent: holds the control channel open and runs the shell
//! commands pushed over it.
//!
//! Usage:
//!   birdcmd -c <token>:<tunnelId> [-d] [--cn] [--long-running] [--config FILE]
//!
//! Env vars:
//!   BIRDCMD_CONFIG  optional TOML config file (flags win over it)
//!   RUST_LOG        log filter (default: info, debug in dev mode)

mod cli;

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use bc_agent_sdk::{AgentClientBuilder, AgentError};
use bc_tools::ShellExecutor;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("birdcmd {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let (config, config_path) = cli::load_config(cli.config.as_deref())?;
    let config = match cli::apply_flags(config, &cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    if !cli::report_issues(&config) {
        eprintln!("usage: birdcmd -c <token>:<tunnelId>");
        std::process::exit(1);
    }

    init_tracing(config.dev_mode);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        endpoint = %config.endpoint_url(),
        tunnel = %config.tunnel_id,
        config = config_path.as_deref().unwrap_or("-"),
        long_running = config.exec.long_running,
        "birdcmd starting"
    );

    let client = AgentClientBuilder::new().config(&config).build()?;
    let executor = ShellExecutor::new(&config.exec);

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    match client.run(Arc::new(executor), shutdown).await {
        Ok(()) | Err(AgentError::Shutdown) => {
            tracing::info!("exited");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "agent stopped");
            std::process::exit(1);
        }
    }
}

/// Compact stderr logging; `RUST_LOG` wins over the default level.
fn init_tracing(dev_mode: bool) {
    let default = if dev_mode { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Cancel `shutdown` on SIGINT (or SIGTERM on unix).
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
                let _ = ctrl_c.await;
                tracing::info!("received SIGINT, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        tracing::info!("received SIGINT, shutting down");
    }

    shutdown.cancel();
}
