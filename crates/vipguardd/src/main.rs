//! vipguardd: the vipguard daemon.
//!
//! One binary, two roles, fixed at start-up:
//! - **primary**: watches the proxy config directory, restarts the proxy on
//!   change, and pushes `POST /update-config` to every secondary once the
//!   proxy is healthy again
//! - **secondary**: probes the primary's `/health` and broadcasts gratuitous
//!   ARP for the VIP on every unhealthy tick; pulls config on demand
//!
//! Both roles serve the same HTTP surface.
//!
//! # Usage
//!
//! ```text
//! vipguardd run --config /etc/vipguard/vipguard.toml
//! vipguardd validate --config /etc/vipguard/vipguard.toml
//! ```

mod primary_mode;
mod secondary_mode;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{info, warn};

use vipguard_core::{HaConfig, Role};
use vipguard_docker::{DockerClient, ProcessMonitor};

#[derive(Parser)]
#[command(name = "vipguardd", about = "Active-passive HA for a reverse proxy", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon in the configured role.
    Run {
        /// Path to vipguard.toml.
        #[arg(long, env = "VIPGUARD_CONFIG")]
        config: PathBuf,

        /// Override the HTTP listen address.
        #[arg(long)]
        listen: Option<SocketAddr>,

        /// Override the configured role.
        #[arg(long)]
        role: Option<Role>,

        /// Log output format.
        #[arg(long, value_enum, default_value_t = LogFormat::Text)]
        log_format: LogFormat,
    },
    /// Load and validate a config file, then exit.
    Validate {
        /// Path to vipguard.toml.
        #[arg(long, env = "VIPGUARD_CONFIG")]
        config: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            listen,
            role,
            log_format,
        } => {
            init_tracing(log_format);
            let mut config = load_config(&config)?;
            if let Some(listen) = listen {
                config.listen = listen;
            }
            if let Some(role) = role {
                config.role = role;
            }
            // Overrides can change which sections are required.
            config.validate().context("invalid configuration")?;
            run(config).await
        }
        Command::Validate { config } => {
            init_tracing(LogFormat::Text);
            let config = load_config(&config)?;
            config.validate().context("invalid configuration")?;
            println!("configuration ok: role={} listen={}", config.role, config.listen);
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,vipguardd=debug,vipguard=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(path: &Path) -> anyhow::Result<HaConfig> {
    HaConfig::from_file(path).with_context(|| format!("loading {}", path.display()))
}

async fn run(config: HaConfig) -> anyhow::Result<()> {
    info!(role = %config.role, listen = %config.listen, "vipguard daemon starting");

    // ── Container runtime ──────────────────────────────────────
    let docker = DockerClient::new(&config.proxy.docker_uri)
        .with_context(|| format!("docker endpoint {}", config.proxy.docker_uri))?;
    let monitor = ProcessMonitor::new(Arc::new(docker), &config.proxy.image_prefix);
    info!(
        docker = %config.proxy.docker_uri,
        image_prefix = %config.proxy.image_prefix,
        "process monitor initialized"
    );

    // ── Shutdown signal ────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Role loop ──────────────────────────────────────────────
    let role_handle = match config.role {
        Role::Primary => primary_mode::spawn(&config, monitor.clone(), shutdown_rx.clone())?,
        Role::Secondary => secondary_mode::spawn(&config, shutdown_rx.clone())?,
    };

    // ── HTTP surface ───────────────────────────────────────────
    let state = vipguard_api::ApiState::from_config(&config, monitor)?;
    let router = vipguard_api::build_router(state);
    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    info!(addr = %config.listen, "API server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    // An in-flight rollout finishes before the loop observes shutdown.
    if let Err(e) = role_handle.await {
        warn!(error = %e, "role loop ended abnormally");
    }

    info!("vipguard daemon stopped");
    Ok(())
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
