//! lxcfs-admission-webhook - mounts LXCFS proc files into pods at admission time.
//!
//! This is the main entry point that:
//! - Parses command-line flags
//! - Initializes structured logging
//! - Starts the health server and the TLS webhook server
//! - Shuts both down on SIGTERM or SIGINT

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum_server::Handle;
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use lxcfs_admission_webhook::config::{Cli, Commands, LogFormat, WebhookArgs};
use lxcfs_admission_webhook::health::{HealthState, run_health_server};
use lxcfs_admission_webhook::run_webhook_server;

/// Grace period for in-flight admission requests to complete during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Webhook(args) => run(args).await,
    }
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("lxcfs_admission_webhook=info".parse()?)
        .add_directive("axum_server=info".parse()?);

    match format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    Ok(())
}

async fn run(args: WebhookArgs) -> anyhow::Result<()> {
    init_tracing(args.log_format)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting lxcfs-admission-webhook");

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("failed to install rustls crypto provider");
    }

    args.check_tls_files().map_err(anyhow::Error::msg)?;

    let health_state = Arc::new(HealthState::new());

    // Probes should answer even before the webhook is listening
    let health_handle = {
        let health_state = health_state.clone();
        let port = args.health_port;
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, port).await {
                error!("Health server error: {}", e);
            }
        })
    };

    let server_handle = Handle::new();
    let webhook_handle = {
        let health_state = health_state.clone();
        let handle = server_handle.clone();
        let args = args.clone();
        tokio::spawn(async move {
            run_webhook_server(
                health_state,
                args.port,
                &args.tls_cert_file,
                &args.tls_private_key_file,
                handle,
            )
            .await
        })
    };

    tokio::select! {
        result = webhook_handle => {
            let result = result.context("webhook server task panicked")?;
            result.context("webhook server failed")?;
        }
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");

            // Stop receiving new admission requests
            health_state.set_ready(false).await;
            info!("Marked webhook as not ready");

            server_handle.graceful_shutdown(Some(Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS)));
            info!(
                "Waiting up to {}s for in-flight admission requests to complete...",
                SHUTDOWN_GRACE_PERIOD_SECS
            );
            tokio::time::sleep(Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS)).await;

            info!("Grace period complete, shutting down");
        }
    }

    info!("Webhook stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Signal handler setup failures are fatal.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
