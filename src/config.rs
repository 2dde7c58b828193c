//! Command-line configuration.
//!
//! Every flag can also be set through an environment variable so the
//! webhook Deployment can be configured without touching its args.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::webhooks::{WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT};

/// Default port for the health and metrics server
pub const HEALTH_PORT: u16 = 8080;

/// LXCFS admission webhook - mounts LXCFS proc files into pods
#[derive(Parser, Debug)]
#[command(name = "lxcfs-admission-webhook", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the mutating admission webhook server
    Webhook(WebhookArgs),
}

/// Output format for process logs
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable text
    Text,
}

/// Settings for the `webhook` subcommand
#[derive(Args, Debug, Clone)]
pub struct WebhookArgs {
    /// Secure port that the webhook listens on
    #[arg(long, env = "WEBHOOK_PORT", default_value_t = WEBHOOK_PORT)]
    pub port: u16,

    /// File containing the x509 certificate for HTTPS
    #[arg(long, env = "TLS_CERT_FILE", default_value = WEBHOOK_CERT_PATH)]
    pub tls_cert_file: PathBuf,

    /// File containing the x509 private key matching --tls-cert-file
    #[arg(long, env = "TLS_PRIVATE_KEY_FILE", default_value = WEBHOOK_KEY_PATH)]
    pub tls_private_key_file: PathBuf,

    /// Plain HTTP port for /healthz, /readyz and /metrics
    #[arg(long, env = "HEALTH_PORT", default_value_t = HEALTH_PORT)]
    pub health_port: u16,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

impl WebhookArgs {
    /// Return an error naming the first TLS file that does not exist
    pub fn check_tls_files(&self) -> Result<(), String> {
        for path in [&self.tls_cert_file, &self.tls_private_key_file] {
            if !path.exists() {
                return Err(format!("TLS file not found: {}", path.display()));
            }
        }
        Ok(())
    }
}
