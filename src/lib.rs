//! lxcfs-admission-webhook library crate
//!
//! Mutating admission webhook that bind-mounts LXCFS views of `/proc` and
//! `/sys` files into every container of newly created pods, so workloads see
//! their own resource limits instead of the node's.

pub mod config;
pub mod health;
pub mod webhooks;

pub use health::HealthState;
pub use webhooks::{
    WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT, WebhookError, run_webhook_server,
};
