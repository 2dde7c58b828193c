//! Webhook module for mutating pod admission requests.
//!
//! Requests flow through three stages:
//! - `policy`: decide from namespace and annotations whether a pod is mutated
//! - `patch`: build the JSON patch injecting the LXCFS volumes and mounts
//! - `pods`: decode the request, run the two stages above, build the response

pub mod patch;
pub mod pods;
pub mod policy;
mod server;
pub mod templates;

pub use patch::{PatchError, build_patch, escape_json_pointer};
pub use pods::{Admission, AdmissionError, Outcome, mutate_pods};
pub use policy::{MUTATE_ANNOTATION, STATUS_ANNOTATION, STATUS_MUTATED, mutation_required};
pub use server::{
    WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT, WebhookError, WebhookState,
    create_webhook_router, run_webhook_server,
};

// Re-export kube-rs admission types for contract testing
pub use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
