//! Pod admission handling.
//!
//! Turns an admission request for a pod into an admission response: decode
//! the pod, run the mutation policy, and attach the LXCFS patch when needed.
//! Every failure becomes a denying response with a message. Nothing here is
//! ever allowed by accident.

use k8s_openapi::api::core::v1::Pod;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, SerializePatchError};
use tracing::{debug, error, info};

use super::patch::{PatchError, build_patch};
use super::policy::mutation_required;

/// API group of the only resource this webhook accepts (core group)
pub const POD_GROUP: &str = "";
/// API version of the only resource this webhook accepts
pub const POD_VERSION: &str = "v1";
/// Resource name of the only resource this webhook accepts
pub const POD_RESOURCE: &str = "pods";

/// Reasons a pod admission request is rejected
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    /// The webhook was registered for something other than pods
    #[error("expect resource to be pods.v1 in the core group, got {resource}.{version} in group {group:?}")]
    ResourceMismatch {
        group: String,
        version: String,
        resource: String,
    },

    /// The request carried no object
    #[error("admission request has no object")]
    MissingObject,

    /// The object could not be read as a pod
    #[error("failed to decode pod: {0}")]
    Decode(#[source] serde_json::Error),

    /// The patch could not be built
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// The patch could not be attached to the response
    #[error("failed to encode patch: {0}")]
    EncodePatch(#[from] SerializePatchError),
}

/// How a request was resolved, for metrics
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Allowed with the LXCFS patch attached
    Mutated,
    /// Allowed unchanged
    Skipped,
    /// Denied
    Rejected,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Mutated => "mutated",
            Outcome::Skipped => "skipped",
            Outcome::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response for a pod admission request along with how it was resolved
#[derive(Debug)]
pub struct Admission {
    pub response: AdmissionResponse,
    pub outcome: Outcome,
    /// Number of patch operations attached (zero unless mutated)
    pub patch_operations: usize,
}

/// Handle a pod admission request.
///
/// Requests for anything other than `v1/pods` are denied outright.
pub fn mutate_pods(request: &AdmissionRequest<DynamicObject>) -> Admission {
    match review(request) {
        Ok(admission) => admission,
        Err(e) => {
            error!(uid = %request.uid, error = %e, "Rejecting admission request");
            Admission {
                response: AdmissionResponse::from(request).deny(e.to_string()),
                outcome: Outcome::Rejected,
                patch_operations: 0,
            }
        }
    }
}

fn review(request: &AdmissionRequest<DynamicObject>) -> Result<Admission, AdmissionError> {
    debug!(uid = %request.uid, "Mutating pods");
    check_resource(request)?;

    let pod = decode_pod(request)?;
    let name = pod.metadata.name.as_deref().unwrap_or(request.name.as_str());
    let namespace = pod
        .metadata
        .namespace
        .as_deref()
        .or(request.namespace.as_deref());

    if !mutation_required(namespace, name, pod.metadata.annotations.as_ref()) {
        info!(
            uid = %request.uid,
            namespace = namespace.unwrap_or_default(),
            name = %name,
            "Skipping mutation due to policy check"
        );
        return Ok(Admission {
            response: AdmissionResponse::from(request),
            outcome: Outcome::Skipped,
            patch_operations: 0,
        });
    }

    let patch = build_patch(&pod)?;
    let patch_operations = patch.0.len();
    let response = AdmissionResponse::from(request).with_patch(patch)?;

    info!(
        uid = %request.uid,
        namespace = namespace.unwrap_or_default(),
        name = %name,
        patch_operations,
        "Injecting LXCFS volumes"
    );
    Ok(Admission {
        response,
        outcome: Outcome::Mutated,
        patch_operations,
    })
}

fn check_resource(request: &AdmissionRequest<DynamicObject>) -> Result<(), AdmissionError> {
    let gvr = &request.resource;
    if gvr.group == POD_GROUP && gvr.version == POD_VERSION && gvr.resource == POD_RESOURCE {
        return Ok(());
    }
    Err(AdmissionError::ResourceMismatch {
        group: gvr.group.clone(),
        version: gvr.version.clone(),
        resource: gvr.resource.clone(),
    })
}

fn decode_pod(request: &AdmissionRequest<DynamicObject>) -> Result<Pod, AdmissionError> {
    let object = request.object.as_ref().ok_or(AdmissionError::MissingObject)?;
    serde_json::to_value(object)
        .and_then(serde_json::from_value)
        .map_err(AdmissionError::Decode)
}
