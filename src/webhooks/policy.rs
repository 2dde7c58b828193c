//! Mutation policy for incoming pods.
//!
//! Pods are mutated by default. A pod opts out through the mutate
//! annotation, and a pod that already carries the status marker is never
//! mutated again. Reserved system namespaces are always skipped.

use std::collections::BTreeMap;

use tracing::info;

/// Opt-out annotation. Values `n`, `no`, `false` and `off` (any case) disable mutation.
pub const MUTATE_ANNOTATION: &str = "lxcfs-admission-webhook.aliyun.com/mutate";
/// Annotation written on every mutated pod
pub const STATUS_ANNOTATION: &str = "lxcfs-admission-webhook.aliyun.com/status";
/// Value of [`STATUS_ANNOTATION`] once a pod has been mutated
pub const STATUS_MUTATED: &str = "mutated";

/// Namespaces the webhook never touches
pub const IGNORED_NAMESPACES: [&str; 2] = ["kube-system", "kube-public"];

const OPT_OUT_VALUES: [&str; 4] = ["n", "no", "false", "off"];

/// Check whether the given annotation key leaves admission enabled.
///
/// Returns false for ignored namespaces regardless of annotations.
pub fn admission_required(
    ignored: &[&str],
    annotation_key: &str,
    namespace: Option<&str>,
    name: &str,
    annotations: Option<&BTreeMap<String, String>>,
) -> bool {
    let namespace = namespace.unwrap_or_default();
    if ignored.contains(&namespace) {
        info!(
            namespace = %namespace,
            name = %name,
            "Skipping pod in reserved namespace"
        );
        return false;
    }

    let value = annotation(annotations, annotation_key).to_lowercase();
    !OPT_OUT_VALUES.contains(&value.as_str())
}

/// Decide whether a pod needs the LXCFS mounts injected
pub fn mutation_required(
    namespace: Option<&str>,
    name: &str,
    annotations: Option<&BTreeMap<String, String>>,
) -> bool {
    let mut required = admission_required(
        &IGNORED_NAMESPACES,
        MUTATE_ANNOTATION,
        namespace,
        name,
        annotations,
    );

    if annotation(annotations, STATUS_ANNOTATION).eq_ignore_ascii_case(STATUS_MUTATED) {
        required = false;
    }

    info!(
        namespace = namespace.unwrap_or_default(),
        name = %name,
        required,
        "Mutation policy evaluated"
    );
    required
}

/// Annotation lookup treating a missing map the same as an empty one
fn annotation<'a>(annotations: Option<&'a BTreeMap<String, String>>, key: &str) -> &'a str {
    annotations
        .and_then(|a| a.get(key))
        .map(String::as_str)
        .unwrap_or_default()
}
