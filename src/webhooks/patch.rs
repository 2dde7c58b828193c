//! JSON Patch construction for LXCFS injection.
//!
//! The patch always contains, in order:
//! 1. the status annotation marking the pod as mutated
//! 2. the LXCFS volume mounts for every container
//! 3. the LXCFS host-path volumes for the pod
//!
//! Lists that are absent on the pod are created whole with a single `add`.
//! Lists that already exist get one `add` per entry at the `/-` end position,
//! which keeps whatever the pod already declared. Entries are appended
//! without checking for name collisions, so a pod that already mounts an
//! `lxcfs-*` volume ends up with a duplicate.

use json_patch::jsonptr::PointerBuf;
use json_patch::{AddOperation, Patch, PatchOperation, ReplaceOperation};
use k8s_openapi::api::core::v1::Pod;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::policy::{STATUS_ANNOTATION, STATUS_MUTATED};
use super::templates::{VOLUME_MOUNTS, VOLUMES};

/// Errors raised while assembling a patch
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// A template could not be converted to JSON
    #[error("failed to serialize patch value: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A generated path was not a valid JSON Pointer
    #[error("invalid patch path {path:?}: {source}")]
    Pointer {
        path: String,
        #[source]
        source: json_patch::jsonptr::ParseError,
    },
}

/// Escape a single JSON Pointer reference token (RFC 6901).
///
/// `~` must be encoded before `/`, otherwise the `~` introduced by `~1`
/// would be encoded a second time.
pub fn escape_json_pointer(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// Build the patch that injects the LXCFS volumes into `pod`.
///
/// Either the whole patch is built or an error is returned.
pub fn build_patch(pod: &Pod) -> Result<Patch, PatchError> {
    let name = pod.metadata.name.as_deref().unwrap_or_default();
    build_operations(pod).map(Patch).inspect_err(|e| {
        warn!(name = %name, error = %e, "Failed to build LXCFS patch");
    })
}

fn build_operations(pod: &Pod) -> Result<Vec<PatchOperation>, PatchError> {
    let mut ops = Vec::new();

    ops.push(status_annotation_op(pod)?);

    let containers = pod
        .spec
        .as_ref()
        .map(|spec| spec.containers.as_slice())
        .unwrap_or_default();
    for (i, container) in containers.iter().enumerate() {
        let path = format!("/spec/containers/{i}/volumeMounts");
        if container.volume_mounts.is_none() {
            ops.push(add(&path, &*VOLUME_MOUNTS)?);
        } else {
            let append = format!("{path}/-");
            for mount in VOLUME_MOUNTS.iter() {
                ops.push(add(&append, mount)?);
            }
        }
    }

    let has_volumes = pod
        .spec
        .as_ref()
        .is_some_and(|spec| spec.volumes.is_some());
    if has_volumes {
        for volume in VOLUMES.iter() {
            ops.push(add("/spec/volumes/-", volume)?);
        }
    } else {
        ops.push(add("/spec/volumes", &*VOLUMES)?);
    }

    Ok(ops)
}

/// Mark the pod as mutated, creating the annotations map when it is missing
fn status_annotation_op(pod: &Pod) -> Result<PatchOperation, PatchError> {
    let Some(annotations) = pod.metadata.annotations.as_ref() else {
        let value = serde_json::json!({ STATUS_ANNOTATION: STATUS_MUTATED });
        return Ok(PatchOperation::Add(AddOperation {
            path: pointer("/metadata/annotations")?,
            value,
        }));
    };

    let path = pointer(&format!(
        "/metadata/annotations/{}",
        escape_json_pointer(STATUS_ANNOTATION)
    ))?;
    let value = Value::String(STATUS_MUTATED.to_string());

    let existing = annotations
        .get(STATUS_ANNOTATION)
        .is_some_and(|v| !v.is_empty());
    Ok(if existing {
        PatchOperation::Replace(ReplaceOperation { path, value })
    } else {
        PatchOperation::Add(AddOperation { path, value })
    })
}

fn add<T: Serialize + ?Sized>(path: &str, value: &T) -> Result<PatchOperation, PatchError> {
    Ok(PatchOperation::Add(AddOperation {
        path: pointer(path)?,
        value: serde_json::to_value(value)?,
    }))
}

fn pointer(path: &str) -> Result<PointerBuf, PatchError> {
    PointerBuf::parse(path).map_err(|source| PatchError::Pointer {
        path: path.to_string(),
        source: source.into_original(),
    })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, PodSpec, Volume, VolumeMount};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn container(name: &str, mounts: Option<Vec<VolumeMount>>) -> Container {
        Container {
            name: name.to_string(),
            image: Some("nginx:latest".to_string()),
            volume_mounts: mounts,
            ..Default::default()
        }
    }

    fn pod(
        annotations: Option<BTreeMap<String, String>>,
        containers: Vec<Container>,
        volumes: Option<Vec<Volume>>,
    ) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                namespace: Some("default".to_string()),
                annotations,
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers,
                volumes,
                ..Default::default()
            }),
            status: None,
        }
    }

    fn paths(patch: &Patch) -> Vec<String> {
        let json = serde_json::to_value(patch).unwrap();
        json.as_array()
            .unwrap()
            .iter()
            .map(|op| op["path"].as_str().unwrap().to_string())
            .collect()
    }

    fn existing_mount() -> VolumeMount {
        VolumeMount {
            name: "data".to_string(),
            mount_path: "/data".to_string(),
            ..Default::default()
        }
    }

    fn existing_volume() -> Volume {
        Volume {
            name: "data".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_escape_json_pointer() {
        assert_eq!(escape_json_pointer("plain"), "plain");
        assert_eq!(escape_json_pointer("a/b"), "a~1b");
        assert_eq!(escape_json_pointer("a~b"), "a~0b");
        assert_eq!(escape_json_pointer("~/"), "~0~1");
        assert_eq!(
            escape_json_pointer(STATUS_ANNOTATION),
            "lxcfs-admission-webhook.aliyun.com~1status"
        );
    }

    #[test]
    fn test_fresh_pod_gets_three_operations() {
        let pod = pod(None, vec![container("app", None)], None);
        let patch = build_patch(&pod).unwrap();

        assert_eq!(
            paths(&patch),
            vec![
                "/metadata/annotations",
                "/spec/containers/0/volumeMounts",
                "/spec/volumes",
            ]
        );
        assert!(patch.0.iter().all(|op| matches!(op, PatchOperation::Add(_))));
    }

    #[test]
    fn test_annotations_map_created_when_missing() {
        let pod = pod(None, vec![], None);
        let patch = build_patch(&pod).unwrap();

        let PatchOperation::Add(op) = &patch.0[0] else {
            panic!("expected add operation");
        };
        assert_eq!(
            op.value,
            serde_json::json!({ "lxcfs-admission-webhook.aliyun.com/status": "mutated" })
        );
    }

    #[test]
    fn test_status_added_to_existing_annotations() {
        let annotations = BTreeMap::from([("team".to_string(), "web".to_string())]);
        let pod = pod(Some(annotations), vec![], None);
        let patch = build_patch(&pod).unwrap();

        let PatchOperation::Add(op) = &patch.0[0] else {
            panic!("expected add operation");
        };
        assert_eq!(
            op.path.as_str(),
            "/metadata/annotations/lxcfs-admission-webhook.aliyun.com~1status"
        );
        assert_eq!(op.value, Value::String("mutated".to_string()));
    }

    #[test]
    fn test_empty_status_value_is_added() {
        let annotations = BTreeMap::from([(STATUS_ANNOTATION.to_string(), String::new())]);
        let pod = pod(Some(annotations), vec![], None);
        let patch = build_patch(&pod).unwrap();
        assert!(matches!(patch.0[0], PatchOperation::Add(_)));
    }

    #[test]
    fn test_existing_status_value_is_replaced() {
        let annotations =
            BTreeMap::from([(STATUS_ANNOTATION.to_string(), "pending".to_string())]);
        let pod = pod(Some(annotations), vec![], None);
        let patch = build_patch(&pod).unwrap();

        let PatchOperation::Replace(op) = &patch.0[0] else {
            panic!("expected replace operation");
        };
        assert_eq!(op.value, Value::String("mutated".to_string()));

        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json[0]["op"], "replace");
    }

    #[test]
    fn test_whole_mount_list_matches_template() {
        let pod = pod(None, vec![container("app", None)], None);
        let patch = build_patch(&pod).unwrap();

        let PatchOperation::Add(mounts) = &patch.0[1] else {
            panic!("expected add operation");
        };
        let mounts: Vec<VolumeMount> = serde_json::from_value(mounts.value.clone()).unwrap();
        assert_eq!(mounts, *VOLUME_MOUNTS);

        let PatchOperation::Add(volumes) = &patch.0[2] else {
            panic!("expected add operation");
        };
        let volumes: Vec<Volume> = serde_json::from_value(volumes.value.clone()).unwrap();
        assert_eq!(volumes, *VOLUMES);
    }

    #[test]
    fn test_existing_lists_are_appended_to() {
        let pod = pod(
            None,
            vec![container("app", Some(vec![existing_mount()]))],
            Some(vec![existing_volume()]),
        );
        let patch = build_patch(&pod).unwrap();

        assert_eq!(patch.0.len(), 17);
        let paths = paths(&patch);
        assert!(
            paths[1..9]
                .iter()
                .all(|p| p == "/spec/containers/0/volumeMounts/-")
        );
        assert!(paths[9..].iter().all(|p| p == "/spec/volumes/-"));

        let PatchOperation::Add(first) = &patch.0[1] else {
            panic!("expected add operation");
        };
        assert_eq!(first.value["name"], "lxcfs-proc-cpuinfo");
        assert_eq!(first.value["readOnly"], true);
    }

    #[test]
    fn test_empty_mount_list_is_appended_to() {
        let pod = pod(None, vec![container("app", Some(vec![]))], None);
        let patch = build_patch(&pod).unwrap();
        // annotation + 8 appends + volumes
        assert_eq!(patch.0.len(), 10);
    }

    #[test]
    fn test_each_container_is_patched() {
        let pod = pod(
            None,
            vec![
                container("app", None),
                container("sidecar", Some(vec![existing_mount()])),
                container("logger", None),
            ],
            None,
        );
        let patch = build_patch(&pod).unwrap();
        let paths = paths(&patch);

        assert_eq!(patch.0.len(), 1 + 1 + 8 + 1 + 1);
        assert_eq!(paths[1], "/spec/containers/0/volumeMounts");
        assert!(
            paths[2..10]
                .iter()
                .all(|p| p == "/spec/containers/1/volumeMounts/-")
        );
        assert_eq!(paths[10], "/spec/containers/2/volumeMounts");
        assert_eq!(paths[11], "/spec/volumes");
    }

    #[test]
    fn test_serialized_patch_shape() {
        let pod = pod(None, vec![container("app", None)], None);
        let patch = build_patch(&pod).unwrap();
        let json = serde_json::to_value(&patch).unwrap();

        let ops = json.as_array().unwrap();
        assert_eq!(ops.len(), 3);
        for op in ops {
            assert_eq!(op["op"], "add");
        }
        assert_eq!(ops[1]["value"].as_array().unwrap().len(), 8);
        assert_eq!(
            ops[2]["value"][0]["hostPath"]["path"],
            "/var/lib/lxcfs/proc/cpuinfo"
        );
    }

    #[test]
    fn test_patch_applies_to_pod() {
        let pod = pod(
            Some(BTreeMap::from([("team".to_string(), "web".to_string())])),
            vec![container("app", Some(vec![existing_mount()]))],
            Some(vec![existing_volume()]),
        );
        let patch = build_patch(&pod).unwrap();

        let mut doc = serde_json::to_value(&pod).unwrap();
        json_patch::patch(&mut doc, &patch).unwrap();
        let patched: Pod = serde_json::from_value(doc).unwrap();

        let annotations = patched.metadata.annotations.unwrap();
        assert_eq!(annotations[STATUS_ANNOTATION], "mutated");
        assert_eq!(annotations["team"], "web");

        let spec = patched.spec.unwrap();
        let mounts = spec.containers[0].volume_mounts.as_ref().unwrap();
        assert_eq!(mounts.len(), 9);
        assert_eq!(mounts[0].name, "data");
        assert_eq!(spec.volumes.unwrap().len(), 9);
    }
}
