// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Unit tests for lxcfs-admission-webhook.
//!
//! These tests run without a Kubernetes cluster and test the policy and
//! patch stages through the public API.

#[path = "../common/mod.rs"]
mod common;

mod policy_tests {
    use std::collections::BTreeMap;

    use lxcfs_admission_webhook::webhooks::policy::IGNORED_NAMESPACES;
    use lxcfs_admission_webhook::webhooks::{
        MUTATE_ANNOTATION, STATUS_ANNOTATION, mutation_required,
    };

    fn annotations(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_is_required() {
        assert!(mutation_required(Some("team-a"), "web", None));
    }

    #[test]
    fn test_reserved_namespace_overrides_annotations() {
        let a = annotations(&[(MUTATE_ANNOTATION, "true")]);
        assert!(!mutation_required(Some("kube-system"), "dns", Some(&a)));
        assert!(!mutation_required(Some("kube-public"), "info", Some(&a)));
    }

    #[test]
    fn test_reserved_namespaces_are_exact_matches() {
        assert_eq!(IGNORED_NAMESPACES, ["kube-system", "kube-public"]);
        assert!(mutation_required(Some("kube-system-extra"), "web", None));
        assert!(mutation_required(Some("KUBE-SYSTEM"), "web", None));
    }

    #[test]
    fn test_opt_out_is_case_insensitive() {
        for value in ["No", "OFF", "False"] {
            let a = annotations(&[(MUTATE_ANNOTATION, value)]);
            assert!(!mutation_required(Some("default"), "web", Some(&a)));
        }
        let a = annotations(&[(MUTATE_ANNOTATION, "maybe")]);
        assert!(mutation_required(Some("default"), "web", Some(&a)));
    }

    #[test]
    fn test_marker_wins_over_malformed_opt_out() {
        let a = annotations(&[
            (STATUS_ANNOTATION, "MuTaTeD"),
            (MUTATE_ANNOTATION, "¯\\_(ツ)_/¯"),
        ]);
        assert!(!mutation_required(Some("default"), "web", Some(&a)));
    }
}

mod patch_tests {
    use json_patch::PatchOperation;
    use json_patch::jsonptr::PointerBuf;
    use lxcfs_admission_webhook::webhooks::templates::{VOLUME_MOUNTS, VOLUMES};
    use lxcfs_admission_webhook::webhooks::{STATUS_ANNOTATION, build_patch, escape_json_pointer};

    use crate::common::PodBuilder;

    fn op_json(op: &PatchOperation) -> serde_json::Value {
        serde_json::to_value(op).unwrap()
    }

    #[test]
    fn test_patch_completeness() {
        let pod = PodBuilder::new("web").container("app").build();
        let patch = build_patch(&pod).unwrap();

        assert_eq!(patch.0.len(), 3);

        let mounts = op_json(&patch.0[1]);
        assert_eq!(mounts["path"], "/spec/containers/0/volumeMounts");
        let mount_names: Vec<&str> = mounts["value"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["name"].as_str().unwrap())
            .collect();
        let expected: Vec<&str> = VOLUME_MOUNTS.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(mount_names, expected);

        let volumes = op_json(&patch.0[2]);
        assert_eq!(volumes["path"], "/spec/volumes");
        let volume_names: Vec<&str> = volumes["value"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["name"].as_str().unwrap())
            .collect();
        let expected: Vec<&str> = VOLUMES.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(volume_names, expected);
    }

    #[test]
    fn test_append_mode() {
        let pod = PodBuilder::new("web")
            .container_with_mounts("app", &[("cache", "/cache")])
            .volume("cache")
            .build();
        let patch = build_patch(&pod).unwrap();

        assert_eq!(patch.0.len(), 17);
        let appends = patch.0[1..]
            .iter()
            .map(op_json)
            .filter(|op| op["op"] == "add" && op["path"].as_str().unwrap().ends_with("/-"))
            .count();
        assert_eq!(appends, 16);
    }

    #[test]
    fn test_no_containers_still_adds_volumes() {
        let pod = PodBuilder::new("web").build();
        let patch = build_patch(&pod).unwrap();

        assert_eq!(patch.0.len(), 2);
        assert_eq!(op_json(&patch.0[1])["path"], "/spec/volumes");
    }

    #[test]
    fn test_empty_annotations_map_gets_single_key() {
        let pod = PodBuilder::new("web").empty_annotations().container("app").build();
        let patch = build_patch(&pod).unwrap();

        let op = op_json(&patch.0[0]);
        assert_eq!(op["op"], "add");
        assert_eq!(
            op["path"],
            "/metadata/annotations/lxcfs-admission-webhook.aliyun.com~1status"
        );
        assert_eq!(op["value"], "mutated");
    }

    #[test]
    fn test_escaped_status_key_decodes_back() {
        let path = format!("/{}", escape_json_pointer(STATUS_ANNOTATION));
        let pointer = PointerBuf::parse(&path).unwrap();
        let tokens: Vec<String> = pointer.tokens().map(|t| t.decoded().into_owned()).collect();
        assert_eq!(tokens, vec![STATUS_ANNOTATION.to_string()]);
    }
}
