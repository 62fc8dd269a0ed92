//! JSON patch construction
//!
//! Builds the ordered sequence of patch operations the API server applies
//! to a Pod. The construction order is fixed and deterministic: volume
//! mounts per container in index order, then volumes, then the status
//! annotation. The surrounding control plane applies the sequence
//! atomically.

use std::collections::BTreeMap;

use json_patch::{AddOperation, PatchOperation, ReplaceOperation};
use jsonptr::PointerBuf;
use k8s_openapi::api::core::v1::{Pod, Volume, VolumeMount};
use serde_json::Value;

/// Build the full patch sequence for a Pod.
///
/// `volumes` and `mounts` are the augmentation to inject; both are empty
/// on the skip and conflict paths, in which case only the annotation
/// operations are emitted. `annotations` is the status bookkeeping to
/// write; BTreeMap iteration keeps the output order deterministic.
pub fn build(
    pod: &Pod,
    volumes: &[Volume],
    mounts: &[VolumeMount],
    annotations: &BTreeMap<String, String>,
) -> Vec<PatchOperation> {
    let mut ops = Vec::new();

    let containers = pod
        .spec
        .as_ref()
        .map(|spec| spec.containers.as_slice())
        .unwrap_or_default();
    for (index, container) in containers.iter().enumerate() {
        let existing = container.volume_mounts.as_deref().unwrap_or_default();
        ops.extend(volume_mount_ops(existing, mounts, index));
    }

    let existing_volumes = pod
        .spec
        .as_ref()
        .and_then(|spec| spec.volumes.as_deref())
        .unwrap_or_default();
    ops.extend(volume_ops(existing_volumes, volumes));

    ops.extend(annotation_ops(pod.metadata.annotations.as_ref(), annotations));

    ops
}

/// Operations adding `added` mounts to the container at `index`.
///
/// A container with no mounts gets the whole array in one operation;
/// otherwise each mount is appended individually so existing mounts are
/// preserved.
fn volume_mount_ops(
    existing: &[VolumeMount],
    added: &[VolumeMount],
    index: usize,
) -> Vec<PatchOperation> {
    if added.is_empty() {
        return Vec::new();
    }

    let idx = index.to_string();
    if existing.is_empty() {
        vec![PatchOperation::Add(AddOperation {
            path: PointerBuf::from_tokens(["spec", "containers", idx.as_str(), "volumeMounts"]),
            value: serde_json::to_value(added).unwrap_or_default(),
        })]
    } else {
        added
            .iter()
            .map(|mount| {
                PatchOperation::Add(AddOperation {
                    path: PointerBuf::from_tokens([
                        "spec",
                        "containers",
                        idx.as_str(),
                        "volumeMounts",
                        "-",
                    ]),
                    value: serde_json::to_value(mount).unwrap_or_default(),
                })
            })
            .collect()
    }
}

/// Operations adding `added` volumes at the Pod level.
fn volume_ops(existing: &[Volume], added: &[Volume]) -> Vec<PatchOperation> {
    if added.is_empty() {
        return Vec::new();
    }

    if existing.is_empty() {
        vec![PatchOperation::Add(AddOperation {
            path: PointerBuf::from_tokens(["spec", "volumes"]),
            value: serde_json::to_value(added).unwrap_or_default(),
        })]
    } else {
        added
            .iter()
            .map(|volume| {
                PatchOperation::Add(AddOperation {
                    path: PointerBuf::from_tokens(["spec", "volumes", "-"]),
                    value: serde_json::to_value(volume).unwrap_or_default(),
                })
            })
            .collect()
    }
}

/// Operations writing `added` annotation entries.
///
/// An already-present key is replaced at its escaped per-key path; an
/// absent key is added as a single-entry object at the parent path. Under
/// strict patch semantics a later add at the parent path replaces an
/// earlier one's result instead of merging; the pipeline only ever writes
/// a single status key per call, so each invocation stays well-defined.
fn annotation_ops(
    existing: Option<&BTreeMap<String, String>>,
    added: &BTreeMap<String, String>,
) -> Vec<PatchOperation> {
    let mut ops = Vec::new();
    for (key, value) in added {
        if existing.is_some_and(|target| target.contains_key(key)) {
            ops.push(PatchOperation::Replace(ReplaceOperation {
                path: PointerBuf::from_tokens(["metadata", "annotations", key.as_str()]),
                value: Value::String(value.clone()),
            }));
        } else {
            let mut entry = serde_json::Map::new();
            entry.insert(key.clone(), Value::String(value.clone()));
            ops.push(PatchOperation::Add(AddOperation {
                path: PointerBuf::from_tokens(["metadata", "annotations"]),
                value: Value::Object(entry),
            }));
        }
    }
    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{STATUS_ANNOTATION, STATUS_MUTATED, STATUS_SKIP};
    use crate::template::InjectionTemplate;
    use k8s_openapi::api::core::v1::{Container, PodSpec};

    fn status_annotations(value: &str) -> BTreeMap<String, String> {
        BTreeMap::from([(STATUS_ANNOTATION.to_string(), value.to_string())])
    }

    fn pod(containers: Vec<Container>, volumes: Option<Vec<Volume>>) -> Pod {
        Pod {
            spec: Some(PodSpec {
                containers,
                volumes,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn container(name: &str, mounts: Option<Vec<VolumeMount>>) -> Container {
        Container {
            name: name.to_string(),
            volume_mounts: mounts,
            ..Default::default()
        }
    }

    fn paths(ops: &[PatchOperation]) -> Vec<String> {
        ops.iter()
            .map(|op| match op {
                PatchOperation::Add(add) => add.path.to_string(),
                PatchOperation::Replace(replace) => replace.path.to_string(),
                other => panic!("unexpected operation {other:?}"),
            })
            .collect()
    }

    #[test]
    fn empty_container_gets_whole_mount_array() {
        let template = InjectionTemplate::lxcfs();
        let pod = pod(vec![container("app", None)], None);

        let ops = build(&pod, &template.volumes, &template.volume_mounts, &status_annotations(STATUS_MUTATED));
        let paths = paths(&ops);

        assert_eq!(
            paths,
            vec![
                "/spec/containers/0/volumeMounts",
                "/spec/volumes",
                "/metadata/annotations",
            ]
        );

        let PatchOperation::Add(mounts_op) = &ops[0] else {
            panic!("expected add");
        };
        let mounts = mounts_op.value.as_array().expect("whole mount array");
        assert_eq!(mounts.len(), template.volume_mounts.len());

        let PatchOperation::Add(volumes_op) = &ops[1] else {
            panic!("expected add");
        };
        assert_eq!(
            volumes_op.value.as_array().expect("whole volume array").len(),
            template.volumes.len()
        );

        let PatchOperation::Add(annotation_op) = &ops[2] else {
            panic!("expected add");
        };
        assert_eq!(
            annotation_op.value[STATUS_ANNOTATION],
            Value::String(STATUS_MUTATED.to_string())
        );
    }

    #[test]
    fn populated_container_gets_appends() {
        let template = InjectionTemplate::lxcfs();
        let existing_mount = VolumeMount {
            name: "token".to_string(),
            mount_path: "/var/run/secrets".to_string(),
            ..Default::default()
        };
        let existing_volume = Volume {
            name: "token".to_string(),
            ..Default::default()
        };
        let pod = pod(
            vec![container("app", Some(vec![existing_mount]))],
            Some(vec![existing_volume]),
        );

        let ops = build(&pod, &template.volumes, &template.volume_mounts, &status_annotations(STATUS_MUTATED));

        let append_mounts = ops
            .iter()
            .filter(|op| matches!(op, PatchOperation::Add(add) if add.path.to_string() == "/spec/containers/0/volumeMounts/-"))
            .count();
        assert_eq!(append_mounts, template.volume_mounts.len());

        let append_volumes = ops
            .iter()
            .filter(|op| matches!(op, PatchOperation::Add(add) if add.path.to_string() == "/spec/volumes/-"))
            .count();
        assert_eq!(append_volumes, template.volumes.len());
    }

    #[test]
    fn every_container_is_patched_in_index_order() {
        let template = InjectionTemplate::lxcfs();
        let pod = pod(
            vec![container("app", None), container("sidecar", None)],
            None,
        );

        let ops = build(&pod, &[], &template.volume_mounts, &status_annotations(STATUS_MUTATED));
        let paths = paths(&ops);
        assert_eq!(
            paths,
            vec![
                "/spec/containers/0/volumeMounts",
                "/spec/containers/1/volumeMounts",
                "/metadata/annotations",
            ]
        );
    }

    #[test]
    fn empty_augmentation_emits_only_annotations() {
        let pod = pod(vec![container("app", None)], None);
        let ops = build(&pod, &[], &[], &status_annotations(STATUS_SKIP));

        assert_eq!(ops.len(), 1);
        let PatchOperation::Add(op) = &ops[0] else {
            panic!("expected add");
        };
        assert_eq!(op.path.to_string(), "/metadata/annotations");
        assert_eq!(
            op.value[STATUS_ANNOTATION],
            Value::String(STATUS_SKIP.to_string())
        );
    }

    #[test]
    fn present_annotation_key_is_replaced_at_escaped_path() {
        let mut pod = pod(vec![], None);
        pod.metadata.annotations = Some(BTreeMap::from([(
            STATUS_ANNOTATION.to_string(),
            "skip".to_string(),
        )]));

        let ops = build(&pod, &[], &[], &status_annotations(STATUS_MUTATED));

        assert_eq!(ops.len(), 1);
        let PatchOperation::Replace(op) = &ops[0] else {
            panic!("expected replace");
        };
        assert_eq!(
            op.path.to_string(),
            "/metadata/annotations/mutating.lxcfs-admission-webhook.io~1status"
        );
        assert_eq!(op.value, Value::String(STATUS_MUTATED.to_string()));
    }

    #[test]
    fn unrelated_annotations_still_produce_parent_add() {
        let mut pod = pod(vec![], None);
        pod.metadata.annotations =
            Some(BTreeMap::from([("team".to_string(), "infra".to_string())]));

        let ops = build(&pod, &[], &[], &status_annotations(STATUS_SKIP));
        let PatchOperation::Add(op) = &ops[0] else {
            panic!("expected add");
        };
        assert_eq!(op.path.to_string(), "/metadata/annotations");
    }

    #[test]
    fn pointer_tokens_are_rfc6901_escaped() {
        let path = PointerBuf::from_tokens(["metadata", "annotations", "foo/bar~"]);
        assert_eq!(path.to_string(), "/metadata/annotations/foo~1bar~0");
    }

    #[test]
    fn build_is_deterministic() {
        let template = InjectionTemplate::lxcfs();
        let pod = pod(
            vec![container("app", None), container("sidecar", None)],
            None,
        );
        let annotations = status_annotations(STATUS_MUTATED);

        let first = serde_json::to_vec(&json_patch::Patch(build(
            &pod,
            &template.volumes,
            &template.volume_mounts,
            &annotations,
        )))
        .unwrap();
        let second = serde_json::to_vec(&json_patch::Patch(build(
            &pod,
            &template.volumes,
            &template.volume_mounts,
            &annotations,
        )))
        .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn patch_serializes_with_wire_field_names() {
        let pod = pod(vec![container("app", None)], None);
        let ops = build(&pod, &[], &[], &status_annotations(STATUS_SKIP));
        let wire = serde_json::to_string(&json_patch::Patch(ops)).unwrap();
        assert!(wire.contains(r#""op":"add""#));
        assert!(wire.contains(r#""path":"/metadata/annotations""#));
    }
}
