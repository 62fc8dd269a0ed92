//! Conflict detection between a Pod and the injection template
//!
//! Injecting into a Pod that already defines a volume or mount with the
//! same name (or the same mount path) would produce an invalid Pod or
//! silently shadow user configuration, so such Pods are left untouched
//! and marked with the `conflict` status instead.

use k8s_openapi::api::core::v1::{Pod, Volume, VolumeMount};

use crate::template::InjectionTemplate;

/// Whether applying `template` to `pod` would collide with the Pod's
/// existing volumes or volume mounts.
///
/// Short-circuits on the first hit. The result is a single boolean; it
/// does not report which container or volume conflicted.
pub fn has_conflict(pod: &Pod, template: &InjectionTemplate) -> bool {
    let Some(spec) = pod.spec.as_ref() else {
        return false;
    };

    for container in &spec.containers {
        let existing = container.volume_mounts.as_deref().unwrap_or_default();
        if volume_mounts_conflict(existing, &template.volume_mounts) {
            return true;
        }
    }

    let existing = spec.volumes.as_deref().unwrap_or_default();
    volumes_conflict(existing, &template.volumes)
}

/// Whether any existing mount shares a name or mount path with a mount
/// to be added.
pub fn volume_mounts_conflict(existing: &[VolumeMount], added: &[VolumeMount]) -> bool {
    existing.iter().any(|origin| {
        added
            .iter()
            .any(|add| origin.name == add.name || origin.mount_path == add.mount_path)
    })
}

/// Whether any existing volume shares a name with a volume to be added.
pub fn volumes_conflict(existing: &[Volume], added: &[Volume]) -> bool {
    existing
        .iter()
        .any(|origin| added.iter().any(|add| origin.name == add.name))
}
