//! Injection template (volumes and volume mounts to add)
//!
//! The template is pure configuration data: a fixed set of volume mounts
//! and volumes constructed once at startup and shared read-only by every
//! admission request. The built-in default masks the container's `/proc`
//! and `/sys` views with the files maintained by an lxcfs daemonset on the
//! node; operators can substitute their own set via a YAML file.

use std::fs::File;
use std::path::Path;

use k8s_openapi::api::core::v1::{HostPathVolumeSource, Volume, VolumeMount};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Name of the injected volume in the built-in template
const LXCFS_VOLUME: &str = "lxcfs";

/// Host directory where lxcfs maintains its fuse filesystem
const LXCFS_HOST_DIR: &str = "/var/lib/lxc/";

/// (mountPath, subPath) pairs for the read-only lxcfs file mounts
const LXCFS_FILE_MOUNTS: [(&str, &str); 8] = [
    ("/proc/cpuinfo", "lxcfs/proc/cpuinfo"),
    ("/proc/diskstats", "lxcfs/proc/diskstats"),
    ("/proc/loadavg", "lxcfs/proc/loadavg"),
    ("/proc/meminfo", "lxcfs/proc/meminfo"),
    ("/proc/stat", "lxcfs/proc/stat"),
    ("/proc/swaps", "lxcfs/proc/swaps"),
    ("/proc/uptime", "lxcfs/proc/uptime"),
    ("/sys/devices/system/cpu/online", "lxcfs/sys/devices/system/cpu/online"),
];

/// The fixed set of volume mounts and volumes the webhook injects.
///
/// Immutable after startup; shared by all requests without synchronization.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionTemplate {
    /// Mounts added to every container of a mutated Pod, in order
    #[serde(default)]
    pub volume_mounts: Vec<VolumeMount>,
    /// Volumes added to a mutated Pod, in order
    #[serde(default)]
    pub volumes: Vec<Volume>,
}

impl InjectionTemplate {
    /// The built-in lxcfs template: read-only mounts for the lxcfs-managed
    /// `/proc` and `/sys` files plus the backing hostPath volume.
    pub fn lxcfs() -> Self {
        let mut volume_mounts: Vec<VolumeMount> = LXCFS_FILE_MOUNTS
            .iter()
            .map(|(mount_path, sub_path)| VolumeMount {
                name: LXCFS_VOLUME.to_string(),
                mount_path: mount_path.to_string(),
                sub_path: Some(sub_path.to_string()),
                read_only: Some(true),
                ..Default::default()
            })
            .collect();

        // The lxcfs directory itself is remounted when the daemonset
        // restarts; HostToContainer propagation picks the new mount up
        // without recreating the pod.
        volume_mounts.push(VolumeMount {
            name: LXCFS_VOLUME.to_string(),
            mount_path: LXCFS_HOST_DIR.to_string(),
            read_only: Some(true),
            mount_propagation: Some("HostToContainer".to_string()),
            ..Default::default()
        });

        let volumes = vec![Volume {
            name: LXCFS_VOLUME.to_string(),
            host_path: Some(HostPathVolumeSource {
                path: LXCFS_HOST_DIR.to_string(),
                type_: Some("DirectoryOrCreate".to_string()),
            }),
            ..Default::default()
        }];

        Self {
            volume_mounts,
            volumes,
        }
    }

    /// Load an operator-supplied template from a YAML file.
    pub fn from_yaml_file(path: &Path) -> Result<Self, Error> {
        let file = File::open(path).map_err(|e| {
            Error::config(format!("cannot open template file {}: {e}", path.display()))
        })?;
        serde_yaml::from_reader(file).map_err(|e| {
            Error::config(format!("cannot parse template file {}: {e}", path.display()))
        })
    }
}
