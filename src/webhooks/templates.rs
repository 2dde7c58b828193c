//! LXCFS volume and mount tables injected into every mutated pod.
//!
//! LXCFS exposes container-aware copies of `/proc` and `/sys` files under a
//! host directory. Each entry below binds one of those files over its
//! kernel-provided counterpart inside the container, so tools like `free`
//! and `top` report the container's cgroup limits instead of the node's.
//!
//! Both tables are built once and only ever read. Entry `k` of
//! [`VOLUME_MOUNTS`] and entry `k` of [`VOLUMES`] share a name.

use std::sync::LazyLock;

use k8s_openapi::api::core::v1::{HostPathVolumeSource, Volume, VolumeMount};

/// Host directory where the LXCFS daemon mounts its FUSE filesystem
pub const LXCFS_MOUNT_ROOT: &str = "/var/lib/lxcfs";

/// `(volume name, path inside the container)` for every LXCFS-backed file.
/// The host path is the container path rooted at [`LXCFS_MOUNT_ROOT`].
const LXCFS_FILES: [(&str, &str); 8] = [
    ("lxcfs-proc-cpuinfo", "/proc/cpuinfo"),
    ("lxcfs-proc-meminfo", "/proc/meminfo"),
    ("lxcfs-proc-diskstats", "/proc/diskstats"),
    ("lxcfs-proc-stat", "/proc/stat"),
    ("lxcfs-proc-swaps", "/proc/swaps"),
    ("lxcfs-proc-uptime", "/proc/uptime"),
    ("lxcfs-proc-loadavg", "/proc/loadavg"),
    (
        "lxcfs-sys-devices-system-cpu-online",
        "/sys/devices/system/cpu/online",
    ),
];

/// Read-only mounts added to each container
pub static VOLUME_MOUNTS: LazyLock<Vec<VolumeMount>> = LazyLock::new(|| {
    LXCFS_FILES
        .iter()
        .map(|(name, path)| VolumeMount {
            name: (*name).to_string(),
            mount_path: (*path).to_string(),
            read_only: Some(true),
            ..Default::default()
        })
        .collect()
});

/// Host-path volumes added to the pod spec
pub static VOLUMES: LazyLock<Vec<Volume>> = LazyLock::new(|| {
    LXCFS_FILES
        .iter()
        .map(|(name, path)| Volume {
            name: (*name).to_string(),
            host_path: Some(HostPathVolumeSource {
                path: format!("{LXCFS_MOUNT_ROOT}{path}"),
                ..Default::default()
            }),
            ..Default::default()
        })
        .collect()
});
