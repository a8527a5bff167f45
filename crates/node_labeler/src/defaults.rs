//! Canonical default values and label naming.

pub const DEFAULT_MANIFEST_PATH: &str = "/etc/waggle/node-manifest-v2.json";
pub const DEFAULT_ROOT: &str = "/";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Prefix of every hardware resource label on the node object.
pub const RESOURCE_LABEL_PREFIX: &str = "resource.";
pub const ZONE_LABEL: &str = "zone";
/// Wire value of a present resource label.
pub const PRESENT_LABEL_VALUE: &str = "true";

/// Device files named `waggle-<name>` under `dev/` are direct observations.
pub const EXTRA_DEVICE_PREFIX: &str = "waggle-";

pub const IN_CLUSTER_TOKEN_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
pub const IN_CLUSTER_CA_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";
pub const API_REQUEST_TIMEOUT_SECS: u64 = 30;
