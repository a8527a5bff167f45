//! Node resource labeler
//!
//! Detects the sensors attached to a cluster node and keeps the node's
//! `resource.*` and `zone` labels in line with what is actually present.

pub mod defaults;
pub mod metrics;
pub mod node_api;
pub mod probe;
pub mod reconcile;
pub mod registry;
pub mod sync;

pub use metrics::METRICS;
pub use node_api::{KubeConfig, KubeNodeApi, LabelPatch, NodeApi, NodeApiError, NodeLabels};
pub use probe::{FsProbeSource, HardwareProbeSource, ProbeError, ProbeSnapshot};
pub use reconcile::{reconcile, Finding, LabelValue, Reconciliation, ResourceLabelSet};
pub use registry::{ProbeNotFound, ProbeRegistry};
pub use sync::{ClusterLabelSync, PassReport, SyncConfig, SyncError};

use std::path::PathBuf;
use std::time::Duration;

#[derive(clap::Parser, Debug)]
#[command(
    name = "node-labeler",
    about = "Label a cluster node with the sensors attached to it"
)]
pub struct LabelerArgs {
    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Name of the node to label
    #[arg(long, env = "KUBENODE")]
    pub kubenode: String,

    /// Node manifest describing computes and sensors
    #[arg(
        long,
        env = "WAGGLE_NODE_MANIFEST",
        default_value = defaults::DEFAULT_MANIFEST_PATH
    )]
    pub manifest: PathBuf,

    /// Host filesystem root to probe
    #[arg(long, default_value = defaults::DEFAULT_ROOT)]
    pub root: PathBuf,

    /// Seconds between reconciliation passes
    #[arg(
        long,
        default_value_t = defaults::DEFAULT_POLL_INTERVAL_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub interval: u64,

    /// Run a single pass and exit
    #[arg(long)]
    pub oneshot: bool,

    /// Detect and log labels without updating the node
    #[arg(long)]
    pub dry_run: bool,

    /// Also write logs to a daily-rolling file in this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Write Prometheus-format counters to this file after every pass
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,

    /// Do not run lsusb; read USB product strings from sysfs instead
    #[arg(long)]
    pub no_lsusb: bool,

    /// API server URL (defaults to the in-cluster service address)
    #[arg(long)]
    pub api_server: Option<String>,

    /// Bearer token file (defaults to the service-account token)
    #[arg(long)]
    pub token_file: Option<PathBuf>,

    /// CA bundle for the API server (defaults to the service-account CA)
    #[arg(long)]
    pub ca_file: Option<PathBuf>,
}

impl LabelerArgs {
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            node: self.kubenode.clone(),
            manifest_path: self.manifest.clone(),
            poll_interval: Duration::from_secs(self.interval),
            oneshot: self.oneshot,
            dry_run: self.dry_run,
            metrics_file: self.metrics_file.clone(),
        }
    }

    pub fn probe_source(&self) -> FsProbeSource {
        let source = FsProbeSource::new(&self.root);
        if self.no_lsusb {
            source.without_usb_command()
        } else {
            source
        }
    }

    pub fn kube_config(&self) -> Result<KubeConfig, NodeApiError> {
        KubeConfig::resolve(
            self.api_server.clone(),
            self.token_file.clone(),
            self.ca_file.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_args_defaults() {
        let args = LabelerArgs::try_parse_from(["node-labeler", "--kubenode", "0000e45f012a1f42.ws-rpi"])
            .unwrap();
        assert_eq!(args.root, PathBuf::from("/"));
        assert_eq!(args.manifest, PathBuf::from(defaults::DEFAULT_MANIFEST_PATH));

        let config = args.sync_config();
        assert_eq!(config.node, "0000e45f012a1f42.ws-rpi");
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert!(!config.oneshot);
        assert!(!config.dry_run);
    }

    #[test]
    fn test_args_flags() {
        let args = LabelerArgs::try_parse_from([
            "node-labeler",
            "--kubenode",
            "n",
            "--oneshot",
            "--dry-run",
            "--interval",
            "5",
            "--root",
            "/host",
            "--api-server",
            "https://127.0.0.1:6443",
        ])
        .unwrap();
        let config = args.sync_config();
        assert!(config.oneshot);
        assert!(config.dry_run);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(args.probe_source().root(), std::path::Path::new("/host"));
        assert_eq!(args.kube_config().unwrap().server, "https://127.0.0.1:6443");
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result =
            LabelerArgs::try_parse_from(["node-labeler", "--kubenode", "n", "--interval", "0"]);
        assert!(result.is_err());
    }
}
