//! Node label sync loop.
//!
//! Each pass: read the node's labels, load the manifest, find this node's
//! compute, snapshot the hardware, reconcile, patch. Between passes the loop
//! sleeps for the poll interval. A shutdown request is only honoured while
//! sleeping, never in the middle of a pass.
//!
//! Failure policy:
//! - label read, label patch: logged, pass skipped, retried on the next
//!   wake-up
//! - manifest unreadable, no compute for this node, hardware snapshot
//!   failure: the loop stops

use node_labeler_manifest::{find_compute, load_manifest, sensors_for_compute, ManifestError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::metrics::METRICS;
use crate::node_api::{LabelPatch, NodeApi, NodeApiError};
use crate::probe::{HardwareProbeSource, ProbeError, ProbeSnapshot};
use crate::reconcile::{current_resource_names, reconcile, Reconciliation};
use crate::registry::ProbeRegistry;

/// Sync loop configuration (plain data)
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Node name, used for manifest matching and as the patch target.
    pub node: String,
    pub manifest_path: PathBuf,
    pub poll_interval: Duration,
    /// Run a single pass and return its result.
    pub oneshot: bool,
    /// Compute and log labels but never patch the node.
    pub dry_run: bool,
    /// Write Prometheus-format counters here after every pass.
    pub metrics_file: Option<PathBuf>,
}

/// Errors that end a pass early, classified by whether the loop may go on.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to read labels of node {node}: {source}")]
    ReadNode {
        node: String,
        #[source]
        source: NodeApiError,
    },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("Hardware probe failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("Failed to patch labels of node {node}: {source}")]
    PatchNode {
        node: String,
        #[source]
        source: NodeApiError,
    },
}

impl SyncError {
    /// Configuration problems and probe failures that retrying cannot fix.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Manifest(_) | SyncError::Probe(_))
    }

    pub fn is_recoverable(&self) -> bool {
        !self.is_fatal()
    }
}

/// What a completed pass computed and whether it was written.
#[derive(Debug, Clone)]
pub struct PassReport {
    pub reconciliation: Reconciliation,
    pub patch: LabelPatch,
    pub applied: bool,
}

pub struct ClusterLabelSync<A, S> {
    config: SyncConfig,
    api: A,
    source: Arc<S>,
}

impl<A, S> ClusterLabelSync<A, S>
where
    A: NodeApi,
    S: HardwareProbeSource + 'static,
{
    pub fn new(config: SyncConfig, api: A, source: S) -> Self {
        Self {
            config,
            api,
            source: Arc::new(source),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Main loop - consumes self. Returns on shutdown, after the single pass
    /// in oneshot mode, or with the first fatal error.
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) -> Result<(), SyncError> {
        info!(
            "Labeling node {} every {}s (manifest: {}, dry run: {})",
            self.config.node,
            self.config.poll_interval.as_secs(),
            self.config.manifest_path.display(),
            self.config.dry_run
        );

        loop {
            let result = self.run_pass().await;
            self.write_metrics();

            match result {
                Ok(_) => {}
                Err(err) if self.config.oneshot || err.is_fatal() => {
                    error!("{}", err);
                    return Err(err);
                }
                Err(err) => {
                    warn!(
                        "{}; retrying in {}s",
                        err,
                        self.config.poll_interval.as_secs()
                    );
                }
            }

            if self.config.oneshot {
                return Ok(());
            }

            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    info!("Shutdown requested, stopping");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!("{}", METRICS.snapshot().summary());
        Ok(())
    }

    /// One full reconciliation pass, with metrics.
    pub async fn run_pass(&self) -> Result<PassReport, SyncError> {
        let start = Instant::now();
        let result = self.reconcile_once().await;
        METRICS.record_pass_time(start);

        match &result {
            Ok(_) => METRICS.inc_passes_completed(),
            Err(err) => {
                match err {
                    SyncError::ReadNode { .. } => METRICS.inc_read_errors(),
                    SyncError::PatchNode { .. } => METRICS.inc_patch_errors(),
                    SyncError::Probe(_) => METRICS.inc_probe_errors(),
                    SyncError::Manifest(_) => {}
                }
                if err.is_recoverable() {
                    METRICS.inc_passes_skipped();
                }
            }
        }

        result
    }

    async fn reconcile_once(&self) -> Result<PassReport, SyncError> {
        let node = self.config.node.as_str();

        let labels = self
            .api
            .read_labels(node)
            .await
            .map_err(|source| SyncError::ReadNode {
                node: node.to_string(),
                source,
            })?;
        let current = current_resource_names(&labels);

        let manifest = load_manifest(&self.config.manifest_path)?;
        let compute = find_compute(&manifest, node)?;
        let sensors = sensors_for_compute(&manifest, compute);
        debug!(
            "Compute {} with {} capabilities and {} sensors",
            compute.name,
            compute.capabilities().len(),
            sensors.len()
        );

        let snapshot = self.capture_snapshot().await?;
        let registry = ProbeRegistry::builtin(&snapshot);
        let reconciliation = reconcile(
            &current,
            compute,
            &sensors,
            &registry,
            &snapshot.extra_devices,
        );
        METRICS.add_probes_missing(reconciliation.probes_missing());
        METRICS.add_invalid_device_names(reconciliation.invalid_device_names());

        debug!("detected: {}", reconciliation.resources.present().join(", "));
        info!(
            "applying resources: {}",
            reconciliation.resources.present().join(", ")
        );
        info!(
            "applying zone: {}",
            reconciliation.zone.as_deref().unwrap_or("<cleared>")
        );

        let patch = LabelPatch::new(reconciliation.labels());
        if self.config.dry_run {
            info!("dry run, not updating labels");
            return Ok(PassReport {
                reconciliation,
                patch,
                applied: false,
            });
        }

        info!("updating labels");
        self.api
            .patch_labels(node, &patch)
            .await
            .map_err(|source| SyncError::PatchNode {
                node: node.to_string(),
                source,
            })?;
        METRICS.inc_patches_applied();

        Ok(PassReport {
            reconciliation,
            patch,
            applied: true,
        })
    }

    /// Filesystem walks and `lsusb` block, so they run off the async workers.
    async fn capture_snapshot(&self) -> Result<ProbeSnapshot, ProbeError> {
        let source = Arc::clone(&self.source);
        tokio::task::spawn_blocking(move || ProbeSnapshot::capture(source.as_ref()))
            .await
            .map_err(|err| ProbeError::Task(err.to_string()))?
    }

    fn write_metrics(&self) {
        let Some(path) = &self.config.metrics_file else {
            return;
        };
        let tmp = path.with_extension("tmp");
        let result = std::fs::write(&tmp, METRICS.prometheus_format())
            .and_then(|_| std::fs::rename(&tmp, path));
        if let Err(err) = result {
            warn!("Failed to write metrics to {}: {}", path.display(), err);
        }
    }
}
