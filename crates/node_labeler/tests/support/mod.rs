//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use node_labeler::{
    HardwareProbeSource, LabelPatch, NodeApi, NodeApiError, NodeLabels, ProbeError, SyncConfig,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const NODE_NONE: &str = "0000000000000000.ws-none";
pub const NODE_NXCORE: &str = "0000000000000001.ws-nxcore";
pub const NODE_NXAGENT: &str = "0000000000000002.ws-nxagent";
pub const NODE_RPI_SHIELD: &str = "0000000000000003.ws-rpi";
pub const NODE_RPI_ENCLOSURE: &str = "0000000000000004.ws-rpi";
pub const NODE_BLADECORE: &str = "0000000000000005.sb-core";

pub const MANIFEST_WSN: &str = "node-manifest-v2-wsn.json";
pub const MANIFEST_BLADE: &str = "node-manifest-v2-blade.json";
pub const MANIFEST_LIDAR_FAIL: &str = "node-manifest-v2-lidar-fail.json";

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn config(node: &str, manifest: impl Into<PathBuf>) -> SyncConfig {
    SyncConfig {
        node: node.to_string(),
        manifest_path: manifest.into(),
        poll_interval: Duration::from_millis(10),
        oneshot: true,
        dry_run: false,
        metrics_file: None,
    }
}

pub fn labels(pairs: &[(&str, &str)]) -> NodeLabels {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// In-memory node object that records every patch and applies it with merge
/// semantics.
#[derive(Default)]
pub struct RecordingNodeApi {
    labels: Mutex<NodeLabels>,
    patches: Mutex<Vec<(String, LabelPatch)>>,
    reads: AtomicUsize,
    failing_reads: AtomicUsize,
    failing_patches: AtomicUsize,
}

impl RecordingNodeApi {
    pub fn with_labels(labels: NodeLabels) -> Self {
        Self {
            labels: Mutex::new(labels),
            ..Default::default()
        }
    }

    /// Fail the next `count` label reads.
    pub fn fail_reads(self, count: usize) -> Self {
        self.failing_reads.store(count, Ordering::SeqCst);
        self
    }

    /// Fail the next `count` patches.
    pub fn fail_patches(self, count: usize) -> Self {
        self.failing_patches.store(count, Ordering::SeqCst);
        self
    }

    pub fn labels(&self) -> NodeLabels {
        self.labels.lock().unwrap().clone()
    }

    pub fn patches(&self) -> Vec<(String, LabelPatch)> {
        self.patches.lock().unwrap().clone()
    }

    pub fn patch_count(&self) -> usize {
        self.patches.lock().unwrap().len()
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl NodeApi for RecordingNodeApi {
    async fn read_labels(&self, _node: &str) -> Result<NodeLabels, NodeApiError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failing_reads) {
            return Err(NodeApiError::Status {
                method: "GET",
                url: "https://test/api/v1/nodes".to_string(),
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(self.labels())
    }

    async fn patch_labels(&self, node: &str, patch: &LabelPatch) -> Result<(), NodeApiError> {
        if Self::take_failure(&self.failing_patches) {
            return Err(NodeApiError::Status {
                method: "PATCH",
                url: "https://test/api/v1/nodes".to_string(),
                status: 500,
                body: "boom".to_string(),
            });
        }
        {
            let mut labels = self.labels.lock().unwrap();
            for (key, value) in patch.labels() {
                match value {
                    Some(value) => {
                        labels.insert(key.clone(), value.clone());
                    }
                    None => {
                        labels.remove(key);
                    }
                }
            }
        }
        self.patches
            .lock()
            .unwrap()
            .push((node.to_string(), patch.clone()));
        Ok(())
    }
}

/// Probe source with fixed answers.
#[derive(Debug, Clone, Default)]
pub struct FakeProbeSource {
    pub bus_devices: BTreeSet<String>,
    pub usb_dump: String,
    pub device_files: BTreeSet<String>,
    pub extra_devices: Vec<String>,
    pub fail_usb: bool,
}

impl FakeProbeSource {
    pub fn with_bus_device(mut self, name: &str) -> Self {
        self.bus_devices.insert(name.to_string());
        self
    }

    pub fn with_device_file(mut self, relative: &str) -> Self {
        self.device_files.insert(relative.to_string());
        self
    }

    pub fn with_usb_dump(mut self, dump: &str) -> Self {
        self.usb_dump = dump.to_string();
        self
    }

    pub fn with_extra_device(mut self, name: &str) -> Self {
        self.extra_devices.push(name.to_string());
        self
    }
}

impl HardwareProbeSource for FakeProbeSource {
    fn bus_device_names(&self) -> Result<BTreeSet<String>, ProbeError> {
        Ok(self.bus_devices.clone())
    }

    fn usb_descriptor_dump(&self) -> Result<String, ProbeError> {
        if self.fail_usb {
            return Err(ProbeError::Task("lsusb unavailable".to_string()));
        }
        Ok(self.usb_dump.clone())
    }

    fn device_exists(&self, relative: &str) -> bool {
        self.device_files.contains(relative)
    }

    fn extra_device_names(&self) -> Result<Vec<String>, ProbeError> {
        Ok(self.extra_devices.clone())
    }
}
