//! Label reconciliation.
//!
//! Computes the desired resource labels of a node from the labels it carries
//! now, its manifest entry, and the probes. Precedence, lowest to highest:
//!
//! 1. every resource currently on the node → cleared
//! 2. every declared capability → present
//! 3. every scoped sensor whose probe detects it → present (a probe that
//!    misses never downgrades an earlier verdict)
//! 4. every valid `dev/waggle-*` device → present
//!
//! All collections are ordered, so the result only depends on set membership.

use node_labeler_manifest::{Compute, Sensor};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{error, warn};

use crate::defaults::{PRESENT_LABEL_VALUE, RESOURCE_LABEL_PREFIX, ZONE_LABEL};
use crate::registry::{ProbeNotFound, ProbeRegistry};

static DEVICE_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9-]+$").unwrap());

/// Desired state of one label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelValue {
    /// Set the label to `"true"`.
    Present,
    /// Remove the label from the node.
    Cleared,
    /// Leave the label alone.
    Untouched,
}

/// Desired resource labels, keyed by bare resource name (no prefix).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceLabelSet {
    entries: BTreeMap<String, LabelValue>,
}

impl ResourceLabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> LabelValue {
        self.entries.get(name).copied().unwrap_or(LabelValue::Untouched)
    }

    pub fn set_present(&mut self, name: &str) {
        self.entries.insert(name.to_string(), LabelValue::Present);
    }

    /// Track `name` without changing an existing verdict; new entries are
    /// cleared.
    pub fn track(&mut self, name: &str) {
        self.entries
            .entry(name.to_string())
            .or_insert(LabelValue::Cleared);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, LabelValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), *value))
    }

    /// Names of present resources, sorted.
    pub fn present(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, value)| *value == LabelValue::Present)
            .map(|(name, _)| name)
            .collect()
    }

    /// Wire form: `resource.<name>` → `Some("true")` or `None` (clear).
    pub fn to_labels(&self) -> BTreeMap<String, Option<String>> {
        self.iter()
            .filter_map(|(name, value)| {
                let wire = match value {
                    LabelValue::Present => Some(PRESENT_LABEL_VALUE.to_string()),
                    LabelValue::Cleared => None,
                    LabelValue::Untouched => return None,
                };
                Some((format!("{RESOURCE_LABEL_PREFIX}{name}"), wire))
            })
            .collect()
    }
}

/// Per-item problem found during reconciliation. None of them abort a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    ProbeMissing(ProbeNotFound),
    InvalidDeviceName(String),
}

/// Outcome of one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub resources: ResourceLabelSet,
    /// Lowercased zone, `None` clears any stale zone label.
    pub zone: Option<String>,
    pub findings: Vec<Finding>,
}

impl Reconciliation {
    /// Every label this reconciliation wants written, resources and zone.
    pub fn labels(&self) -> BTreeMap<String, Option<String>> {
        let mut labels = self.resources.to_labels();
        labels.insert(ZONE_LABEL.to_string(), self.zone.clone());
        labels
    }

    pub fn probes_missing(&self) -> usize {
        self.findings
            .iter()
            .filter(|finding| matches!(finding, Finding::ProbeMissing(_)))
            .count()
    }

    pub fn invalid_device_names(&self) -> usize {
        self.findings
            .iter()
            .filter(|finding| matches!(finding, Finding::InvalidDeviceName(_)))
            .count()
    }
}

/// Resource names (prefix stripped) among the node's current labels.
pub fn current_resource_names(labels: &BTreeMap<String, String>) -> BTreeSet<String> {
    labels
        .keys()
        .filter_map(|key| key.strip_prefix(RESOURCE_LABEL_PREFIX))
        .map(str::to_string)
        .collect()
}

pub fn is_valid_device_name(name: &str) -> bool {
    DEVICE_NAME_RE.is_match(name)
}

/// Compute the desired labels for one node.
pub fn reconcile(
    current: &BTreeSet<String>,
    compute: &Compute,
    sensors: &[&Sensor],
    registry: &ProbeRegistry<'_>,
    extra_devices: &[String],
) -> Reconciliation {
    let mut resources = ResourceLabelSet::new();
    let mut findings = Vec::new();

    for name in current {
        resources.track(name);
    }

    for capability in compute.capabilities() {
        resources.set_present(capability);
    }

    for sensor in sensors {
        let key = sensor.hardware_key();
        resources.track(key);
        match registry.resolve(key) {
            Ok(probe) => {
                if probe() {
                    resources.set_present(key);
                }
            }
            Err(missing) => {
                error!("{}", missing);
                findings.push(Finding::ProbeMissing(missing));
            }
        }
    }

    for name in extra_devices {
        if is_valid_device_name(name) {
            resources.set_present(name);
        } else {
            warn!("Ignoring device with invalid name: {}", name);
            findings.push(Finding::InvalidDeviceName(name.clone()));
        }
    }

    Reconciliation {
        resources,
        zone: compute.zone_label(),
        findings,
    }
}
