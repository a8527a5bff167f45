//! In-process counters for the labeling loop.
//!
//! Plain atomics: the loop is the only writer, anything may read a snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    // Pass outcomes
    pub passes_completed: AtomicU64,
    pub passes_skipped: AtomicU64,
    pub patches_applied: AtomicU64,

    // Recoverable failures
    pub read_errors: AtomicU64,
    pub patch_errors: AtomicU64,
    pub probe_errors: AtomicU64,

    // Per-item findings
    pub probes_missing: AtomicU64,
    pub invalid_device_names: AtomicU64,

    // Cumulative microseconds spent in passes
    pub pass_time_us: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            passes_completed: AtomicU64::new(0),
            passes_skipped: AtomicU64::new(0),
            patches_applied: AtomicU64::new(0),
            read_errors: AtomicU64::new(0),
            patch_errors: AtomicU64::new(0),
            probe_errors: AtomicU64::new(0),
            probes_missing: AtomicU64::new(0),
            invalid_device_names: AtomicU64::new(0),
            pass_time_us: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc_passes_completed(&self) {
        self.passes_completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_passes_skipped(&self) {
        self.passes_skipped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_patches_applied(&self) {
        self.patches_applied.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_read_errors(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_patch_errors(&self) {
        self.patch_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_probe_errors(&self) {
        self.probe_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_probes_missing(&self, count: usize) {
        self.probes_missing.fetch_add(count as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_invalid_device_names(&self, count: usize) {
        self.invalid_device_names
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_pass_time(&self, start: Instant) {
        let elapsed_us = start.elapsed().as_micros() as u64;
        self.pass_time_us.fetch_add(elapsed_us, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            passes_completed: self.passes_completed.load(Ordering::Relaxed),
            passes_skipped: self.passes_skipped.load(Ordering::Relaxed),
            patches_applied: self.patches_applied.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            patch_errors: self.patch_errors.load(Ordering::Relaxed),
            probe_errors: self.probe_errors.load(Ordering::Relaxed),
            probes_missing: self.probes_missing.load(Ordering::Relaxed),
            invalid_device_names: self.invalid_device_names.load(Ordering::Relaxed),
            pass_time_us: self.pass_time_us.load(Ordering::Relaxed),
        }
    }

    /// Prometheus exposition format
    pub fn prometheus_format(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"# HELP node_labeler_passes_completed_total Reconciliation passes that ran to completion
# TYPE node_labeler_passes_completed_total counter
node_labeler_passes_completed_total {}

# HELP node_labeler_passes_skipped_total Reconciliation passes abandoned after a recoverable error
# TYPE node_labeler_passes_skipped_total counter
node_labeler_passes_skipped_total {}

# HELP node_labeler_patches_applied_total Label patches written to the node
# TYPE node_labeler_patches_applied_total counter
node_labeler_patches_applied_total {}

# HELP node_labeler_read_errors_total Failed node label reads
# TYPE node_labeler_read_errors_total counter
node_labeler_read_errors_total {}

# HELP node_labeler_patch_errors_total Failed node label patches
# TYPE node_labeler_patch_errors_total counter
node_labeler_patch_errors_total {}

# HELP node_labeler_probe_errors_total Failed hardware snapshots
# TYPE node_labeler_probe_errors_total counter
node_labeler_probe_errors_total {}

# HELP node_labeler_probes_missing_total Manifest sensors without a detection function
# TYPE node_labeler_probes_missing_total counter
node_labeler_probes_missing_total {}

# HELP node_labeler_invalid_device_names_total Rejected waggle device names
# TYPE node_labeler_invalid_device_names_total counter
node_labeler_invalid_device_names_total {}

# HELP node_labeler_pass_time_microseconds_total Cumulative pass time in microseconds
# TYPE node_labeler_pass_time_microseconds_total counter
node_labeler_pass_time_microseconds_total {}
"#,
            s.passes_completed,
            s.passes_skipped,
            s.patches_applied,
            s.read_errors,
            s.patch_errors,
            s.probe_errors,
            s.probes_missing,
            s.invalid_device_names,
            s.pass_time_us,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub passes_completed: u64,
    pub passes_skipped: u64,
    pub patches_applied: u64,
    pub read_errors: u64,
    pub patch_errors: u64,
    pub probe_errors: u64,
    pub probes_missing: u64,
    pub invalid_device_names: u64,
    pub pass_time_us: u64,
}

impl MetricsSnapshot {
    pub fn avg_pass_time_ms(&self) -> f64 {
        let passes = self.passes_completed + self.passes_skipped;
        if passes == 0 {
            0.0
        } else {
            (self.pass_time_us as f64 / passes as f64) / 1000.0
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Passes: {} completed, {} skipped | Patches: {} | \
             Errors: {} read, {} patch, {} probe | \
             Findings: {} missing probes, {} invalid devices | Avg pass: {:.2}ms",
            self.passes_completed,
            self.passes_skipped,
            self.patches_applied,
            self.read_errors,
            self.patch_errors,
            self.probe_errors,
            self.probes_missing,
            self.invalid_device_names,
            self.avg_pass_time_ms(),
        )
    }
}
