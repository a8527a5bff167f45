//! Node hardware manifest.
//!
//! The manifest is a static JSON document describing every compute (physical
//! node) of a deployment together with the sensors attached to it:
//!
//! ```json
//! {
//!   "computes": [{"serial_no": "e45f012a1f42", "name": "rpi", "zone": "shield",
//!                 "hardware": {"capabilities": ["arm64", "poe"]}}],
//!   "sensors":  [{"scope": "rpi", "hardware": {"hardware": "bme680"}}]
//! }
//! ```
//!
//! It is re-read on every reconciliation pass, so nothing here is cached.

pub mod error;
pub mod types;

pub use error::{ManifestError, Result};
pub use types::{Compute, ComputeHardware, Manifest, Sensor, SensorHardware};

use std::path::Path;

/// Number of trailing characters of the node identifier that carry the serial.
pub const SERIAL_SUFFIX_LEN: usize = 12;

/// Load and parse a manifest file.
pub fn load_manifest(path: impl AsRef<Path>) -> Result<Manifest> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Manifest::from_json(&raw).map_err(|err| match err {
        ManifestError::Parse { source, .. } => ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })
}

/// Serial suffix derived from a node identifier.
///
/// `"0000E45F012A1F42.ws-rpi"` becomes `"e45f012a1f42"`: first dot segment,
/// lowercased, last 12 characters (or the whole segment if it is shorter).
pub fn node_serial(node: &str) -> String {
    let head = node.split('.').next().unwrap_or_default().to_lowercase();
    let chars: Vec<char> = head.chars().collect();
    let start = chars.len().saturating_sub(SERIAL_SUFFIX_LEN);
    chars[start..].iter().collect()
}

/// Find the compute whose serial number matches the node identifier.
///
/// The first matching compute in manifest order wins; extra matches are
/// logged since they point at a broken manifest.
pub fn find_compute<'m>(manifest: &'m Manifest, node: &str) -> Result<&'m Compute> {
    let serial = node_serial(node);
    let mut matches = manifest
        .computes
        .iter()
        .filter(|compute| compute.serial_no.to_lowercase() == serial);

    let compute = matches.next().ok_or_else(|| ManifestError::ComputeNotFound {
        node: node.to_string(),
        serial: serial.clone(),
    })?;

    let extra = matches.count();
    if extra > 0 {
        tracing::warn!(
            "{} additional computes share serial {}; using {}",
            extra,
            serial,
            compute.name
        );
    }

    Ok(compute)
}

/// Sensors scoped to `compute`, in manifest order.
pub fn sensors_for_compute<'m>(manifest: &'m Manifest, compute: &Compute) -> Vec<&'m Sensor> {
    manifest
        .sensors
        .iter()
        .filter(|sensor| sensor.scope == compute.name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MANIFEST: &str = r#"{
        "computes": [
            {"serial_no": "E45F012A1F42", "name": "rpi", "zone": "Shield",
             "hardware": {"capabilities": ["arm64", "poe"]}},
            {"serial_no": "000000000001", "name": "nxcore", "zone": null,
             "hardware": {"capabilities": ["gpu"]}}
        ],
        "sensors": [
            {"scope": "rpi", "hardware": {"hardware": "bme680"}},
            {"scope": "nxcore", "hardware": {"hardware": "gps"}},
            {"scope": "rpi", "hardware": {"hardware": "raingauge"}}
        ]
    }"#;

    #[test]
    fn test_node_serial() {
        assert_eq!(node_serial("0000e45f012a1f42.ws-rpi"), "e45f012a1f42");
        assert_eq!(node_serial("0000E45F012A1F42.ws-rpi"), "e45f012a1f42");
        assert_eq!(node_serial("abc.def.ghi"), "abc");
        assert_eq!(node_serial("0000000000000001"), "000000000001");
        assert_eq!(node_serial(""), "");
    }

    #[test]
    fn test_find_compute_case_insensitive() {
        let manifest = Manifest::from_json(MANIFEST).unwrap();
        let compute = find_compute(&manifest, "0000e45f012a1f42.ws-rpi").unwrap();
        assert_eq!(compute.name, "rpi");
        assert_eq!(compute.zone_label().as_deref(), Some("shield"));
    }

    #[test]
    fn test_find_compute_uses_first_segment_only() {
        let manifest = Manifest::from_json(MANIFEST).unwrap();
        // The serial appears after the dot, which must not count.
        let err = find_compute(&manifest, "node.0000e45f012a1f42").unwrap_err();
        assert!(matches!(err, ManifestError::ComputeNotFound { .. }));
    }

    #[test]
    fn test_find_compute_missing() {
        let manifest = Manifest::from_json(MANIFEST).unwrap();
        let err = find_compute(&manifest, "0000000000000000.ws-none").unwrap_err();
        match err {
            ManifestError::ComputeNotFound { node, serial } => {
                assert_eq!(node, "0000000000000000.ws-none");
                assert_eq!(serial, "000000000000");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_sensors_for_compute_keeps_manifest_order() {
        let manifest = Manifest::from_json(MANIFEST).unwrap();
        let compute = find_compute(&manifest, "0000e45f012a1f42.ws-rpi").unwrap();
        let keys: Vec<&str> = sensors_for_compute(&manifest, compute)
            .iter()
            .map(|sensor| sensor.hardware_key())
            .collect();
        assert_eq!(keys, vec!["bme680", "raingauge"]);
    }

    #[test]
    fn test_load_manifest_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MANIFEST.as_bytes()).unwrap();
        let manifest = load_manifest(file.path()).unwrap();
        assert_eq!(manifest.computes.len(), 2);
        assert_eq!(manifest.sensors.len(), 3);
    }

    #[test]
    fn test_load_manifest_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = load_manifest(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ManifestError::Read { .. }));
    }

    #[test]
    fn test_load_manifest_malformed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{\"computes\": [").unwrap();
        let err = load_manifest(file.path()).unwrap_err();
        match err {
            ManifestError::Parse { path, .. } => assert_eq!(path, file.path()),
            other => panic!("unexpected error: {other}"),
        }
    }
}
