//! Manifest document types.
//!
//! Real manifests carry many more fields per compute and sensor; anything not
//! modelled here is ignored on deserialization.

use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{ManifestError, Result};

/// Whole manifest document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub computes: Vec<Compute>,
    #[serde(default)]
    pub sensors: Vec<Sensor>,
}

impl Manifest {
    /// Parse a manifest from a JSON string.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|source| ManifestError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })
    }
}

/// One physical node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Compute {
    pub serial_no: String,
    pub name: String,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub hardware: ComputeHardware,
}

impl Compute {
    /// Zone as it should appear on the node label, `None` meaning "clear".
    pub fn zone_label(&self) -> Option<String> {
        self.zone.as_ref().map(|zone| zone.to_lowercase())
    }

    pub fn capabilities(&self) -> &[String] {
        &self.hardware.capabilities
    }
}

/// Fixed hardware facts of a compute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ComputeHardware {
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// A peripheral expected on the compute named by `scope`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Sensor {
    pub scope: String,
    pub hardware: SensorHardware,
}

impl Sensor {
    /// Key used to look up the detection probe.
    pub fn hardware_key(&self) -> &str {
        &self.hardware.hardware
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SensorHardware {
    pub hardware: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_for_missing_fields() {
        let manifest = Manifest::from_json(
            r#"{"computes": [{"serial_no": "0001", "name": "a", "hardware": {}}]}"#,
        )
        .unwrap();
        assert!(manifest.sensors.is_empty());
        let compute = &manifest.computes[0];
        assert!(compute.capabilities().is_empty());
        assert_eq!(compute.zone_label(), None);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let manifest = Manifest::from_json(
            r#"{
                "vsn": "W00A",
                "computes": [{"serial_no": "0001", "name": "a", "zone": "CORE",
                              "hardware": {"capabilities": ["gpu"], "hw_model": "xavier"}}],
                "sensors": [{"name": "bme", "scope": "a", "hardware": {"hardware": "bme280"}}]
            }"#,
        )
        .unwrap();
        assert_eq!(manifest.computes[0].zone_label().as_deref(), Some("core"));
        assert_eq!(manifest.sensors[0].hardware_key(), "bme280");
    }

    #[test]
    fn test_null_zone_is_none() {
        let manifest = Manifest::from_json(
            r#"{"computes": [{"serial_no": "0001", "name": "a", "zone": null}]}"#,
        )
        .unwrap();
        assert_eq!(manifest.computes[0].zone, None);
    }
}
