//! Hardware probe sources.
//!
//! A [`HardwareProbeSource`] exposes raw facts about the host: IIO bus device
//! names, a USB descriptor dump, and device-file presence. A
//! [`ProbeSnapshot`] freezes those facts once per pass so every probe in the
//! registry sees the same view of the hardware.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use thiserror::Error;
use tracing::debug;

use crate::defaults::EXTRA_DEVICE_PREFIX;

/// Device files checked for presence in every snapshot.
pub const PROBED_DEVICE_FILES: &[&str] = &["dev/gps", "dev/airquality", "dev/ttyUSB0"];

const IIO_NAME_GLOB: &str = "sys/bus/iio/devices/*/name";
const USB_PRODUCT_GLOB: &str = "sys/bus/usb/devices/*/product";
const EXTRA_DEVICE_GLOB: &str = "dev/waggle-*";

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Invalid probe pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Failed to run {program}: {source}")]
    UsbCommandSpawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    UsbCommandFailed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("Probe task failed: {0}")]
    Task(String),
}

/// Raw hardware facts of the host.
pub trait HardwareProbeSource: Send + Sync {
    /// Lowercased names of the devices on the IIO bus.
    fn bus_device_names(&self) -> Result<BTreeSet<String>, ProbeError>;

    /// Free-text USB descriptor dump.
    fn usb_descriptor_dump(&self) -> Result<String, ProbeError>;

    /// Whether `relative` exists below the probe root.
    fn device_exists(&self, relative: &str) -> bool;

    /// Names of `dev/waggle-*` device files with the prefix stripped.
    fn extra_device_names(&self) -> Result<Vec<String>, ProbeError>;
}

/// Point-in-time copy of everything the probes look at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeSnapshot {
    pub bus_devices: BTreeSet<String>,
    pub usb_dump: String,
    pub device_files: BTreeSet<String>,
    pub extra_devices: Vec<String>,
}

impl ProbeSnapshot {
    pub fn capture<S: HardwareProbeSource + ?Sized>(source: &S) -> Result<Self, ProbeError> {
        let bus_devices = source.bus_device_names()?;
        let usb_dump = source.usb_descriptor_dump()?;
        let device_files = PROBED_DEVICE_FILES
            .iter()
            .filter(|path| source.device_exists(path))
            .map(|path| path.to_string())
            .collect();
        let extra_devices = source.extra_device_names()?;

        Ok(Self {
            bus_devices,
            usb_dump,
            device_files,
            extra_devices,
        })
    }

    pub fn has_bus_device(&self, name: &str) -> bool {
        self.bus_devices.contains(&name.to_lowercase())
    }

    pub fn has_device_file(&self, relative: &str) -> bool {
        self.device_files.contains(relative)
    }
}

/// Probe source backed by a (possibly relocated) host filesystem.
///
/// The USB dump comes from `lsusb -v` when it is on `PATH`; otherwise the
/// product strings under `sys/bus/usb/devices` stand in for it.
#[derive(Debug, Clone)]
pub struct FsProbeSource {
    root: PathBuf,
    usb_command: Option<Vec<String>>,
}

impl FsProbeSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            usb_command: Some(vec!["lsusb".to_string(), "-v".to_string()]),
        }
    }

    /// Never run a USB listing command; read sysfs product strings only.
    pub fn without_usb_command(mut self) -> Self {
        self.usb_command = None;
        self
    }

    pub fn with_usb_command(mut self, program: &str, args: &[&str]) -> Self {
        let mut command = vec![program.to_string()];
        command.extend(args.iter().map(|arg| arg.to_string()));
        self.usb_command = Some(command);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn glob(&self, relative: &str) -> Result<Vec<PathBuf>, ProbeError> {
        let root = glob::Pattern::escape(&self.root.to_string_lossy());
        let pattern = format!("{}/{}", root.trim_end_matches('/'), relative);
        let paths = glob::glob(&pattern).map_err(|source| ProbeError::Pattern {
            pattern: pattern.clone(),
            source,
        })?;

        let mut found = Vec::new();
        for entry in paths {
            match entry {
                Ok(path) => found.push(path),
                Err(err) => debug!("Skipping unreadable path: {}", err),
            }
        }
        Ok(found)
    }

    fn sysfs_usb_products(&self) -> Result<String, ProbeError> {
        let mut products = Vec::new();
        for path in self.glob(USB_PRODUCT_GLOB)? {
            match std::fs::read_to_string(&path) {
                Ok(product) => products.push(product.trim().to_string()),
                Err(err) => debug!("Skipping {}: {}", path.display(), err),
            }
        }
        Ok(products.join("\n"))
    }
}

impl HardwareProbeSource for FsProbeSource {
    fn bus_device_names(&self) -> Result<BTreeSet<String>, ProbeError> {
        let mut names = BTreeSet::new();
        for path in self.glob(IIO_NAME_GLOB)? {
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    let name = content.lines().next().unwrap_or_default().trim().to_lowercase();
                    names.insert(name);
                }
                Err(err) => debug!("Skipping {}: {}", path.display(), err),
            }
        }
        Ok(names)
    }

    fn usb_descriptor_dump(&self) -> Result<String, ProbeError> {
        let Some((program, args)) = self.usb_command.as_ref().and_then(|cmd| cmd.split_first())
        else {
            return self.sysfs_usb_products();
        };

        let binary = match which::which(program) {
            Ok(binary) => binary,
            Err(_) => {
                debug!("{} not found, reading USB products from sysfs", program);
                return self.sysfs_usb_products();
            }
        };

        let output = Command::new(binary)
            .args(args)
            .output()
            .map_err(|source| ProbeError::UsbCommandSpawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ProbeError::UsbCommandFailed {
                program: program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn device_exists(&self, relative: &str) -> bool {
        self.root.join(relative).exists()
    }

    fn extra_device_names(&self) -> Result<Vec<String>, ProbeError> {
        let mut names: Vec<String> = self
            .glob(EXTRA_DEVICE_GLOB)?
            .iter()
            .filter_map(|path| path.file_name())
            .filter_map(|name| name.to_str())
            .filter_map(|name| name.strip_prefix(EXTRA_DEVICE_PREFIX))
            .map(str::to_string)
            .collect();
        names.sort();
        Ok(names)
    }
}
