//! Probe registry: hardware key → detection function.
//!
//! Built-in probes and the evidence they accept:
//!
//! | key          | present when                                              |
//! |--------------|-----------------------------------------------------------|
//! | `bme280`     | an IIO bus device is named `bme280`                       |
//! | `bme680`     | an IIO bus device is named `bme680`                       |
//! | `gps`        | `dev/gps` exists                                          |
//! | `airquality` | `dev/airquality` exists                                   |
//! | `microphone` | the USB descriptor dump contains `Microphone`             |
//! | `raingauge`  | `dev/ttyUSB0` exists                                      |
//! | `lorawan`    | always                                                    |
//!
//! Known approximations: the rain gauge hangs off a generic USB-serial
//! adapter, so any `ttyUSB0` is taken to be the rain gauge; the microphone is
//! recognised by a case-sensitive substring of the USB dump. Without `lsusb`
//! the dump holds only sysfs product strings, and audio-class devices that
//! report themselves as e.g. `USB Audio Device` are not detected.

use std::collections::BTreeMap;
use thiserror::Error;

use crate::probe::ProbeSnapshot;

/// Zero-argument detection function.
pub type ProbeFn<'s> = Box<dyn Fn() -> bool + Send + Sync + 's>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Hardware detection function for [{0}] not found")]
pub struct ProbeNotFound(pub String);

/// Name-keyed table of probes, rebuilt for every pass.
#[derive(Default)]
pub struct ProbeRegistry<'s> {
    probes: BTreeMap<String, ProbeFn<'s>>,
}

impl<'s> ProbeRegistry<'s> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in probe bound to `snapshot`.
    pub fn builtin(snapshot: &'s ProbeSnapshot) -> Self {
        let mut registry = Self::new();
        for key in ["bme280", "bme680"] {
            registry.register(key, move || snapshot.has_bus_device(key));
        }
        registry.register("gps", move || snapshot.has_device_file("dev/gps"));
        registry.register("airquality", move || snapshot.has_device_file("dev/airquality"));
        registry.register("microphone", move || snapshot.usb_dump.contains("Microphone"));
        registry.register("raingauge", move || snapshot.has_device_file("dev/ttyUSB0"));
        registry.register("lorawan", || true);
        registry
    }

    /// Register (or replace) the probe for `key`.
    pub fn register<F>(&mut self, key: &str, probe: F)
    where
        F: Fn() -> bool + Send + Sync + 's,
    {
        self.probes.insert(key.to_lowercase(), Box::new(probe));
    }

    /// Look up the probe for a hardware key. Keys are case-insensitive.
    pub fn resolve(&self, key: &str) -> Result<&ProbeFn<'s>, ProbeNotFound> {
        self.probes
            .get(&key.to_lowercase())
            .ok_or_else(|| ProbeNotFound(key.to_string()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.probes.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for ProbeRegistry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeRegistry")
            .field("keys", &self.probes.keys().collect::<Vec<_>>())
            .finish()
    }
}
