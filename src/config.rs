//! Configuration of hdvec contexts.
//!
//! A [`ContextConfig`] names the backend to use and how it behaves. It is usually read from the
//! environment:
//!
//! | Variable                  | Meaning                                               |
//! |---------------------------|-------------------------------------------------------|
//! | `HDVEC_BACKEND`           | `host`, `simulated` or `cuda`                         |
//! | `HDVEC_SIMULATED_DEVICES` | number of simulated devices (default 1)               |
//! | `HDVEC_DEVICE_MEMORY`     | per-device capacity in bytes for simulated devices    |
//! | `HDVEC_FLAGS`             | comma separated: `eager-alloc`, `release-on-host-write` |
//!
//! but can equally be deserialized from JSON.

use crate::context::ContextFlags;
use crate::error::{HdvError, HdvResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Environment variable selecting the backend.
pub const BACKEND_VAR: &str = "HDVEC_BACKEND";
/// Environment variable setting the number of simulated devices.
pub const SIMULATED_DEVICES_VAR: &str = "HDVEC_SIMULATED_DEVICES";
/// Environment variable capping simulated device memory.
pub const DEVICE_MEMORY_VAR: &str = "HDVEC_DEVICE_MEMORY";
/// Environment variable listing context flags.
pub const FLAGS_VAR: &str = "HDVEC_FLAGS";

/// Which family of devices a context drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// No accelerator; buffers are plain host vectors.
    Host,
    /// Devices emulated in host memory.
    Simulated,
    /// NVIDIA GPUs via the CUDA driver. Needs the `cuda` cargo feature.
    Cuda,
}

impl Default for BackendKind {
    fn default() -> Self {
        if cfg!(feature = "cuda") {
            BackendKind::Cuda
        } else {
            BackendKind::Host
        }
    }
}

impl FromStr for BackendKind {
    type Err = HdvError;

    fn from_str(s: &str) -> HdvResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "host" | "cpu" | "none" => Ok(BackendKind::Host),
            "simulated" | "sim" => Ok(BackendKind::Simulated),
            "cuda" | "gpu" => Ok(BackendKind::Cuda),
            other => Err(HdvError::Config(format!("unknown backend `{}`", other))),
        }
    }
}

/// Settings used to build a [`Context`](../context/struct.Context.html).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Backend to drive.
    pub backend: BackendKind,
    /// Number of devices when `backend` is `Simulated`.
    pub simulated_devices: usize,
    /// Per-device memory limit in bytes when `backend` is `Simulated`.
    pub device_memory: Option<usize>,
    /// Allocate device storage as soon as a buffer is assigned to a device.
    pub eager_device_alloc: bool,
    /// Free device storage as soon as a host write makes it stale.
    pub release_on_host_write: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            backend: BackendKind::default(),
            simulated_devices: 1,
            device_memory: None,
            eager_device_alloc: false,
            release_on_host_write: false,
        }
    }
}

impl ContextConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> HdvResult<Self> {
        ContextConfig::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name to its value.
    /// Variables that are absent keep their defaults.
    ///
    /// # Examples:
    ///
    /// ```
    /// use hdvec::config::{BackendKind, ContextConfig};
    ///
    /// let config = ContextConfig::from_lookup(|key| match key {
    ///     "HDVEC_BACKEND" => Some("simulated".to_string()),
    ///     "HDVEC_SIMULATED_DEVICES" => Some("2".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    /// assert_eq!(config.backend, BackendKind::Simulated);
    /// assert_eq!(config.simulated_devices, 2);
    /// ```
    pub fn from_lookup<F>(lookup: F) -> HdvResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ContextConfig::default();
        if let Some(backend) = lookup(BACKEND_VAR) {
            config.backend = backend.parse()?;
        }
        if let Some(count) = lookup(SIMULATED_DEVICES_VAR) {
            config.simulated_devices = parse_number(SIMULATED_DEVICES_VAR, &count)?;
        }
        if let Some(bytes) = lookup(DEVICE_MEMORY_VAR) {
            config.device_memory = Some(parse_number(DEVICE_MEMORY_VAR, &bytes)?);
        }
        if let Some(flags) = lookup(FLAGS_VAR) {
            for flag in flags.split(',').map(str::trim).filter(|f| !f.is_empty()) {
                match flag {
                    "eager-alloc" => config.eager_device_alloc = true,
                    "release-on-host-write" => config.release_on_host_write = true,
                    other => {
                        return Err(HdvError::Config(format!(
                            "unknown flag `{}` in {}",
                            other, FLAGS_VAR
                        )))
                    }
                }
            }
        }
        Ok(config)
    }

    /// Parses a JSON configuration document. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> HdvResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Returns the context flags this configuration enables.
    pub fn flags(&self) -> ContextFlags {
        let mut flags = ContextFlags::empty();
        flags.set(ContextFlags::EAGER_DEVICE_ALLOC, self.eager_device_alloc);
        flags.set(ContextFlags::RELEASE_ON_HOST_WRITE, self.release_on_host_write);
        flags
    }
}

fn parse_number(var: &str, value: &str) -> HdvResult<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| HdvError::Config(format!("{} must be a non-negative integer, got `{}`", var, value)))
}
