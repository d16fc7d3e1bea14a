//! YAML gateway configuration.
//!
//! ```yaml
//! device: /dev/ttyUSB0
//! senderId: "FF:AA:00:80"
//! remoteDevices:
//!   "01:82:5D:AB": [RD_A5-12-01]
//! names:
//!   coffee_machine: "01:82:5D:AB"
//! rulesFile: rules.yaml
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use esp3gate_device::DeviceRegistry;
use esp3gate_frame::DeviceAddress;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::names::NameTable;

/// Top-level gateway configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GatewayConfig {
    /// Serial port of the transceiver.
    pub device: String,
    /// Sender ID used for outgoing telegrams.
    pub sender_id: DeviceAddress,
    /// Device types per remote address, in registration order.
    #[serde(default)]
    pub remote_devices: BTreeMap<DeviceAddress, Vec<String>>,
    /// Logical names for remote addresses.
    #[serde(default)]
    pub names: BTreeMap<String, DeviceAddress>,
    /// Rule file, relative to the configuration file.
    pub rules_file: PathBuf,
    #[serde(default)]
    pub timeouts: Timeouts,
}

/// Tunable waits, all with working defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Timeouts {
    /// Wait for the transceiver's response to a command.
    pub response_ms: u64,
    /// Poll interval of the radio consumer loop.
    pub read_secs: u64,
    /// Bound on waiting for an upstream service to run.
    pub setup_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            response_ms: 500,
            read_secs: 15,
            setup_secs: 300,
        }
    }
}

impl Timeouts {
    pub fn response(&self) -> Duration {
        Duration::from_millis(self.response_ms)
    }

    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    pub fn setup(&self) -> Duration {
        Duration::from_secs(self.setup_secs)
    }
}

impl GatewayConfig {
    /// Parse and validate configuration text.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Self::parse(yaml, Path::new("<inline>"))
    }

    /// Read, parse and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&text, path)?;
        debug!(
            path = %path.display(),
            port = %config.device,
            devices = config.device_count(),
            names = config.names.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks that need no device registry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.trim().is_empty() {
            return Err(ConfigError::Invalid("`device` is empty".to_string()));
        }
        if self.rules_file.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("`rulesFile` is empty".to_string()));
        }
        if self.sender_id.is_broadcast() {
            return Err(ConfigError::Invalid(
                "`senderId` cannot be the broadcast address".to_string(),
            ));
        }
        for (address, types) in &self.remote_devices {
            if types.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "no device types listed for {address}"
                )));
            }
            if types.iter().any(|t| t.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "empty device type for {address}"
                )));
            }
        }
        if self.timeouts.response_ms == 0 || self.timeouts.read_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".to_string()));
        }
        self.name_table()?;
        Ok(())
    }

    /// Check every configured type name against `registry`.
    pub fn validate_types(&self, registry: &DeviceRegistry) -> Result<(), ConfigError> {
        for (address, device_type) in self.device_entries() {
            if !registry.contains(device_type) {
                return Err(ConfigError::Invalid(format!(
                    "unknown device type {device_type:?} for {address}"
                )));
            }
        }
        Ok(())
    }

    /// Name table built from `names`; bijective by construction.
    pub fn name_table(&self) -> Result<NameTable, ConfigError> {
        NameTable::new(
            self.names
                .iter()
                .map(|(name, address)| (name.as_str(), *address)),
        )
        .map_err(ConfigError::Names)
    }

    /// `(address, type)` pairs, per-address order preserved.
    pub fn device_entries(&self) -> impl Iterator<Item = (DeviceAddress, &str)> {
        self.remote_devices.iter().flat_map(|(address, types)| {
            types.iter().map(move |device_type| (*address, device_type.as_str()))
        })
    }

    pub fn device_count(&self) -> usize {
        self.remote_devices.values().map(Vec::len).sum()
    }

    /// The rule file path, resolved against the directory of `config_path`.
    pub fn rules_path(&self, config_path: &Path) -> PathBuf {
        if self.rules_file.is_absolute() {
            return self.rules_file.clone();
        }
        config_path
            .parent()
            .map(|dir| dir.join(&self.rules_file))
            .unwrap_or_else(|| self.rules_file.clone())
    }
}
