use std::collections::BTreeMap;

use tracing::debug;

use crate::device::{Device, DeviceContext};
use crate::eep::RockerSwitch;
use crate::error::{DeviceError, Result};

/// Builds a device instance for one remote address.
pub type DeviceFactory = fn(DeviceContext) -> Box<dyn Device>;

/// Device types available without registration.
pub const BUILTIN_TYPES: &[&str] = &[RockerSwitch::TYPE];

/// Look up a built-in device type by name.
pub fn builtin_catalog(type_name: &str) -> Option<DeviceFactory> {
    match type_name {
        RockerSwitch::TYPE => Some(RockerSwitch::create),
        _ => None,
    }
}

/// Resolves device type names to factories.
///
/// Application registrations take precedence over the built-in catalog, so a
/// registered name can replace a built-in type.
#[derive(Debug, Default, Clone)]
pub struct DeviceRegistry {
    overrides: BTreeMap<String, DeviceFactory>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a device type.
    pub fn register(&mut self, type_name: impl Into<String>, factory: DeviceFactory) {
        let type_name = type_name.into();
        debug!(device_type = %type_name, "device type registered");
        self.overrides.insert(type_name, factory);
    }

    pub fn resolve(&self, type_name: &str) -> Option<DeviceFactory> {
        self.overrides
            .get(type_name)
            .copied()
            .or_else(|| builtin_catalog(type_name))
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.resolve(type_name).is_some()
    }

    pub fn create(&self, type_name: &str, context: DeviceContext) -> Result<Box<dyn Device>> {
        let factory = self
            .resolve(type_name)
            .ok_or_else(|| DeviceError::UnknownDeviceType(type_name.to_string()))?;
        Ok(factory(context))
    }

    /// Every resolvable type name, sorted.
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.overrides.keys().cloned().collect();
        for builtin in BUILTIN_TYPES {
            if !self.overrides.contains_key(*builtin) {
                names.push((*builtin).to_string());
            }
        }
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use esp3gate_frame::DeviceAddress;

    use super::*;
    use crate::device::testing::RecordingTransmitter;
    use crate::eep::MeterDevice;

    fn context() -> DeviceContext {
        DeviceContext {
            remote: DeviceAddress::new([0x01, 0x82, 0x5D, 0xAB]),
            local: DeviceAddress::new([0xFF, 0x80, 0x00, 0x01]),
            transmitter: Arc::new(RecordingTransmitter::ok()),
        }
    }

    #[test]
    fn builtin_types_resolve_without_registration() {
        let registry = DeviceRegistry::new();
        let device = registry.create("RD_F6-02-01", context()).unwrap();
        assert_eq!(device.device_ref().device_type, RockerSwitch::TYPE);
        assert!(!registry.contains(MeterDevice::TYPE));
    }

    #[test]
    fn registered_types_resolve() {
        let mut registry = DeviceRegistry::new();
        registry.register(MeterDevice::TYPE, MeterDevice::create);
        let device = registry.create("RD_A5-12-01", context()).unwrap();
        assert_eq!(device.device_ref().device_type, MeterDevice::TYPE);
        assert_eq!(
            registry.type_names(),
            vec!["RD_A5-12-01".to_string(), "RD_F6-02-01".to_string()]
        );
    }

    #[test]
    fn registration_overrides_builtin() {
        let mut registry = DeviceRegistry::new();
        registry.register(RockerSwitch::TYPE, MeterDevice::create);
        let device = registry.create(RockerSwitch::TYPE, context()).unwrap();
        assert_eq!(device.device_ref().device_type, MeterDevice::TYPE);
        assert_eq!(registry.type_names(), vec![RockerSwitch::TYPE.to_string()]);
    }

    #[test]
    fn unknown_type_is_an_error() {
        let registry = DeviceRegistry::new();
        let err = registry.create("RD_XX-00-00", context()).err().unwrap();
        assert!(matches!(err, DeviceError::UnknownDeviceType(name) if name == "RD_XX-00-00"));
    }
}
