use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use esp3gate_device::{
    Device, DeviceContext, DeviceError, DeviceRef, DeviceRegistry, ParameterId,
    ParameterListener, ParameterValue, WriteOutcome,
};
use esp3gate_frame::{DeviceAddress, RadioTelegram};
use esp3gate_link::Transmitter;
use tracing::{debug, trace, warn};

use crate::error::RouterError;
use crate::names::NameTable;
use crate::rules::CommandSink;
use crate::sync::lock;

type Instance = Mutex<Box<dyn Device>>;

/// Routes radio telegrams to device instances by sender address, and
/// parameter writes by name or address.
///
/// The address map is built once and never changes. Each instance sits
/// behind its own lock, so decoding for one device never waits on another.
pub struct DeviceRouter {
    devices: HashMap<DeviceAddress, Vec<Instance>>,
    names: NameTable,
}

impl DeviceRouter {
    /// Instantiate every configured `(address, type)` pair, keeping the
    /// configured order per address.
    pub fn build<I, S>(
        registry: &DeviceRegistry,
        local: DeviceAddress,
        transmitter: Arc<dyn Transmitter>,
        devices: I,
        names: NameTable,
    ) -> Result<Self, RouterError>
    where
        I: IntoIterator<Item = (DeviceAddress, S)>,
        S: AsRef<str>,
    {
        let mut map: HashMap<DeviceAddress, Vec<Instance>> = HashMap::new();
        for (address, device_type) in devices {
            let device_type = device_type.as_ref();
            let context = DeviceContext {
                remote: address,
                local,
                transmitter: Arc::clone(&transmitter),
            };
            let device = registry
                .create(device_type, context)
                .map_err(|_| RouterError::UnknownDeviceType {
                    address,
                    device_type: device_type.to_string(),
                })?;
            debug!(
                device = %address,
                device_type,
                name = names.name_for(address),
                "device registered"
            );
            map.entry(address).or_default().push(Mutex::new(device));
        }
        Ok(Self { devices: map, names })
    }

    pub fn names(&self) -> &NameTable {
        &self.names
    }

    /// Subscribe `listener` to the parameter changes of every instance.
    pub fn add_listener(&self, listener: ParameterListener) {
        for device in self.devices.values().flatten() {
            lock(device).add_listener(Arc::clone(&listener));
        }
    }

    /// Hand `telegram` to every instance at its sender address, in
    /// registration order. Returns how many instances saw it.
    pub fn dispatch(&self, telegram: &RadioTelegram) -> usize {
        let Some(instances) = self.devices.get(&telegram.sender) else {
            trace!(sender = %telegram.sender, "no device for sender");
            return 0;
        };
        for device in instances {
            lock(device).parse_radio(telegram);
        }
        instances.len()
    }

    /// Write a parameter on every instance at `target`, a configured name or
    /// an address.
    ///
    /// Per-instance rejections are logged and skipped; the call fails only
    /// when no instance accepted. Returns the number that accepted.
    pub fn set_parameter(
        &self,
        target: &str,
        parameter: ParameterId,
        value: ParameterValue,
    ) -> Result<usize, RouterError> {
        let address = self
            .names
            .address_for(target)
            .or_else(|| target.parse::<DeviceAddress>().ok())
            .ok_or_else(|| RouterError::NoDevice(target.to_string()))?;
        let instances = self
            .devices
            .get(&address)
            .ok_or_else(|| RouterError::NoDevice(target.to_string()))?;

        let mut accepted = 0;
        let mut reasons = Vec::new();
        let mut fatal: Option<DeviceError> = None;
        for device in instances {
            let mut device = lock(device);
            match device.set(parameter, value.clone()) {
                WriteOutcome::Accepted => accepted += 1,
                WriteOutcome::Rejected(rejection) => {
                    debug!(
                        device = %address,
                        device_type = device.device_type(),
                        %rejection,
                        "write rejected"
                    );
                    reasons.push(format!("{}: {rejection}", device.device_type()));
                }
                WriteOutcome::Fatal(err) => {
                    warn!(
                        device = %address,
                        device_type = device.device_type(),
                        error = %err,
                        "write failed"
                    );
                    reasons.push(format!("{}: {err}", device.device_type()));
                    fatal = Some(err);
                }
            }
        }

        if accepted > 0 {
            debug!(device = target, %parameter, %value, accepted, "parameter written");
            return Ok(accepted);
        }
        match fatal {
            Some(source) => Err(RouterError::WriteFailed {
                target: target.to_string(),
                parameter,
                source,
            }),
            None => Err(RouterError::ParameterRejected {
                target: target.to_string(),
                parameter,
                reasons: reasons.join("; "),
            }),
        }
    }

    /// Last known values of `parameter` at `target`, one per instance that
    /// models it.
    pub fn get_parameter(
        &self,
        target: &str,
        parameter: ParameterId,
    ) -> Result<Vec<(DeviceRef, Option<ParameterValue>)>, RouterError> {
        let address = self
            .names
            .address_for(target)
            .or_else(|| target.parse::<DeviceAddress>().ok())
            .ok_or_else(|| RouterError::NoDevice(target.to_string()))?;
        let instances = self
            .devices
            .get(&address)
            .ok_or_else(|| RouterError::NoDevice(target.to_string()))?;
        Ok(instances
            .iter()
            .filter_map(|device| {
                let device = lock(device);
                device
                    .get(parameter)
                    .ok()
                    .map(|value| (device.device_ref(), value))
            })
            .collect())
    }

    /// Every instance, sorted by address then registration order.
    pub fn instances(&self) -> Vec<DeviceRef> {
        let mut addresses: Vec<&DeviceAddress> = self.devices.keys().collect();
        addresses.sort();
        addresses
            .into_iter()
            .flat_map(|address| self.devices[address].iter())
            .map(|device| lock(device).device_ref())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.devices.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl CommandSink for DeviceRouter {
    fn set_parameter(
        &self,
        target: &str,
        parameter: ParameterId,
        value: ParameterValue,
    ) -> Result<usize, RouterError> {
        DeviceRouter::set_parameter(self, target, parameter, value)
    }
}

impl fmt::Debug for DeviceRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRouter")
            .field("addresses", &self.devices.len())
            .field("instances", &self.len())
            .field("names", &self.names.len())
            .finish()
    }
}
