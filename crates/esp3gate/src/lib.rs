//! EnOcean gateway over the ESP3 serial protocol.
//!
//! esp3gate talks to a USB or serial EnOcean transceiver (TCM310 class),
//! decodes the radio telegrams it receives into device parameters, and runs
//! rules that react to parameter changes by actuating other devices.
//!
//! # Crate Structure
//!
//! - [`transport`]: Serial line access
//! - [`frame`]: ESP3 framing, packet views and device addresses
//! - [`link`]: Transceiver connector with response correlation
//! - [`device`]: Device models and the device type registry
//! - [`runtime`]: Buses, routing, services and rules

use esp3gate_device::eep::MeterDevice;
use esp3gate_device::DeviceRegistry;

/// Re-export transport types.
pub mod transport {
    pub use esp3gate_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use esp3gate_frame::*;
}

/// Re-export link types.
pub mod link {
    pub use esp3gate_link::*;
}

/// Re-export device types.
pub mod device {
    pub use esp3gate_device::*;
}

/// Re-export runtime types.
pub mod runtime {
    pub use esp3gate_runtime::*;
}

/// The registry the gateway runs with: the built-in catalog plus the
/// application's own device types.
pub fn application_registry() -> DeviceRegistry {
    let mut registry = DeviceRegistry::new();
    registry.register(MeterDevice::TYPE, MeterDevice::create);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_registry_knows_meter_and_rocker() {
        let registry = application_registry();
        assert_eq!(
            registry.type_names(),
            vec!["RD_A5-12-01".to_string(), "RD_F6-02-01".to_string()]
        );
    }
}
