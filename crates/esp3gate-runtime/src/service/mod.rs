//! The gateway's three services, in start order.

mod device;
mod radio;
mod rules;

pub use device::{DeviceService, DeviceSetup};
pub use radio::{RadioService, DEFAULT_READ_TIMEOUT};
pub use rules::RulesService;

/// Default bound on waiting for an upstream service.
pub const DEFAULT_SETUP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(300);
