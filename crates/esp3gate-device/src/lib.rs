//! Device models for EnOcean equipment.
//!
//! A [`Device`] is the software side of one physical device at one address:
//! it decodes radio telegrams into parameter values, encodes parameter writes
//! into telegrams, and tells its listeners about every change. Device types
//! are looked up by name through a [`DeviceRegistry`].

pub mod device;
pub mod eep;
pub mod error;
pub mod parameter;
pub mod registry;

pub use device::{Device, DeviceContext, ParameterListener, StandardDevice};
pub use error::{DeviceError, Result};
pub use parameter::{
    DeviceRef, Initiation, ParameterChange, ParameterId, ParameterValue, Rejection, RockerAction,
    WriteOutcome,
};
pub use registry::{builtin_catalog, DeviceFactory, DeviceRegistry, BUILTIN_TYPES};
