use std::path::PathBuf;
use std::time::Duration;

use esp3gate_device::{DeviceError, ParameterId};
use esp3gate_frame::DeviceAddress;

use crate::lifecycle::ServiceState;

/// Errors raised by the event buses.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The bus has completed and accepts no new subscribers.
    #[error("bus {0} is completed")]
    Completed(String),

    /// A delivery thread could not be started.
    #[error("failed to spawn delivery thread for bus {bus}: {source}")]
    Spawn {
        bus: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while building or using the device router.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// A configured device type has no factory.
    #[error("unknown device type {device_type:?} for {address}")]
    UnknownDeviceType {
        address: DeviceAddress,
        device_type: String,
    },

    /// Two names map to the same address.
    #[error("address {address} is named both {first:?} and {second:?}")]
    DuplicateAddress {
        address: DeviceAddress,
        first: String,
        second: String,
    },

    /// A name is used twice.
    #[error("name {0:?} is used more than once")]
    DuplicateName(String),

    /// No device is registered for the target.
    #[error("no device registered for {0:?}")]
    NoDevice(String),

    /// Every instance at the target refused the write.
    #[error("no device at {target:?} accepted {parameter}: {reasons}")]
    ParameterRejected {
        target: String,
        parameter: ParameterId,
        reasons: String,
    },

    /// A write failed in a way the device could not recover from.
    #[error("writing {parameter} to {target:?} failed: {source}")]
    WriteFailed {
        target: String,
        parameter: ParameterId,
        #[source]
        source: DeviceError,
    },
}

/// Errors from service lifecycle management.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("{service}: invalid transition {from:?} -> {to:?}")]
    InvalidTransition {
        service: &'static str,
        from: ServiceState,
        to: ServiceState,
    },

    #[error("{service} did not reach {expected:?} within {timeout:?}")]
    Timeout {
        service: &'static str,
        expected: ServiceState,
        timeout: Duration,
    },

    #[error("{service} is not running (state {state:?})")]
    NotRunning {
        service: &'static str,
        state: ServiceState,
    },
}

/// Errors loading or validating the gateway configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid name table: {0}")]
    Names(#[source] RouterError),
}

/// Errors loading or evaluating rules.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("failed to read rules {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse rules {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid rule {rule:?}: {reason}")]
    Invalid { rule: String, reason: String },

    /// An action of a matching rule failed.
    #[error("rule {rule:?} action failed: {source}")]
    Action {
        rule: String,
        #[source]
        source: RouterError,
    },
}

/// Errors starting or stopping a service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Link(#[from] esp3gate_link::LinkError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = ServiceError> = std::result::Result<T, E>;
