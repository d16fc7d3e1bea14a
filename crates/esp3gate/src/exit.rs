use std::fmt;
use std::io;

use esp3gate_frame::FrameError;
use esp3gate_link::LinkError;
use esp3gate_runtime::{ConfigError, LifecycleError, RouterError, RuleError, ServiceError};
use esp3gate_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const CONFIG_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::BrokenPipe => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

fn serial_code(err: &serialport::Error) -> i32 {
    match err.kind() {
        serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied) => PERMISSION_DENIED,
        serialport::ErrorKind::InvalidInput => USAGE,
        _ => TRANSPORT_ERROR,
    }
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Io(source) => io_error(context, source),
        TransportError::EmptyPortName => CliError::new(USAGE, format!("{context}: {err}")),
        TransportError::Open { ref source, .. }
        | TransportError::Configure { ref source, .. }
        | TransportError::Driver(ref source) => {
            CliError::new(serial_code(source), format!("{context}: {err}"))
        }
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::ConnectionClosed => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn link_error(context: &str, err: LinkError) -> CliError {
    match err {
        LinkError::Transport(err) => transport_error(context, err),
        LinkError::Frame(err) => frame_error(context, err),
        LinkError::NotConnected | LinkError::Shutdown => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        LinkError::AlreadyConnected(_) => CliError::new(FAILURE, format!("{context}: {err}")),
        LinkError::Spawn(source) => CliError::new(INTERNAL, format!("{context}: {source}")),
    }
}

pub fn config_error(context: &str, err: ConfigError) -> CliError {
    CliError::new(CONFIG_INVALID, format!("{context}: {err}"))
}

pub fn rule_error(context: &str, err: RuleError) -> CliError {
    CliError::new(CONFIG_INVALID, format!("{context}: {err}"))
}

pub fn service_error(context: &str, err: ServiceError) -> CliError {
    match err {
        ServiceError::Link(err) => link_error(context, err),
        ServiceError::Config(err) => config_error(context, err),
        ServiceError::Router(
            RouterError::UnknownDeviceType { .. }
            | RouterError::DuplicateAddress { .. }
            | RouterError::DuplicateName(_),
        ) => CliError::new(CONFIG_INVALID, format!("{context}: {err}")),
        ServiceError::Lifecycle(LifecycleError::Timeout { .. }) => {
            CliError::new(TIMEOUT, format!("{context}: {err}"))
        }
        ServiceError::Bus(_) | ServiceError::Spawn { .. } => {
            CliError::new(INTERNAL, format!("{context}: {err}"))
        }
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}
