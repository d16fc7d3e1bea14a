use esp3gate_frame::ReturnCode;

/// Errors raised by device instances and the type registry.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Sending a telegram failed on the link.
    #[error("link error: {0}")]
    Link(#[from] esp3gate_link::LinkError),

    /// The transceiver refused a telegram.
    #[error("transceiver rejected telegram: {0:?}")]
    TransceiverRejected(ReturnCode),

    /// The device type does not model this parameter.
    #[error("{device_type} has no parameter {parameter}")]
    UnsupportedParameter {
        device_type: &'static str,
        parameter: crate::parameter::ParameterId,
    },

    /// A payload did not have the shape the codec expects.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// No factory is registered for a device type name.
    #[error("cannot find device type {0:?}")]
    UnknownDeviceType(String),
}

pub type Result<T> = std::result::Result<T, DeviceError>;
