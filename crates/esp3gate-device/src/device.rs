use std::fmt;
use std::sync::Arc;

use esp3gate_frame::{DeviceAddress, RadioTelegram};
use esp3gate_link::Transmitter;
use tracing::{debug, warn};

use crate::error::{DeviceError, Result};
use crate::parameter::{
    DeviceRef, Initiation, ParameterChange, ParameterId, ParameterValue, WriteOutcome,
};

/// Callback invoked for every parameter change of a device.
pub type ParameterListener = Arc<dyn Fn(&ParameterChange) + Send + Sync>;

/// One modelled device at one remote address.
///
/// Implementations decode telegrams from their remote address, and encode
/// writes into telegrams sent from the local sender address. Every change,
/// whatever its initiation, is reported to all registered listeners.
pub trait Device: Send {
    /// Type name and remote address of this instance.
    fn device_ref(&self) -> DeviceRef;

    fn device_type(&self) -> &'static str {
        self.device_ref().device_type
    }

    fn remote(&self) -> DeviceAddress {
        self.device_ref().address
    }

    /// Parameters this device type models.
    fn parameters(&self) -> &'static [ParameterId];

    /// Update state from a telegram sent by the remote address.
    ///
    /// Telegrams the device cannot interpret are ignored.
    fn parse_radio(&mut self, telegram: &RadioTelegram);

    /// Last known value of a parameter; `None` until one has been seen.
    fn get(&self, parameter: ParameterId) -> Result<Option<ParameterValue>>;

    /// Write a parameter, sending telegrams when the device is actuated.
    fn set(&mut self, parameter: ParameterId, value: ParameterValue) -> WriteOutcome;

    fn add_listener(&mut self, listener: ParameterListener);
}

/// Everything a factory needs to build a device instance.
#[derive(Clone)]
pub struct DeviceContext {
    pub remote: DeviceAddress,
    pub local: DeviceAddress,
    pub transmitter: Arc<dyn Transmitter>,
}

impl fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceContext")
            .field("remote", &self.remote)
            .field("local", &self.local)
            .finish_non_exhaustive()
    }
}

/// State shared by every device type: addressing, the transmitter and the
/// listener list.
pub struct StandardDevice {
    device_type: &'static str,
    remote: DeviceAddress,
    local: DeviceAddress,
    transmitter: Arc<dyn Transmitter>,
    listeners: Vec<ParameterListener>,
}

impl StandardDevice {
    pub fn new(device_type: &'static str, context: DeviceContext) -> Self {
        Self {
            device_type,
            remote: context.remote,
            local: context.local,
            transmitter: context.transmitter,
            listeners: Vec::new(),
        }
    }

    pub fn device_ref(&self) -> DeviceRef {
        DeviceRef {
            address: self.remote,
            device_type: self.device_type,
        }
    }

    pub fn device_type(&self) -> &'static str {
        self.device_type
    }

    pub fn remote(&self) -> DeviceAddress {
        self.remote
    }

    /// Sender ID used for telegrams this device emits.
    pub fn local(&self) -> DeviceAddress {
        self.local
    }

    pub fn add_listener(&mut self, listener: ParameterListener) {
        self.listeners.push(listener);
    }

    /// Report a change to every listener.
    pub fn fire(
        &self,
        parameter: ParameterId,
        initiation: Initiation,
        old: Option<ParameterValue>,
        new: Option<ParameterValue>,
    ) {
        let change = ParameterChange {
            source: self.device_ref(),
            parameter,
            old,
            new,
            initiation,
        };
        for listener in &self.listeners {
            listener(&change);
        }
    }

    /// Transmit a telegram and check the transceiver's verdict.
    ///
    /// A missing response is logged and treated as sent.
    pub fn send(&self, telegram: &RadioTelegram) -> Result<()> {
        let frame = telegram.to_frame();
        match self.transmitter.transmit(&frame)? {
            Some(response) if response.is_ok() => {
                debug!(device = %self.remote, rorg = %telegram.rorg, "telegram sent");
                Ok(())
            }
            Some(response) => Err(DeviceError::TransceiverRejected(response.code)),
            None => {
                warn!(device = %self.remote, "no response to telegram");
                Ok(())
            }
        }
    }

    /// The common error for a parameter outside [`Device::parameters`].
    pub fn unsupported(&self, parameter: ParameterId) -> DeviceError {
        DeviceError::UnsupportedParameter {
            device_type: self.device_type,
            parameter,
        }
    }
}

impl fmt::Debug for StandardDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardDevice")
            .field("device_type", &self.device_type)
            .field("remote", &self.remote)
            .field("local", &self.local)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use esp3gate_frame::{Frame, ResponsePacket, ReturnCode};
    use esp3gate_link::{LinkError, Transmitter};

    /// Records every frame and answers with a fixed verdict.
    pub struct RecordingTransmitter {
        pub sent: Mutex<Vec<Frame>>,
        pub reply: Option<ReturnCode>,
        pub disconnected: bool,
    }

    impl RecordingTransmitter {
        pub fn ok() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                reply: Some(ReturnCode::Ok),
                disconnected: false,
            }
        }

        pub fn replying(reply: Option<ReturnCode>) -> Self {
            Self {
                reply,
                ..Self::ok()
            }
        }

        pub fn disconnected() -> Self {
            Self {
                disconnected: true,
                ..Self::ok()
            }
        }

        pub fn frames(&self) -> Vec<Frame> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Transmitter for RecordingTransmitter {
        fn transmit(&self, frame: &Frame) -> esp3gate_link::Result<Option<ResponsePacket>> {
            if self.disconnected {
                return Err(LinkError::NotConnected);
            }
            self.sent.lock().unwrap().push(frame.clone());
            Ok(self.reply.map(|code| ResponsePacket {
                code,
                data: Default::default(),
                optional: Default::default(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use esp3gate_frame::{ReturnCode, Rorg};

    use super::testing::RecordingTransmitter;
    use super::*;

    fn context(transmitter: Arc<dyn Transmitter>) -> DeviceContext {
        DeviceContext {
            remote: DeviceAddress::new([0x01, 0x82, 0x5D, 0xAB]),
            local: DeviceAddress::new([0xFF, 0x80, 0x00, 0x01]),
            transmitter,
        }
    }

    #[test]
    fn fire_reaches_every_listener() {
        let mut device =
            StandardDevice::new("RD_TEST", context(Arc::new(RecordingTransmitter::ok())));
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in 0..2 {
            let seen = Arc::clone(&seen);
            device.add_listener(Arc::new(move |change: &ParameterChange| {
                seen.lock().unwrap().push((tag, change.parameter));
            }));
        }

        device.fire(
            ParameterId::PowerW,
            Initiation::RadioFrame,
            None,
            Some(ParameterValue::Unsigned(1)),
        );

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(0, ParameterId::PowerW), (1, ParameterId::PowerW)]
        );
    }

    #[test]
    fn send_maps_transceiver_verdicts() {
        let telegram = RadioTelegram::new(Rorg::Rps, vec![0x30], DeviceAddress::from(1), 0x30);

        let ok = StandardDevice::new("RD_TEST", context(Arc::new(RecordingTransmitter::ok())));
        assert!(ok.send(&telegram).is_ok());

        let silent = StandardDevice::new(
            "RD_TEST",
            context(Arc::new(RecordingTransmitter::replying(None))),
        );
        assert!(silent.send(&telegram).is_ok());

        let refused = StandardDevice::new(
            "RD_TEST",
            context(Arc::new(RecordingTransmitter::replying(Some(
                ReturnCode::OperationDenied,
            )))),
        );
        assert!(matches!(
            refused.send(&telegram),
            Err(DeviceError::TransceiverRejected(ReturnCode::OperationDenied))
        ));

        let offline = StandardDevice::new(
            "RD_TEST",
            context(Arc::new(RecordingTransmitter::disconnected())),
        );
        assert!(matches!(offline.send(&telegram), Err(DeviceError::Link(_))));
    }
}
