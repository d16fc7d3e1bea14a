use esp3gate_frame::{Frame, ResponsePacket};

use crate::connector::Connector;
use crate::error::Result;

/// Something that can put a frame on the air and report the transceiver's
/// response.
///
/// Device instances hold one of these to send commands. `Ok(None)` means the
/// frame went out but no response arrived in time.
pub trait Transmitter: Send + Sync {
    fn transmit(&self, frame: &Frame) -> Result<Option<ResponsePacket>>;
}

impl Transmitter for Connector {
    fn transmit(&self, frame: &Frame) -> Result<Option<ResponsePacket>> {
        self.write(frame)
    }
}
