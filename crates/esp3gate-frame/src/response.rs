use bytes::Bytes;

use crate::codec::Frame;
use crate::error::{FrameError, Result};
use crate::packet::PacketType;

/// Return code carried in the first data byte of a RESPONSE frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    Ok,
    Error,
    NotSupported,
    WrongParam,
    OperationDenied,
    LockSet,
    BufferTooSmall,
    NoFreeBuffer,
    Other(u8),
}

impl ReturnCode {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => Self::Ok,
            0x01 => Self::Error,
            0x02 => Self::NotSupported,
            0x03 => Self::WrongParam,
            0x04 => Self::OperationDenied,
            0x05 => Self::LockSet,
            0x06 => Self::BufferTooSmall,
            0x07 => Self::NoFreeBuffer,
            other => Self::Other(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Ok => 0x00,
            Self::Error => 0x01,
            Self::NotSupported => 0x02,
            Self::WrongParam => 0x03,
            Self::OperationDenied => 0x04,
            Self::LockSet => 0x05,
            Self::BufferTooSmall => 0x06,
            Self::NoFreeBuffer => 0x07,
            Self::Other(byte) => byte,
        }
    }
}

/// A transceiver's reply to a command written by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePacket {
    pub code: ReturnCode,
    /// Response data following the return code.
    pub data: Bytes,
    pub optional: Bytes,
}

impl ResponsePacket {
    pub fn is_ok(&self) -> bool {
        self.code == ReturnCode::Ok
    }

    pub fn ok() -> Self {
        Self {
            code: ReturnCode::Ok,
            data: Bytes::new(),
            optional: Bytes::new(),
        }
    }

    pub fn to_frame(&self) -> Frame {
        let mut data = Vec::with_capacity(1 + self.data.len());
        data.push(self.code.as_byte());
        data.extend_from_slice(&self.data);
        Frame::new(PacketType::Response, data, self.optional.clone())
    }
}

impl TryFrom<&Frame> for ResponsePacket {
    type Error = FrameError;

    fn try_from(frame: &Frame) -> Result<Self> {
        if frame.packet_type != PacketType::Response {
            return Err(FrameError::UnexpectedPacketType {
                expected: PacketType::Response,
                actual: frame.packet_type,
            });
        }
        let code = frame
            .data
            .first()
            .copied()
            .map(ReturnCode::from_byte)
            .ok_or(FrameError::InvalidLength {
                data_len: 0,
                optional_len: frame.optional.len(),
            })?;
        Ok(Self {
            code,
            data: frame.data.slice(1..),
            optional: frame.optional.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ok_response() {
        let frame = Frame::new(PacketType::Response, vec![0x00, 0xFF, 0xAA, 0x00, 0x80], vec![]);
        let response = ResponsePacket::try_from(&frame).unwrap();
        assert!(response.is_ok());
        assert_eq!(response.data.as_ref(), &[0xFF, 0xAA, 0x00, 0x80]);
    }

    #[test]
    fn non_ok_codes_map() {
        let frame = Frame::new(PacketType::Response, vec![0x02], vec![]);
        let response = ResponsePacket::try_from(&frame).unwrap();
        assert_eq!(response.code, ReturnCode::NotSupported);
        assert!(!response.is_ok());
        assert_eq!(ReturnCode::from_byte(0x99), ReturnCode::Other(0x99));
    }

    #[test]
    fn rejects_other_packet_types() {
        let frame = Frame::new(PacketType::Event, vec![0x00], vec![]);
        assert!(matches!(
            ResponsePacket::try_from(&frame),
            Err(FrameError::UnexpectedPacketType { .. })
        ));
    }

    #[test]
    fn to_frame_round_trips_code() {
        let frame = ResponsePacket::ok().to_frame();
        assert_eq!(frame.packet_type, PacketType::Response);
        assert_eq!(frame.data.as_ref(), &[0x00]);
    }
}
