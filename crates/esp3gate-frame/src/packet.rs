//! ESP3 packet types.
//!
//! Only RESPONSE frames are solicited; every other type arrives unprompted
//! and is routed to the data side of the link.

use std::fmt;

/// Packet type byte of the ESP3 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    RadioErp1,
    Response,
    RadioSubTel,
    Event,
    CommonCommand,
    SmartAckCommand,
    RemoteManCommand,
    RadioMessage,
    RadioErp2,
    Other(u8),
}

impl PacketType {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x01 => Self::RadioErp1,
            0x02 => Self::Response,
            0x03 => Self::RadioSubTel,
            0x04 => Self::Event,
            0x05 => Self::CommonCommand,
            0x06 => Self::SmartAckCommand,
            0x07 => Self::RemoteManCommand,
            0x09 => Self::RadioMessage,
            0x0A => Self::RadioErp2,
            other => Self::Other(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::RadioErp1 => 0x01,
            Self::Response => 0x02,
            Self::RadioSubTel => 0x03,
            Self::Event => 0x04,
            Self::CommonCommand => 0x05,
            Self::SmartAckCommand => 0x06,
            Self::RemoteManCommand => 0x07,
            Self::RadioMessage => 0x09,
            Self::RadioErp2 => 0x0A,
            Self::Other(byte) => byte,
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Self::RadioErp1 => "RADIO_ERP1",
            Self::Response => "RESPONSE",
            Self::RadioSubTel => "RADIO_SUB_TEL",
            Self::Event => "EVENT",
            Self::CommonCommand => "COMMON_COMMAND",
            Self::SmartAckCommand => "SMART_ACK_COMMAND",
            Self::RemoteManCommand => "REMOTE_MAN_COMMAND",
            Self::RadioMessage => "RADIO_MESSAGE",
            Self::RadioErp2 => "RADIO_ERP2",
            Self::Other(_) => "UNKNOWN",
        }
    }

    pub fn kind(self) -> FrameKind {
        match self {
            Self::Response => FrameKind::Response,
            _ => FrameKind::Data,
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#04x})", self.name(), self.as_byte())
    }
}

/// Which side of the link a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Reply to a command written by the gateway.
    Response,
    /// Anything the transceiver sends unprompted.
    Data,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_mapping_is_reversible() {
        for byte in 0u8..=0x10 {
            assert_eq!(PacketType::from_byte(byte).as_byte(), byte);
        }
    }

    #[test]
    fn only_response_is_response_kind() {
        assert_eq!(PacketType::Response.kind(), FrameKind::Response);
        assert_eq!(PacketType::RadioErp1.kind(), FrameKind::Data);
        assert_eq!(PacketType::Event.kind(), FrameKind::Data);
        assert_eq!(PacketType::Other(0x42).kind(), FrameKind::Data);
    }

    #[test]
    fn display_includes_hex() {
        assert_eq!(PacketType::RadioErp1.to_string(), "RADIO_ERP1 (0x01)");
    }
}
