//! ERP1 radio telegrams (packet type 0x01).
//!
//! Data layout: `RORG | user data | sender ID (4) | status`.
//! Optional layout: `sub-telegrams | destination ID (4) | dBm | security`.

use std::fmt;

use bytes::Bytes;

use crate::address::DeviceAddress;
use crate::codec::Frame;
use crate::error::{FrameError, Result};
use crate::packet::PacketType;

/// Radio telegram organisation (the "choice" byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rorg {
    /// Repeated switch communication, 1 data byte.
    Rps,
    /// 1-byte sensor telegram.
    Bs1,
    /// 4-byte sensor telegram.
    Bs4,
    /// Variable length data.
    Vld,
    Other(u8),
}

impl Rorg {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0xF6 => Self::Rps,
            0xD5 => Self::Bs1,
            0xA5 => Self::Bs4,
            0xD2 => Self::Vld,
            other => Self::Other(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Rps => 0xF6,
            Self::Bs1 => 0xD5,
            Self::Bs4 => 0xA5,
            Self::Vld => 0xD2,
            Self::Other(byte) => byte,
        }
    }

    /// Fixed user data length, if the RORG has one.
    pub fn user_data_len(self) -> Option<usize> {
        match self {
            Self::Rps | Self::Bs1 => Some(1),
            Self::Bs4 => Some(4),
            Self::Vld | Self::Other(_) => None,
        }
    }
}

impl fmt::Display for Rorg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04X}", self.as_byte())
    }
}

/// Number of sub-telegrams requested when sending.
const SEND_SUBTELEGRAMS: u8 = 0x03;
/// dBm placeholder used when sending.
const SEND_DBM: u8 = 0xFF;

/// A decoded ERP1 radio telegram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioTelegram {
    pub rorg: Rorg,
    pub user_data: Bytes,
    pub sender: DeviceAddress,
    pub status: u8,
    pub subtelegrams: Option<u8>,
    pub destination: Option<DeviceAddress>,
    /// Received signal strength as reported (positive value, -dBm).
    pub dbm: Option<u8>,
    pub security_level: Option<u8>,
}

impl RadioTelegram {
    /// A telegram to send, addressed to everyone.
    pub fn new(rorg: Rorg, user_data: impl Into<Bytes>, sender: DeviceAddress, status: u8) -> Self {
        Self {
            rorg,
            user_data: user_data.into(),
            sender,
            status,
            subtelegrams: Some(SEND_SUBTELEGRAMS),
            destination: Some(DeviceAddress::BROADCAST),
            dbm: Some(SEND_DBM),
            security_level: Some(0),
        }
    }

    /// Teach-in telegrams carry learn data instead of readings.
    ///
    /// For 1BS and 4BS the LRN bit (bit 3 of the last data byte) is cleared
    /// during teach-in. RPS telegrams never teach in this way.
    pub fn is_teach_in(&self) -> bool {
        match self.rorg {
            Rorg::Bs1 | Rorg::Bs4 => self
                .user_data
                .last()
                .map(|db0| db0 & 0x08 == 0)
                .unwrap_or(false),
            _ => false,
        }
    }

    pub fn to_frame(&self) -> Frame {
        let mut data = Vec::with_capacity(self.user_data.len() + 6);
        data.push(self.rorg.as_byte());
        data.extend_from_slice(&self.user_data);
        data.extend_from_slice(&self.sender.octets());
        data.push(self.status);

        let mut optional = Vec::with_capacity(7);
        if let (Some(subtel), Some(destination)) = (self.subtelegrams, self.destination) {
            optional.push(subtel);
            optional.extend_from_slice(&destination.octets());
            optional.push(self.dbm.unwrap_or(SEND_DBM));
            optional.push(self.security_level.unwrap_or(0));
        }

        Frame::new(PacketType::RadioErp1, data, optional)
    }
}

impl TryFrom<&Frame> for RadioTelegram {
    type Error = FrameError;

    fn try_from(frame: &Frame) -> Result<Self> {
        if frame.packet_type != PacketType::RadioErp1 {
            return Err(FrameError::UnexpectedPacketType {
                expected: PacketType::RadioErp1,
                actual: frame.packet_type,
            });
        }

        let data = &frame.data;
        if data.len() < 6 {
            return Err(FrameError::MalformedTelegram(format!(
                "{} data bytes, need at least 6",
                data.len()
            )));
        }

        let rorg = Rorg::from_byte(data[0]);
        let user_end = data.len() - 5;
        let user_len = user_end - 1;
        if let Some(expected) = rorg.user_data_len() {
            if user_len != expected {
                return Err(FrameError::MalformedTelegram(format!(
                    "RORG {rorg} carries {user_len} user data bytes, expected {expected}"
                )));
            }
        }

        let sender = DeviceAddress::from_slice(&data[user_end..user_end + 4])
            .ok_or_else(|| FrameError::MalformedTelegram("sender id".to_string()))?;
        let status = data[data.len() - 1];

        let optional = &frame.optional;
        let (subtelegrams, destination, dbm, security_level) = if optional.len() >= 7 {
            (
                Some(optional[0]),
                DeviceAddress::from_slice(&optional[1..5]),
                Some(optional[5]),
                Some(optional[6]),
            )
        } else {
            (None, None, None, None)
        };

        Ok(Self {
            rorg,
            user_data: data.slice(1..user_end),
            sender,
            status,
            subtelegrams,
            destination,
            dbm,
            security_level,
        })
    }
}
