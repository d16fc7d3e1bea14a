use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::FrameError;

/// A 32-bit EnOcean device ID, the routing key for radio telegrams.
///
/// Displayed as `01:82:5D:AB`. Parsing accepts that form or eight bare hex
/// digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceAddress([u8; 4]);

impl DeviceAddress {
    /// Broadcast destination.
    pub const BROADCAST: Self = Self([0xFF; 4]);

    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; 4] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }

    pub const fn octets(&self) -> [u8; 4] {
        self.0
    }

    pub const fn as_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl From<u32> for DeviceAddress {
    fn from(value: u32) -> Self {
        Self(value.to_be_bytes())
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}")
    }
}

impl FromStr for DeviceAddress {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FrameError::InvalidAddress(s.to_string());
        let trimmed = s.trim();
        let hex: String = if trimmed.contains(':') {
            let parts: Vec<&str> = trimmed.split(':').collect();
            if parts.len() != 4 || parts.iter().any(|p| p.len() != 2) {
                return Err(invalid());
            }
            parts.concat()
        } else {
            trimmed.to_string()
        };

        if hex.len() != 8 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let value = u32::from_str_radix(&hex, 16).map_err(|_| invalid())?;
        Ok(Self::from(value))
    }
}

impl Serialize for DeviceAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DeviceAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_colon_hex() {
        let addr = DeviceAddress::new([0x01, 0x82, 0x5D, 0xAB]);
        assert_eq!(addr.to_string(), "01:82:5D:AB");
    }

    #[test]
    fn parses_both_forms() {
        let expected = DeviceAddress::new([0x01, 0x82, 0x5D, 0xAB]);
        assert_eq!("01:82:5D:AB".parse::<DeviceAddress>().unwrap(), expected);
        assert_eq!("01825dab".parse::<DeviceAddress>().unwrap(), expected);
        assert_eq!(" 01:82:5d:ab ".parse::<DeviceAddress>().unwrap(), expected);
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["", "coffee", "01:82:5D", "01:82:5D:AB:00", "0182:5D:AB", "01825DAZ"] {
            assert!(
                matches!(bad.parse::<DeviceAddress>(), Err(FrameError::InvalidAddress(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn u32_conversion_is_big_endian() {
        let addr = DeviceAddress::from(0xFFAA_0080);
        assert_eq!(addr.octets(), [0xFF, 0xAA, 0x00, 0x80]);
        assert_eq!(addr.as_u32(), 0xFFAA_0080);
        assert!(DeviceAddress::from(u32::MAX).is_broadcast());
    }

    #[test]
    fn serde_uses_display_form() {
        let addr = DeviceAddress::new([0xFF, 0xAA, 0x00, 0x80]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"FF:AA:00:80\"");
        let back: DeviceAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
        assert!(serde_json::from_str::<DeviceAddress>("\"nope\"").is_err());
    }
}
