use std::fmt;
use std::str::FromStr;

use esp3gate_frame::DeviceAddress;
use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

/// A parameter modelled by some device type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParameterId {
    /// Cumulative energy, watt-seconds.
    EnergyWs,
    /// Instantaneous power, watts.
    PowerW,
    /// Rocker A of a two-rocker switch.
    RockerA,
    /// Rocker B of a two-rocker switch.
    RockerB,
}

impl ParameterId {
    pub const ALL: [ParameterId; 4] = [
        ParameterId::EnergyWs,
        ParameterId::PowerW,
        ParameterId::RockerA,
        ParameterId::RockerB,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::EnergyWs => "ENERGY_WS",
            Self::PowerW => "POWER_W",
            Self::RockerA => "ROCKER_A",
            Self::RockerB => "ROCKER_B",
        }
    }
}

impl fmt::Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ParameterId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown parameter {s:?}"))
    }
}

/// Rocker position reported by or sent to a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RockerAction {
    /// "I" side pressed (usually on / up).
    PressI,
    /// "O" side pressed (usually off / down).
    PressO,
    Released,
}

/// A parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Unsigned(u64),
    Integer(i64),
    Rocker(RockerAction),
}

impl ParameterValue {
    /// Numeric view used for comparisons.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Unsigned(v) => Some(*v as f64),
            Self::Integer(v) => Some(*v as f64),
            Self::Bool(_) | Self::Rocker(_) => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Unsigned(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Rocker(RockerAction::PressI) => f.write_str("press_i"),
            Self::Rocker(RockerAction::PressO) => f.write_str("press_o"),
            Self::Rocker(RockerAction::Released) => f.write_str("released"),
        }
    }
}

/// What caused a parameter to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Initiation {
    /// Decoded from a received radio telegram.
    RadioFrame,
    /// Set through an explicit write.
    LocalCommand,
}

/// Identifies the device instance an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceRef {
    pub address: DeviceAddress,
    pub device_type: &'static str,
}

/// An immutable record of one parameter mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterChange {
    pub source: DeviceRef,
    pub parameter: ParameterId,
    pub old: Option<ParameterValue>,
    pub new: Option<ParameterValue>,
    pub initiation: Initiation,
}

/// Why one instance refused a write. Never fatal for the caller by itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    UnsupportedParameter(ParameterId),
    ReadOnly(ParameterId),
    InvalidValue {
        parameter: ParameterId,
        value: ParameterValue,
    },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedParameter(p) => write!(f, "parameter {p} not supported"),
            Self::ReadOnly(p) => write!(f, "parameter {p} is read-only"),
            Self::InvalidValue { parameter, value } => {
                write!(f, "value {value} out of range for {parameter}")
            }
        }
    }
}

/// Result of asking one instance to write a parameter.
#[derive(Debug)]
pub enum WriteOutcome {
    Accepted,
    Rejected(Rejection),
    Fatal(DeviceError),
}

impl WriteOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_names_round_trip() {
        for parameter in ParameterId::ALL {
            assert_eq!(parameter.name().parse::<ParameterId>().unwrap(), parameter);
        }
        assert_eq!("energy_ws".parse::<ParameterId>().unwrap(), ParameterId::EnergyWs);
        assert!("VOLTAGE".parse::<ParameterId>().is_err());
    }

    #[test]
    fn values_deserialize_untagged() {
        let v: ParameterValue = serde_json::from_str("42").unwrap();
        assert_eq!(v, ParameterValue::Unsigned(42));
        let v: ParameterValue = serde_json::from_str("-3").unwrap();
        assert_eq!(v, ParameterValue::Integer(-3));
        let v: ParameterValue = serde_json::from_str("true").unwrap();
        assert_eq!(v, ParameterValue::Bool(true));
        let v: ParameterValue = serde_json::from_str("\"press_o\"").unwrap();
        assert_eq!(v, ParameterValue::Rocker(RockerAction::PressO));
    }

    #[test]
    fn numeric_view() {
        assert_eq!(ParameterValue::Unsigned(50).as_f64(), Some(50.0));
        assert_eq!(ParameterValue::Rocker(RockerAction::Released).as_f64(), None);
    }

    #[test]
    fn change_serializes_with_names() {
        let change = ParameterChange {
            source: DeviceRef {
                address: DeviceAddress::new([0x01, 0x82, 0x5D, 0xAB]),
                device_type: "RD_A5-12-01",
            },
            parameter: ParameterId::PowerW,
            old: None,
            new: Some(ParameterValue::Unsigned(50)),
            initiation: Initiation::RadioFrame,
        };
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["source"]["address"], "01:82:5D:AB");
        assert_eq!(json["parameter"], "POWER_W");
        assert_eq!(json["new"], 50);
        assert_eq!(json["initiation"], "radio_frame");
    }
}
