//! A5-12-01: automated meter reading, electricity.
//!
//! 4BS user data `DB3 DB2 DB1 DB0`:
//! - `DB3..DB1`: 24-bit meter reading, big-endian.
//! - `DB0` bits 7..4: tariff info.
//! - `DB0` bit 3: LRN, cleared for teach-in.
//! - `DB0` bit 2: data type, 0 = cumulative kWh, 1 = current W.
//! - `DB0` bits 1..0: divisor exponent, reading / 10^n.

use esp3gate_frame::{RadioTelegram, Rorg};
use tracing::debug;

use crate::device::{Device, DeviceContext, ParameterListener, StandardDevice};
use crate::error::{DeviceError, Result};
use crate::parameter::{
    DeviceRef, Initiation, ParameterId, ParameterValue, Rejection, WriteOutcome,
};

const WS_PER_KWH: u64 = 3_600_000;

/// What a reading measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingKind {
    /// Cumulative energy in kWh.
    Cumulative,
    /// Instantaneous power in W.
    Instantaneous,
}

/// A decoded meter payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeterReading {
    pub raw: u32,
    /// Divisor exponent, 0..=3.
    pub scale: u8,
    pub kind: ReadingKind,
    pub tariff: u8,
}

impl MeterReading {
    pub fn from_user_data(user_data: &[u8]) -> Result<Self> {
        let [db3, db2, db1, db0]: [u8; 4] = user_data.try_into().map_err(|_| {
            DeviceError::MalformedPayload(format!(
                "A5-12-01 needs 4 data bytes, got {}",
                user_data.len()
            ))
        })?;
        let kind = if db0 & 0x04 == 0 {
            ReadingKind::Cumulative
        } else {
            ReadingKind::Instantaneous
        };
        Ok(Self {
            raw: u32::from_be_bytes([0, db3, db2, db1]),
            scale: db0 & 0x03,
            kind,
            tariff: db0 >> 4,
        })
    }

    pub fn to_user_data(&self) -> [u8; 4] {
        let [_, db3, db2, db1] = self.raw.to_be_bytes();
        let kind = match self.kind {
            ReadingKind::Cumulative => 0x00,
            ReadingKind::Instantaneous => 0x04,
        };
        // LRN set: a data telegram.
        let db0 = (self.tariff << 4) | 0x08 | kind | (self.scale & 0x03);
        [db3, db2, db1, db0]
    }

    pub fn divisor(&self) -> u64 {
        10u64.pow(u32::from(self.scale & 0x03))
    }

    /// The parameter this reading updates.
    pub fn parameter(&self) -> ParameterId {
        match self.kind {
            ReadingKind::Cumulative => ParameterId::EnergyWs,
            ReadingKind::Instantaneous => ParameterId::PowerW,
        }
    }

    /// Value in the parameter's unit: watt-seconds or watts.
    ///
    /// Integer arithmetic; the division truncates before the kWh
    /// multiplication.
    pub fn value(&self) -> u64 {
        let scaled = u64::from(self.raw) / self.divisor();
        match self.kind {
            ReadingKind::Cumulative => scaled * WS_PER_KWH,
            ReadingKind::Instantaneous => scaled,
        }
    }
}

/// Electricity meter reporting energy and power.
#[derive(Debug)]
pub struct MeterDevice {
    base: StandardDevice,
    energy_ws: Option<u64>,
    power_w: Option<u64>,
}

impl MeterDevice {
    pub const TYPE: &'static str = "RD_A5-12-01";
    const PARAMETERS: &'static [ParameterId] = &[ParameterId::EnergyWs, ParameterId::PowerW];

    pub fn new(context: DeviceContext) -> Self {
        Self {
            base: StandardDevice::new(Self::TYPE, context),
            energy_ws: None,
            power_w: None,
        }
    }

    /// Factory entry for the registry.
    pub fn create(context: DeviceContext) -> Box<dyn Device> {
        Box::new(Self::new(context))
    }

    fn slot(&mut self, parameter: ParameterId) -> Option<&mut Option<u64>> {
        match parameter {
            ParameterId::EnergyWs => Some(&mut self.energy_ws),
            ParameterId::PowerW => Some(&mut self.power_w),
            _ => None,
        }
    }
}

impl Device for MeterDevice {
    fn device_ref(&self) -> DeviceRef {
        self.base.device_ref()
    }

    fn parameters(&self) -> &'static [ParameterId] {
        Self::PARAMETERS
    }

    fn parse_radio(&mut self, telegram: &RadioTelegram) {
        if telegram.rorg != Rorg::Bs4 {
            debug!(
                device = %self.base.remote(),
                rorg = %telegram.rorg,
                "no handler for radio choice"
            );
            return;
        }
        if telegram.is_teach_in() {
            debug!(device = %self.base.remote(), "teach-in telegram ignored");
            return;
        }
        let reading = match MeterReading::from_user_data(&telegram.user_data) {
            Ok(reading) => reading,
            Err(err) => {
                debug!(device = %self.base.remote(), error = %err, "undecodable meter payload");
                return;
            }
        };

        let parameter = reading.parameter();
        let value = reading.value();
        let Some(slot) = self.slot(parameter) else {
            return;
        };
        let old = slot.replace(value);
        self.base.fire(
            parameter,
            Initiation::RadioFrame,
            old.map(ParameterValue::Unsigned),
            Some(ParameterValue::Unsigned(value)),
        );
    }

    fn get(&self, parameter: ParameterId) -> Result<Option<ParameterValue>> {
        let value = match parameter {
            ParameterId::EnergyWs => self.energy_ws,
            ParameterId::PowerW => self.power_w,
            other => return Err(self.base.unsupported(other)),
        };
        Ok(value.map(ParameterValue::Unsigned))
    }

    fn set(&mut self, parameter: ParameterId, _value: ParameterValue) -> WriteOutcome {
        if Self::PARAMETERS.contains(&parameter) {
            WriteOutcome::Rejected(Rejection::ReadOnly(parameter))
        } else {
            WriteOutcome::Rejected(Rejection::UnsupportedParameter(parameter))
        }
    }

    fn add_listener(&mut self, listener: ParameterListener) {
        self.base.add_listener(listener);
    }
}
