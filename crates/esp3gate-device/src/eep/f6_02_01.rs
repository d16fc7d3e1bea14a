//! F6-02-01: light and blind control, two rockers.
//!
//! RPS data byte, N-message (status NU bit set):
//! `R1 (7..5) | EB (4) | R2 (3..1) | SA (0)`.
//! U-message (NU clear): `buttons (7..5) | EB (4)`; EB clear means released.
//! Rocker codes: 0 = AI, 1 = AO, 2 = BI, 3 = BO.

use esp3gate_frame::{RadioTelegram, Rorg};
use tracing::debug;

use crate::device::{Device, DeviceContext, ParameterListener, StandardDevice};
use crate::error::Result;
use crate::parameter::{
    DeviceRef, Initiation, ParameterId, ParameterValue, Rejection, RockerAction, WriteOutcome,
};

const STATUS_T21: u8 = 0x20;
const STATUS_NU: u8 = 0x10;
const ENERGY_BOW: u8 = 0x10;

/// A decoded rocker telegram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RockerEvent {
    Pressed(Vec<(ParameterId, RockerAction)>),
    Released,
}

impl RockerEvent {
    /// Decode an RPS data and status byte pair.
    pub fn decode(data: u8, status: u8) -> Option<Self> {
        let pressed = data & ENERGY_BOW != 0;
        if status & STATUS_NU == 0 {
            // U-message: only "all released" is meaningful for two rockers.
            return (!pressed).then_some(Self::Released);
        }
        if !pressed {
            return Some(Self::Released);
        }
        let mut actions = Vec::with_capacity(2);
        actions.extend(rocker_code(data >> 5));
        if data & 0x01 != 0 {
            actions.extend(rocker_code((data >> 1) & 0x07));
        }
        (!actions.is_empty()).then_some(Self::Pressed(actions))
    }
}

fn rocker_code(code: u8) -> Option<(ParameterId, RockerAction)> {
    match code {
        0 => Some((ParameterId::RockerA, RockerAction::PressI)),
        1 => Some((ParameterId::RockerA, RockerAction::PressO)),
        2 => Some((ParameterId::RockerB, RockerAction::PressI)),
        3 => Some((ParameterId::RockerB, RockerAction::PressO)),
        _ => None,
    }
}

fn press_code(parameter: ParameterId, action: RockerAction) -> Option<u8> {
    match (parameter, action) {
        (ParameterId::RockerA, RockerAction::PressI) => Some(0),
        (ParameterId::RockerA, RockerAction::PressO) => Some(1),
        (ParameterId::RockerB, RockerAction::PressI) => Some(2),
        (ParameterId::RockerB, RockerAction::PressO) => Some(3),
        _ => None,
    }
}

/// Wall switch with rockers A and B.
///
/// Writing a press sends a press telegram followed by a release telegram,
/// the way a physical switch would be operated.
#[derive(Debug)]
pub struct RockerSwitch {
    base: StandardDevice,
    rocker_a: Option<RockerAction>,
    rocker_b: Option<RockerAction>,
}

impl RockerSwitch {
    pub const TYPE: &'static str = "RD_F6-02-01";
    const PARAMETERS: &'static [ParameterId] = &[ParameterId::RockerA, ParameterId::RockerB];

    pub fn new(context: DeviceContext) -> Self {
        Self {
            base: StandardDevice::new(Self::TYPE, context),
            rocker_a: None,
            rocker_b: None,
        }
    }

    pub fn create(context: DeviceContext) -> Box<dyn Device> {
        Box::new(Self::new(context))
    }

    fn slot(&mut self, parameter: ParameterId) -> Option<&mut Option<RockerAction>> {
        match parameter {
            ParameterId::RockerA => Some(&mut self.rocker_a),
            ParameterId::RockerB => Some(&mut self.rocker_b),
            _ => None,
        }
    }

    fn apply(&mut self, parameter: ParameterId, action: RockerAction, initiation: Initiation) {
        let Some(slot) = self.slot(parameter) else {
            return;
        };
        let old = slot.replace(action);
        self.base.fire(
            parameter,
            initiation,
            old.map(ParameterValue::Rocker),
            Some(ParameterValue::Rocker(action)),
        );
    }

    fn release_all(&mut self, initiation: Initiation) {
        for parameter in Self::PARAMETERS {
            let held = matches!(
                self.slot(*parameter),
                Some(Some(RockerAction::PressI | RockerAction::PressO))
            );
            if held {
                self.apply(*parameter, RockerAction::Released, initiation);
            }
        }
    }

    fn press_telegram(&self, code: u8) -> RadioTelegram {
        RadioTelegram::new(
            Rorg::Rps,
            vec![(code << 5) | ENERGY_BOW],
            self.base.local(),
            STATUS_T21 | STATUS_NU,
        )
    }

    fn release_telegram(&self) -> RadioTelegram {
        RadioTelegram::new(Rorg::Rps, vec![0x00], self.base.local(), STATUS_T21)
    }
}

impl Device for RockerSwitch {
    fn device_ref(&self) -> DeviceRef {
        self.base.device_ref()
    }

    fn parameters(&self) -> &'static [ParameterId] {
        Self::PARAMETERS
    }

    fn parse_radio(&mut self, telegram: &RadioTelegram) {
        if telegram.rorg != Rorg::Rps {
            debug!(
                device = %self.base.remote(),
                rorg = %telegram.rorg,
                "no handler for radio choice"
            );
            return;
        }
        let Some(&data) = telegram.user_data.first() else {
            return;
        };
        match RockerEvent::decode(data, telegram.status) {
            Some(RockerEvent::Pressed(actions)) => {
                for (parameter, action) in actions {
                    self.apply(parameter, action, Initiation::RadioFrame);
                }
            }
            Some(RockerEvent::Released) => self.release_all(Initiation::RadioFrame),
            None => {
                debug!(
                    device = %self.base.remote(),
                    data = format_args!("{data:#04X}"),
                    status = format_args!("{:#04X}", telegram.status),
                    "unrecognised rocker telegram"
                );
            }
        }
    }

    fn get(&self, parameter: ParameterId) -> Result<Option<ParameterValue>> {
        let value = match parameter {
            ParameterId::RockerA => self.rocker_a,
            ParameterId::RockerB => self.rocker_b,
            other => return Err(self.base.unsupported(other)),
        };
        Ok(value.map(ParameterValue::Rocker))
    }

    fn set(&mut self, parameter: ParameterId, value: ParameterValue) -> WriteOutcome {
        if !Self::PARAMETERS.contains(&parameter) {
            return WriteOutcome::Rejected(Rejection::UnsupportedParameter(parameter));
        }
        let ParameterValue::Rocker(action) = value else {
            return WriteOutcome::Rejected(Rejection::InvalidValue { parameter, value });
        };

        if let Some(code) = press_code(parameter, action) {
            if let Err(err) = self.base.send(&self.press_telegram(code)) {
                return WriteOutcome::Fatal(err);
            }
            self.apply(parameter, action, Initiation::LocalCommand);
        }
        if let Err(err) = self.base.send(&self.release_telegram()) {
            return WriteOutcome::Fatal(err);
        }
        self.apply(parameter, RockerAction::Released, Initiation::LocalCommand);
        WriteOutcome::Accepted
    }

    fn add_listener(&mut self, listener: ParameterListener) {
        self.base.add_listener(listener);
    }
}
