//! Device types keyed by EnOcean Equipment Profile.

pub mod a5_12_01;
pub mod f6_02_01;

pub use a5_12_01::{MeterDevice, MeterReading, ReadingKind};
pub use f6_02_01::{RockerEvent, RockerSwitch};
