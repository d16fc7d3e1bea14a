//! Serial line abstraction for ESP3 radio transceivers.
//!
//! This is the lowest layer of esp3gate. It opens the transceiver's serial
//! port with the fixed ESP3 line parameters and hands out a [`SerialStream`]
//! that the framing and link layers read from and write to.

pub mod error;
pub mod serial;
pub mod stream;

pub use error::{Result, TransportError};
pub use serial::{LineSettings, SerialLine, BAUD_RATE};
pub use stream::SerialStream;
