//! Transceiver connection management.
//!
//! The [`Connector`] owns the serial line. A reader thread feeds every byte
//! the transceiver sends into a frame assembler; the [`Correlator`] then
//! splits complete frames into RESPONSE frames, awaited by
//! [`Connector::write`], and unsolicited DATA frames, drained by
//! [`Connector::read`].

pub mod connector;
pub mod correlator;
pub mod error;
pub mod traits;

pub use connector::{Connector, LinkConfig, DEFAULT_RESPONSE_TIMEOUT};
pub use correlator::Correlator;
pub use error::{LinkError, Result};
pub use traits::Transmitter;
