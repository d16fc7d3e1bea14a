use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, StopBits};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::SerialStream;

/// ESP3 transceivers talk at a fixed 57600 baud.
pub const BAUD_RATE: u32 = 57_600;

/// Poll interval used by blocking reads on the line.
///
/// Readers wake up at least this often to observe shutdown requests.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Serial line parameters (57600 8N1, no flow control).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSettings {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub flow_control: FlowControl,
}

impl Default for LineSettings {
    fn default() -> Self {
        Self {
            baud_rate: BAUD_RATE,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
        }
    }
}

/// Opens serial ports for a transceiver.
pub struct SerialLine;

impl SerialLine {
    /// Open `port` with the ESP3 line parameters.
    pub fn open(port: &str) -> Result<SerialStream> {
        Self::open_with(port, LineSettings::default(), DEFAULT_POLL_INTERVAL)
    }

    /// Open `port` with explicit settings and read poll interval.
    ///
    /// Opening and configuring are reported separately: a port that opens but
    /// rejects the line parameters yields [`TransportError::Configure`].
    pub fn open_with(
        port: &str,
        settings: LineSettings,
        poll_interval: Duration,
    ) -> Result<SerialStream> {
        if port.is_empty() {
            return Err(TransportError::EmptyPortName);
        }

        let mut handle = serialport::new(port, settings.baud_rate)
            .timeout(poll_interval)
            .open()
            .map_err(|source| TransportError::Open {
                port: port.to_string(),
                source,
            })?;
        debug!(port, "serial port opened");

        let configure = |source| TransportError::Configure {
            port: port.to_string(),
            source,
        };
        handle.set_baud_rate(settings.baud_rate).map_err(configure)?;
        handle.set_data_bits(settings.data_bits).map_err(configure)?;
        handle.set_stop_bits(settings.stop_bits).map_err(configure)?;
        handle.set_parity(settings.parity).map_err(configure)?;
        handle
            .set_flow_control(settings.flow_control)
            .map_err(configure)?;

        info!(port, baud = settings.baud_rate, "serial line configured");
        Ok(SerialStream::from_serial(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_57600_8n1() {
        let settings = LineSettings::default();
        assert_eq!(settings.baud_rate, 57_600);
        assert_eq!(settings.data_bits, DataBits::Eight);
        assert_eq!(settings.stop_bits, StopBits::One);
        assert_eq!(settings.parity, Parity::None);
    }

    #[test]
    fn empty_port_name_rejected() {
        let err = SerialLine::open("").unwrap_err();
        assert!(matches!(err, TransportError::EmptyPortName));
    }

    #[test]
    fn missing_port_reports_open_failure() {
        let err = SerialLine::open("/dev/esp3gate-does-not-exist").unwrap_err();
        assert!(matches!(err, TransportError::Open { .. }));
    }
}
