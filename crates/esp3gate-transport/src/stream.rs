use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// A connected serial byte stream implementing `Read` and `Write`.
///
/// On real hardware this wraps a `serialport` handle. On Unix an in-process
/// socket pair can stand in for the line, which is how the link layer is
/// exercised without a transceiver attached.
pub struct SerialStream {
    inner: SerialStreamInner,
}

enum SerialStreamInner {
    Serial(Box<dyn serialport::SerialPort>),
    #[cfg(unix)]
    Socket(std::os::unix::net::UnixStream),
}

impl Read for SerialStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            SerialStreamInner::Serial(port) => port.read(buf),
            #[cfg(unix)]
            SerialStreamInner::Socket(stream) => stream.read(buf),
        }
    }
}

impl Write for SerialStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            SerialStreamInner::Serial(port) => port.write(buf),
            #[cfg(unix)]
            SerialStreamInner::Socket(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            SerialStreamInner::Serial(port) => port.flush(),
            #[cfg(unix)]
            SerialStreamInner::Socket(stream) => stream.flush(),
        }
    }
}

impl SerialStream {
    pub(crate) fn from_serial(port: Box<dyn serialport::SerialPort>) -> Self {
        Self {
            inner: SerialStreamInner::Serial(port),
        }
    }

    /// Wrap one end of a Unix socket as a line.
    #[cfg(unix)]
    pub fn from_socket(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: SerialStreamInner::Socket(stream),
        }
    }

    /// Create a connected pair of in-process lines.
    ///
    /// Bytes written to one end are read from the other, like a null-modem
    /// cable between a transceiver and the gateway.
    #[cfg(unix)]
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = std::os::unix::net::UnixStream::pair()?;
        Ok((Self::from_socket(left), Self::from_socket(right)))
    }

    /// Set the read timeout. Reads return `TimedOut`/`WouldBlock` after it.
    pub fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        match &mut self.inner {
            SerialStreamInner::Serial(port) => port.set_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            SerialStreamInner::Socket(stream) => {
                stream.set_read_timeout(Some(timeout)).map_err(Into::into)
            }
        }
    }

    /// Try to clone this stream (duplicates the underlying handle).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            SerialStreamInner::Serial(port) => Ok(Self::from_serial(port.try_clone()?)),
            #[cfg(unix)]
            SerialStreamInner::Socket(stream) => Ok(Self::from_socket(stream.try_clone()?)),
        }
    }

    /// Name of the underlying port, when the driver knows it.
    pub fn name(&self) -> Option<String> {
        match &self.inner {
            SerialStreamInner::Serial(port) => port.name(),
            #[cfg(unix)]
            SerialStreamInner::Socket(_) => None,
        }
    }

    /// Best-effort shutdown of both directions.
    ///
    /// Socket lines are shut down so a peer observes EOF. Hardware lines are
    /// released when the last handle is dropped.
    pub fn shutdown(&self) {
        match &self.inner {
            SerialStreamInner::Serial(_) => {}
            #[cfg(unix)]
            SerialStreamInner::Socket(stream) => {
                let _ = stream.shutdown(std::net::Shutdown::Both);
            }
        }
    }
}

impl std::fmt::Debug for SerialStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            SerialStreamInner::Serial(port) => f
                .debug_struct("SerialStream")
                .field("type", &"serial")
                .field("name", &port.name())
                .finish(),
            #[cfg(unix)]
            SerialStreamInner::Socket(_) => f
                .debug_struct("SerialStream")
                .field("type", &"socket")
                .finish(),
        }
    }
}
