/// Errors that can occur while opening or driving a serial line.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The port could not be opened.
    #[error("failed to open serial port {port}: {source}")]
    Open {
        port: String,
        source: serialport::Error,
    },

    /// The port opened but the line parameters could not be applied.
    #[error("failed to configure serial port {port}: {source}")]
    Configure {
        port: String,
        source: serialport::Error,
    },

    /// An empty port name was supplied.
    #[error("serial port name is empty")]
    EmptyPortName,

    /// An I/O error occurred on the line.
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A serial driver error outside of open/configure.
    #[error("serial driver error: {0}")]
    Driver(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
