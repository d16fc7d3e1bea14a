/// Errors that can occur on a transceiver link.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Transport-level error (opening or configuring the line).
    #[error("transport error: {0}")]
    Transport(#[from] esp3gate_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] esp3gate_frame::FrameError),

    /// `connect` was called while a line is open.
    #[error("already connected to {0}")]
    AlreadyConnected(String),

    /// The operation needs an open line.
    #[error("not connected")]
    NotConnected,

    /// The link was closed while a reader was waiting.
    #[error("link shut down")]
    Shutdown,

    /// The byte reader thread could not be started.
    #[error("failed to spawn reader thread: {0}")]
    Spawn(std::io::Error),
}

pub type Result<T> = std::result::Result<T, LinkError>;
