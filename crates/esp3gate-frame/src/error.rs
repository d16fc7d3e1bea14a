use crate::packet::PacketType;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The buffer does not start with the 0x55 sync byte.
    #[error("missing sync byte (expected 0x55)")]
    MissingSync,

    /// The header checksum does not match.
    #[error("header CRC mismatch (expected {expected:#04x}, got {actual:#04x})")]
    HeaderChecksum { expected: u8, actual: u8 },

    /// The data checksum does not match.
    #[error("data CRC mismatch (expected {expected:#04x}, got {actual:#04x})")]
    DataChecksum { expected: u8, actual: u8 },

    /// The header announces an impossible length.
    #[error("invalid frame length (data {data_len}, optional {optional_len})")]
    InvalidLength { data_len: usize, optional_len: usize },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A frame of one packet type was interpreted as another.
    #[error("unexpected packet type {actual} (expected {expected})")]
    UnexpectedPacketType {
        expected: PacketType,
        actual: PacketType,
    },

    /// A radio telegram body does not match its RORG.
    #[error("malformed radio telegram: {0}")]
    MalformedTelegram(String),

    /// A device address string could not be parsed.
    #[error("invalid device address {0:?}")]
    InvalidAddress(String),

    /// An I/O error occurred while writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The line accepted no more bytes.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
