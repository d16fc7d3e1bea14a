//! ESP3 framing for EnOcean serial transceivers.
//!
//! Every unit on the serial line is framed as:
//! - A sync byte (0x55)
//! - A 4-byte header: data length (u16 BE), optional length, packet type
//! - A CRC8 over the header
//! - Data, optional data, and a CRC8 over both
//!
//! [`FrameAssembler`] turns an arbitrarily chunked byte stream into complete,
//! checksum-validated [`Frame`]s. Corrupt input is dropped, never forwarded.

pub mod address;
pub mod assembler;
pub mod codec;
pub mod error;
pub mod packet;
pub mod radio;
pub mod response;
pub mod writer;

pub use address::DeviceAddress;
pub use assembler::{AssemblerStats, FrameAssembler};
pub use codec::{
    crc8, decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE, SYNC,
};
pub use error::{FrameError, Result};
pub use packet::{FrameKind, PacketType};
pub use radio::{RadioTelegram, Rorg};
pub use response::{ResponsePacket, ReturnCode};
pub use writer::FrameWriter;
