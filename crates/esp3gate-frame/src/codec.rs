use bytes::{Buf, BufMut, Bytes, BytesMut};
use crc::{Crc, CRC_8_SMBUS};

use crate::error::{FrameError, Result};
use crate::packet::{FrameKind, PacketType};

/// Sync byte that starts every frame.
pub const SYNC: u8 = 0x55;

/// Sync (1) + header (4) + header CRC (1) = 6 bytes.
pub const HEADER_SIZE: usize = 6;

/// Default maximum of data + optional bytes accepted from the line.
///
/// ESP3 allows up to 65535 data bytes, but transceivers never send more than
/// a few hundred. A tight bound lets the assembler reject garbage headers
/// quickly instead of waiting for bytes that will never arrive.
pub const DEFAULT_MAX_PAYLOAD: usize = 1024;

/// ESP3 uses CRC8 with polynomial 0x07 and zero init.
const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// CRC8 as used for ESP3 header and data checksums.
pub fn crc8(bytes: &[u8]) -> u8 {
    CRC8.checksum(bytes)
}

fn crc8_parts(data: &[u8], optional: &[u8]) -> u8 {
    let mut digest = CRC8.digest();
    digest.update(data);
    digest.update(optional);
    digest.finalize()
}

/// A complete, checksum-validated ESP3 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub packet_type: PacketType,
    pub data: Bytes,
    pub optional: Bytes,
}

impl Frame {
    pub fn new(packet_type: PacketType, data: impl Into<Bytes>, optional: impl Into<Bytes>) -> Self {
        Self {
            packet_type,
            data: data.into(),
            optional: optional.into(),
        }
    }

    /// A COMMON_COMMAND frame (e.g. 0x03 CO_RD_VERSION) with no arguments.
    pub fn common_command(code: u8) -> Self {
        Self::new(PacketType::CommonCommand, vec![code], Bytes::new())
    }

    pub fn kind(&self) -> FrameKind {
        self.packet_type.kind()
    }

    /// The total wire size of this frame.
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.data.len() + self.optional.len() + 1
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.wire_size());
        encode_frame(self, &mut buf)?;
        Ok(buf.freeze())
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────┬────────────┬─────────┬──────┬──────┬──────────┬──────────┬──────┐
/// │ 0x55 │ DataLen    │ OptLen  │ Type │ CRC8H│ Data     │ Optional │ CRC8D│
/// │      │ (2B BE)    │ (1B)    │ (1B) │      │          │          │      │
/// └──────┴────────────┴─────────┴──────┴──────┴──────────┴──────────┴──────┘
/// ```
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    let data_len = frame.data.len();
    let optional_len = frame.optional.len();
    if data_len == 0 || data_len > u16::MAX as usize || optional_len > u8::MAX as usize {
        return Err(FrameError::InvalidLength {
            data_len,
            optional_len,
        });
    }

    let header = [
        (data_len >> 8) as u8,
        data_len as u8,
        optional_len as u8,
        frame.packet_type.as_byte(),
    ];

    dst.reserve(frame.wire_size());
    dst.put_u8(SYNC);
    dst.put_slice(&header);
    dst.put_u8(crc8(&header));
    dst.put_slice(&frame.data);
    dst.put_slice(&frame.optional);
    dst.put_u8(crc8_parts(&frame.data, &frame.optional));
    Ok(())
}

/// Decode a frame from the front of a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. On error nothing is
/// consumed; the caller decides how to resynchronise.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.is_empty() {
        return Ok(None);
    }
    if src[0] != SYNC {
        return Err(FrameError::MissingSync);
    }
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let expected = crc8(&src[1..5]);
    if src[5] != expected {
        return Err(FrameError::HeaderChecksum {
            expected,
            actual: src[5],
        });
    }

    let data_len = u16::from_be_bytes([src[1], src[2]]) as usize;
    let optional_len = src[3] as usize;
    let packet_type = PacketType::from_byte(src[4]);

    if data_len == 0 {
        return Err(FrameError::InvalidLength {
            data_len,
            optional_len,
        });
    }
    if data_len + optional_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: data_len + optional_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + data_len + optional_len + 1;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    let body = &src[HEADER_SIZE..total - 1];
    let expected = crc8(body);
    let actual = src[total - 1];
    if actual != expected {
        return Err(FrameError::DataChecksum { expected, actual });
    }

    src.advance(HEADER_SIZE);
    let data = src.split_to(data_len).freeze();
    let optional = src.split_to(optional_len).freeze();
    src.advance(1);

    Ok(Some(Frame {
        packet_type,
        data,
        optional,
    }))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum data + optional size in bytes. Default: 1 KiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}
