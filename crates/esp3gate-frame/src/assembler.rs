use bytes::{Buf, BytesMut};
use tracing::{debug, trace};

use crate::codec::{decode_frame, Frame, FrameConfig, SYNC};
use crate::error::FrameError;

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Counters describing what the assembler has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblerStats {
    /// Complete frames emitted.
    pub frames: u64,
    /// Candidate frames dropped for a bad checksum or length.
    pub dropped: u64,
    /// Bytes skipped while hunting for a sync byte.
    pub skipped_bytes: u64,
}

/// Reassembles ESP3 frames from a byte stream delivered in arbitrary chunks.
///
/// One assembler is bound to one connection. Frames only ever come out whole
/// and checksum-validated; a corrupt candidate is discarded and scanning
/// resumes at the next sync byte after its start. Every decision is made on
/// fully buffered bytes, so the frames produced depend only on the byte
/// stream and never on how it was chunked.
#[derive(Debug)]
pub struct FrameAssembler {
    buf: BytesMut,
    config: FrameConfig,
    stats: AssemblerStats,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAssembler {
    /// Create a new assembler with default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Create a new assembler with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            stats: AssemblerStats::default(),
        }
    }

    /// Feed one byte.
    ///
    /// A byte that fails a candidate's data CRC can release several frames
    /// buffered inside that candidate, so the result is a list.
    pub fn push_byte(&mut self, byte: u8) -> Vec<Frame> {
        self.push(&[byte])
    }

    /// Feed a chunk and collect every frame it completes, in stream order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(bytes);
        self.drain()
    }

    fn drain(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        loop {
            match decode_frame(&mut self.buf, self.config.max_payload_size) {
                Ok(Some(frame)) => {
                    trace!(
                        packet_type = %frame.packet_type,
                        data_len = frame.data.len(),
                        optional_len = frame.optional.len(),
                        "frame assembled"
                    );
                    self.stats.frames += 1;
                    frames.push(frame);
                }
                Ok(None) => return frames,
                Err(FrameError::MissingSync) => self.skip_to_sync(0),
                Err(err) => {
                    debug!(error = %err, "dropping corrupt frame");
                    self.stats.dropped += 1;
                    self.skip_to_sync(1);
                }
            }
        }
    }

    /// Discard bytes up to the next sync byte at or after `from`.
    fn skip_to_sync(&mut self, from: usize) {
        let skip = self.buf[from.min(self.buf.len())..]
            .iter()
            .position(|&b| b == SYNC)
            .map(|pos| pos + from)
            .unwrap_or(self.buf.len());
        self.stats.skipped_bytes += skip.saturating_sub(from) as u64;
        self.buf.advance(skip);
    }

    /// Bytes buffered towards an incomplete frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Drop any partially buffered frame.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    pub fn stats(&self) -> AssemblerStats {
        self.stats
    }

    /// Current assembler configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::codec::encode_frame;
    use crate::packet::PacketType;

    fn wire(frames: &[Frame]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for frame in frames {
            encode_frame(frame, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    fn sample_frames() -> Vec<Frame> {
        vec![
            Frame::new(
                PacketType::RadioErp1,
                vec![0xA5, 0x00, 0x01, 0xF4, 0x0D, 0x01, 0x82, 0x5D, 0xAB, 0x00],
                vec![0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x40, 0x00],
            ),
            Frame::new(PacketType::Response, vec![0x00], vec![]),
            Frame::new(PacketType::Event, vec![0x02, 0x01], vec![]),
            Frame::new(
                PacketType::RadioErp1,
                vec![0xF6, 0x55, 0x00, 0x29, 0x9B, 0x12, 0x30],
                vec![],
            ),
        ]
    }

    #[test]
    fn whole_stream_yields_all_frames() {
        let frames = sample_frames();
        let mut assembler = FrameAssembler::new();

        let out = assembler.push(&wire(&frames));

        assert_eq!(out, frames);
        assert_eq!(assembler.pending(), 0);
        assert_eq!(assembler.stats().frames, 4);
    }

    #[test]
    fn byte_by_byte_matches_whole() {
        let frames = sample_frames();
        let bytes = wire(&frames);
        let mut assembler = FrameAssembler::new();

        let out: Vec<Frame> = bytes.iter().flat_map(|&b| assembler.push_byte(b)).collect();

        assert_eq!(out, frames);
    }

    #[test]
    fn frames_nested_in_rejected_candidate_survive_any_feeding() {
        let inner = vec![
            Frame::new(PacketType::Response, vec![0x00], vec![]),
            Frame::new(PacketType::Response, vec![0x01], vec![]),
        ];
        let body = wire(&inner);
        let header = [0x00, body.len() as u8, 0x00, 0x01];

        let mut bytes = vec![SYNC];
        bytes.extend_from_slice(&header);
        bytes.push(crate::codec::crc8(&header));
        bytes.extend_from_slice(&body);
        bytes.push(crate::codec::crc8(&body) ^ 0xFF);

        let whole = FrameAssembler::new().push(&bytes);

        let mut by_byte = FrameAssembler::new();
        let byte_out: Vec<Frame> = bytes.iter().flat_map(|&b| by_byte.push_byte(b)).collect();

        let mut by_chunk = FrameAssembler::new();
        let chunk_out: Vec<Frame> = bytes
            .chunks(1)
            .flat_map(|chunk| by_chunk.push(chunk))
            .collect();

        assert_eq!(whole, inner);
        assert_eq!(byte_out, inner);
        assert_eq!(chunk_out, inner);
        assert_eq!(by_byte.stats().dropped, 1);
    }

    #[test]
    fn every_chunk_size_matches_whole() {
        let frames = sample_frames();
        let bytes = wire(&frames);

        for chunk_size in 1..=bytes.len() {
            let mut assembler = FrameAssembler::new();
            let out: Vec<Frame> = bytes
                .chunks(chunk_size)
                .flat_map(|chunk| assembler.push(chunk))
                .collect();
            assert_eq!(out, frames, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn uneven_chunks_match_whole() {
        let frames = sample_frames();
        let bytes = wire(&frames);
        let cuts = [1usize, 3, 7, 2, 11, 5, 13];

        let mut assembler = FrameAssembler::new();
        let mut out = Vec::new();
        let mut pos = 0;
        let mut i = 0;
        while pos < bytes.len() {
            let end = (pos + cuts[i % cuts.len()]).min(bytes.len());
            out.extend(assembler.push(&bytes[pos..end]));
            pos = end;
            i += 1;
        }

        assert_eq!(out, frames);
    }

    #[test]
    fn leading_garbage_is_skipped() {
        let frames = sample_frames();
        let mut bytes = vec![0x00, 0x13, 0xFF];
        bytes.extend(wire(&frames[..1]));

        let mut assembler = FrameAssembler::new();
        let out = assembler.push(&bytes);

        assert_eq!(out, frames[..1].to_vec());
        assert_eq!(assembler.stats().skipped_bytes, 3);
    }

    #[test]
    fn bad_data_crc_dropped_and_stream_continues() {
        let frames = sample_frames();
        let mut first = wire(&frames[..1]);
        let last = first.len() - 1;
        first[last] ^= 0x5A;
        first.extend(wire(&frames[1..]));

        let mut assembler = FrameAssembler::new();
        let out = assembler.push(&first);

        assert_eq!(out, frames[1..].to_vec());
        assert_eq!(assembler.stats().dropped, 1);
    }

    #[test]
    fn bad_header_crc_resyncs_on_next_sync() {
        let frames = sample_frames();
        let mut bytes = wire(&frames[1..2]);
        bytes[5] ^= 0x01;
        bytes.extend(wire(&frames[2..3]));

        let mut assembler = FrameAssembler::new();
        let out = assembler.push(&bytes);

        assert_eq!(out, frames[2..3].to_vec());
        assert!(assembler.stats().dropped >= 1);
    }

    #[test]
    fn corrupt_frame_result_is_chunk_independent() {
        let frames = sample_frames();
        let mut bytes = wire(&frames[..2]);
        bytes[9] ^= 0xFF; // inside the first frame's data
        bytes.extend(wire(&frames[2..]));

        let mut whole = FrameAssembler::new();
        let expected = whole.push(&bytes);

        for chunk_size in 1..8 {
            let mut assembler = FrameAssembler::new();
            let out: Vec<Frame> = bytes
                .chunks(chunk_size)
                .flat_map(|chunk| assembler.push(chunk))
                .collect();
            assert_eq!(out, expected, "chunk size {chunk_size}");
        }
        assert_eq!(expected, frames[1..].to_vec());
    }

    #[test]
    fn oversized_header_rejected_without_waiting() {
        let header = [0x7F, 0xFF, 0x00, 0x01];
        let mut bytes = BytesMut::new();
        bytes.put_u8(SYNC);
        bytes.put_slice(&header);
        bytes.put_u8(crate::codec::crc8(&header));
        let frames = sample_frames();
        bytes.put_slice(&wire(&frames[1..2]));

        let mut assembler = FrameAssembler::new();
        let out = assembler.push(&bytes);

        assert_eq!(out, frames[1..2].to_vec());
        assert_eq!(assembler.stats().dropped, 1);
    }

    #[test]
    fn partial_frame_stays_pending_until_complete() {
        let frames = sample_frames();
        let bytes = wire(&frames[..1]);
        let mut assembler = FrameAssembler::new();

        assert!(assembler.push(&bytes[..10]).is_empty());
        assert_eq!(assembler.pending(), 10);

        let out = assembler.push(&bytes[10..]);
        assert_eq!(out, frames[..1].to_vec());
    }

    #[test]
    fn reset_discards_partial_frame() {
        let frames = sample_frames();
        let bytes = wire(&frames[..2]);
        let mut assembler = FrameAssembler::new();

        assembler.push(&bytes[..4]);
        assembler.reset();
        assert_eq!(assembler.pending(), 0);

        // The tail of the first frame is garbage now; the second frame survives.
        let first_len = frames[0].wire_size();
        let out = assembler.push(&bytes[4..]);
        assert_eq!(out.last(), Some(&frames[1]));
        assert!(bytes.len() > first_len);
    }
}
