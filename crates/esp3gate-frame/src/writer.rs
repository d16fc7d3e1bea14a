use std::io::{self, ErrorKind, Write};
use std::thread;
use std::time::Duration;

use bytes::BytesMut;

use crate::codec::{encode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

/// Largest ESP3 frame the transceiver sends or accepts in practice.
const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Pause before retrying a line that reported `WouldBlock`.
const WOULD_BLOCK_BACKOFF: Duration = Duration::from_millis(1);

/// Writes complete ESP3 frames to a byte sink.
///
/// Every frame is encoded into a reused buffer and written in full before
/// the sink is flushed, so a frame never interleaves with another writer's
/// bytes as long as callers serialize access.
pub struct FrameWriter<T> {
    sink: T,
    scratch: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(sink: T) -> Self {
        Self::with_config(sink, FrameConfig::default())
    }

    pub fn with_config(sink: T, config: FrameConfig) -> Self {
        Self {
            sink,
            scratch: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode `frame`, write all of it and flush. Returns the wire size.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<usize> {
        let payload = frame.data.len() + frame.optional.len();
        let max = self.config.max_payload_size;
        if payload > max {
            return Err(FrameError::PayloadTooLarge { size: payload, max });
        }

        self.scratch.clear();
        encode_frame(frame, &mut self.scratch)?;

        let mut remaining = &self.scratch[..];
        while !remaining.is_empty() {
            let (sink, chunk) = (&mut self.sink, remaining);
            match retry_transient(|| sink.write(chunk))? {
                0 => return Err(FrameError::ConnectionClosed),
                written => remaining = &remaining[written..],
            }
        }
        self.flush()?;
        Ok(self.scratch.len())
    }

    pub fn flush(&mut self) -> Result<()> {
        let sink = &mut self.sink;
        retry_transient(|| sink.flush())
    }

    pub fn get_ref(&self) -> &T {
        &self.sink
    }

    pub fn into_inner(self) -> T {
        self.sink
    }
}

/// Run `op` until it returns something other than `Interrupted` or
/// `WouldBlock`.
fn retry_transient<R>(mut op: impl FnMut() -> io::Result<R>) -> Result<R> {
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) if err.kind() == ErrorKind::WouldBlock => thread::sleep(WOULD_BLOCK_BACKOFF),
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::assembler::FrameAssembler;
    use crate::packet::PacketType;

    #[test]
    fn written_bytes_reassemble() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        let first = Frame::common_command(0x03);
        let second = Frame::new(PacketType::Response, vec![0x00], vec![]);

        let first_size = writer.write_frame(&first).unwrap();
        writer.write_frame(&second).unwrap();
        assert_eq!(first_size, first.wire_size());

        let wire = writer.into_inner().into_inner();
        let frames = FrameAssembler::new().push(&wire);
        assert_eq!(frames, vec![first, second]);
    }

    #[test]
    fn payload_too_large_rejected() {
        let cfg = FrameConfig {
            max_payload_size: 4,
        };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);
        let frame = Frame::new(PacketType::RadioErp1, vec![0u8; 8], vec![]);

        let err = writer.write_frame(&frame).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }

    #[test]
    fn handles_interrupted_write_and_flush() {
        let writer_impl = InterruptedOnce {
            wrote_once: false,
            flushed_once: false,
            data: Vec::new(),
        };

        let mut writer = FrameWriter::new(writer_impl);
        writer.write_frame(&Frame::common_command(0x08)).unwrap();

        assert_eq!(writer.get_ref().data.len(), 8);
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer.write_frame(&Frame::common_command(0x03)).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    struct InterruptedOnce {
        wrote_once: bool,
        flushed_once: bool,
        data: Vec<u8>,
    }

    impl Write for InterruptedOnce {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.wrote_once {
                self.wrote_once = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.flushed_once {
                self.flushed_once = true;
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
