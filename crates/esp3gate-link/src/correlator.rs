use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use esp3gate_frame::{Frame, FrameKind};
use tracing::{debug, trace};

use crate::error::{LinkError, Result};

/// What travels on the DATA channel: a frame, or the close sentinel.
#[derive(Debug)]
enum Delivery {
    Frame(Frame),
    Closed,
}

/// Separates solicited RESPONSE frames from unsolicited DATA frames.
///
/// Each frame lands on exactly one of two FIFO channels, chosen by its packet
/// type when it is routed. Both channels are unbounded: a consumer that stops
/// draining lets its queue grow without limit.
#[derive(Debug)]
pub struct Correlator {
    response_tx: Sender<Frame>,
    response_rx: Receiver<Frame>,
    data_tx: Sender<Delivery>,
    data_rx: Receiver<Delivery>,
    closed: AtomicBool,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub fn new() -> Self {
        let (response_tx, response_rx) = channel::unbounded();
        let (data_tx, data_rx) = channel::unbounded();
        Self {
            response_tx,
            response_rx,
            data_tx,
            data_rx,
            closed: AtomicBool::new(false),
        }
    }

    /// Place a frame on the channel matching its kind.
    pub fn route(&self, frame: Frame) {
        trace!(packet_type = %frame.packet_type, "routing frame");
        // Both receivers live in `self`, so sends cannot fail.
        match frame.kind() {
            FrameKind::Response => {
                let _ = self.response_tx.send(frame);
            }
            FrameKind::Data => {
                let _ = self.data_tx.send(Delivery::Frame(frame));
            }
        }
    }

    /// Wait up to `timeout` for the next RESPONSE frame.
    pub fn recv_response(&self, timeout: Duration) -> Option<Frame> {
        self.response_rx.recv_timeout(timeout).ok()
    }

    /// Wait up to `timeout` for the next DATA frame.
    ///
    /// Returns `Ok(None)` on timeout and `Err(LinkError::Shutdown)` once the
    /// close sentinel is reached.
    pub fn recv_data(&self, timeout: Duration) -> Result<Option<Frame>> {
        match self.data_rx.recv_timeout(timeout) {
            Ok(Delivery::Frame(frame)) => Ok(Some(frame)),
            Ok(Delivery::Closed) => {
                // Leave the sentinel in place for any other waiting reader.
                let _ = self.data_tx.send(Delivery::Closed);
                Err(LinkError::Shutdown)
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(LinkError::Shutdown),
        }
    }

    /// Drop responses nobody waited for.
    ///
    /// Called before each write so a late reply to an earlier command is not
    /// mistaken for the reply to the next one.
    pub fn discard_stale_responses(&self) -> usize {
        let stale = self.response_rx.try_iter().count();
        if stale > 0 {
            debug!(stale, "discarded unclaimed responses");
        }
        stale
    }

    /// Wake DATA readers with the close sentinel. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.data_tx.send(Delivery::Closed);
        }
    }

    /// Re-arm after a close, discarding the old sentinel.
    pub fn reopen(&self) {
        if self.closed.swap(false, Ordering::SeqCst) {
            let pending: Vec<Delivery> = self.data_rx.try_iter().collect();
            for delivery in pending {
                if let Delivery::Frame(frame) = delivery {
                    let _ = self.data_tx.send(Delivery::Frame(frame));
                }
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Frames waiting on each channel: (responses, data).
    pub fn backlog(&self) -> (usize, usize) {
        (self.response_rx.len(), self.data_rx.len())
    }
}

#[cfg(test)]
mod tests {
    use esp3gate_frame::PacketType;

    use super::*;

    const SHORT: Duration = Duration::from_millis(10);

    fn radio(tag: u8) -> Frame {
        Frame::new(
            PacketType::RadioErp1,
            vec![0xF6, tag, 0x00, 0x29, 0x9B, 0x12, 0x30],
            vec![],
        )
    }

    fn response(code: u8) -> Frame {
        Frame::new(PacketType::Response, vec![code], vec![])
    }

    #[test]
    fn responses_never_reach_data_side() {
        let correlator = Correlator::new();
        correlator.route(radio(1));
        correlator.route(response(0));
        correlator.route(radio(2));
        correlator.route(response(2));

        assert_eq!(correlator.recv_data(SHORT).unwrap(), Some(radio(1)));
        assert_eq!(correlator.recv_data(SHORT).unwrap(), Some(radio(2)));
        assert_eq!(correlator.recv_data(SHORT).unwrap(), None);

        assert_eq!(correlator.recv_response(SHORT), Some(response(0)));
        assert_eq!(correlator.recv_response(SHORT), Some(response(2)));
        assert_eq!(correlator.recv_response(SHORT), None);
    }

    #[test]
    fn data_frames_never_reach_response_side() {
        let correlator = Correlator::new();
        correlator.route(radio(1));
        correlator.route(Frame::new(PacketType::Event, vec![0x02], vec![]));

        assert_eq!(correlator.recv_response(SHORT), None);
        assert_eq!(correlator.backlog(), (0, 2));
    }

    #[test]
    fn close_is_distinct_from_timeout() {
        let correlator = Correlator::new();
        assert!(matches!(correlator.recv_data(SHORT), Ok(None)));

        correlator.route(radio(7));
        correlator.close();
        correlator.close();

        assert_eq!(correlator.recv_data(SHORT).unwrap(), Some(radio(7)));
        assert!(matches!(correlator.recv_data(SHORT), Err(LinkError::Shutdown)));
        // The sentinel stays visible to later readers.
        assert!(matches!(correlator.recv_data(SHORT), Err(LinkError::Shutdown)));
    }

    #[test]
    fn reopen_drops_sentinel_keeps_frames() {
        let correlator = Correlator::new();
        correlator.close();
        correlator.route(radio(3));
        correlator.reopen();

        assert!(!correlator.is_closed());
        assert_eq!(correlator.recv_data(SHORT).unwrap(), Some(radio(3)));
        assert_eq!(correlator.recv_data(SHORT).unwrap(), None);
    }

    #[test]
    fn stale_responses_discarded() {
        let correlator = Correlator::new();
        correlator.route(response(0));
        correlator.route(response(1));

        assert_eq!(correlator.discard_stale_responses(), 2);
        assert_eq!(correlator.recv_response(SHORT), None);
    }

    #[test]
    fn data_order_is_preserved() {
        let correlator = Correlator::new();
        for tag in 0..32u8 {
            correlator.route(radio(tag));
        }
        for tag in 0..32u8 {
            assert_eq!(correlator.recv_data(SHORT).unwrap(), Some(radio(tag)));
        }
    }
}
