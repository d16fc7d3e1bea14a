#![cfg(unix)]

use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use esp3gate_frame::{Frame, FrameAssembler, PacketType, ReturnCode};
use esp3gate_link::{Connector, LinkConfig, LinkError};
use esp3gate_transport::SerialStream;

/// Stand-in for a TCM310 at the far end of the line.
///
/// Every frame it receives is passed to `reply`; whatever frames that
/// returns are written back in order. The thread ends when the gateway side
/// hangs up and returns everything it received.
fn spawn_transceiver<F>(mut line: SerialStream, reply: F) -> JoinHandle<Vec<Frame>>
where
    F: Fn(&Frame) -> Vec<Frame> + Send + 'static,
{
    thread::spawn(move || {
        line.set_read_timeout(Duration::from_millis(50))
            .expect("timeout should apply");
        let mut assembler = FrameAssembler::new();
        let mut received = Vec::new();
        let mut chunk = [0u8; 64];
        loop {
            let n = match line.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    continue
                }
                Err(_) => break,
            };
            for frame in assembler.push(&chunk[..n]) {
                for answer in reply(&frame) {
                    let bytes = answer.to_bytes().expect("reply should encode");
                    if line.write_all(&bytes).is_err() {
                        return received;
                    }
                }
                received.push(frame);
            }
        }
        received
    })
}

fn radio(tag: u8) -> Frame {
    Frame::new(
        PacketType::RadioErp1,
        vec![0xF6, tag, 0x00, 0x29, 0x9B, 0x12, 0x30],
        vec![],
    )
}

fn ok_with(data: &[u8]) -> Frame {
    let mut bytes = vec![0x00];
    bytes.extend_from_slice(data);
    Frame::new(PacketType::Response, bytes, vec![])
}

fn fast_config() -> LinkConfig {
    LinkConfig {
        response_timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(20),
        ..LinkConfig::default()
    }
}

#[test]
fn write_receives_correlated_response() {
    let (line, far) = SerialStream::pair().unwrap();
    let transceiver = spawn_transceiver(far, |frame| {
        if frame.packet_type == PacketType::CommonCommand && frame.data[0] == 0x08 {
            vec![ok_with(&[0xFF, 0xAA, 0x00, 0x80])]
        } else {
            vec![]
        }
    });

    let connector = Connector::with_config(fast_config());
    connector.connect_stream("pair", line).unwrap();

    let response = connector
        .write(&Frame::common_command(0x08))
        .unwrap()
        .expect("transceiver should answer");
    assert_eq!(response.code, ReturnCode::Ok);
    assert_eq!(response.data.as_ref(), &[0xFF, 0xAA, 0x00, 0x80]);

    connector.disconnect().unwrap();
    let received = transceiver.join().unwrap();
    assert_eq!(received, vec![Frame::common_command(0x08)]);
}

#[test]
fn write_times_out_without_response() {
    let (line, far) = SerialStream::pair().unwrap();
    let transceiver = spawn_transceiver(far, |_| vec![]);

    let config = LinkConfig {
        response_timeout: Duration::from_millis(50),
        ..fast_config()
    };
    let connector = Connector::with_config(config);
    connector.connect_stream("pair", line).unwrap();

    let start = Instant::now();
    let response = connector.write(&Frame::common_command(0x03)).unwrap();
    let elapsed = start.elapsed();

    assert!(response.is_none());
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_secs(1), "took {elapsed:?}");

    connector.disconnect().unwrap();
    transceiver.join().unwrap();
}

#[test]
fn responses_are_invisible_to_read() {
    let (line, mut far) = SerialStream::pair().unwrap();
    let connector = Connector::with_config(fast_config());
    connector.connect_stream("pair", line).unwrap();

    for frame in [radio(1), ok_with(&[]), radio(2)] {
        far.write_all(&frame.to_bytes().unwrap()).unwrap();
    }

    let timeout = Duration::from_secs(2);
    assert_eq!(connector.read(timeout).unwrap(), Some(radio(1)));
    assert_eq!(connector.read(timeout).unwrap(), Some(radio(2)));
    assert_eq!(connector.read(Duration::from_millis(50)).unwrap(), None);
    assert_eq!(connector.correlator().backlog(), (1, 0));

    connector.disconnect().unwrap();
}

#[test]
fn byte_at_a_time_delivery_reassembles() {
    let (line, mut far) = SerialStream::pair().unwrap();
    let connector = Connector::with_config(fast_config());
    connector.connect_stream("pair", line).unwrap();

    let frames: Vec<Frame> = (0..4).map(radio).collect();
    let writer = thread::spawn(move || {
        for frame in &frames {
            for byte in frame.to_bytes().unwrap().iter() {
                far.write_all(&[*byte]).unwrap();
                far.flush().unwrap();
                thread::sleep(Duration::from_millis(1));
            }
        }
        far
    });

    for tag in 0..4 {
        assert_eq!(
            connector.read(Duration::from_secs(2)).unwrap(),
            Some(radio(tag))
        );
    }

    let _far = writer.join().unwrap();
    connector.disconnect().unwrap();
}

#[test]
fn disconnect_wakes_blocked_reader_with_shutdown() {
    let (line, _far) = SerialStream::pair().unwrap();
    let connector = Arc::new(Connector::with_config(fast_config()));
    connector.connect_stream("pair", line).unwrap();

    let reader = {
        let connector = Arc::clone(&connector);
        thread::spawn(move || {
            let start = Instant::now();
            let result = connector.read(Duration::from_secs(10));
            (result, start.elapsed())
        })
    };

    thread::sleep(Duration::from_millis(50));
    connector.disconnect().unwrap();

    let (result, elapsed) = reader.join().unwrap();
    assert!(matches!(result, Err(LinkError::Shutdown)));
    assert!(elapsed < Duration::from_secs(5));
}

#[test]
fn far_end_hangup_surfaces_as_shutdown() {
    let (line, far) = SerialStream::pair().unwrap();
    let connector = Connector::with_config(fast_config());
    connector.connect_stream("pair", line).unwrap();

    drop(far);

    assert!(matches!(
        connector.read(Duration::from_secs(2)),
        Err(LinkError::Shutdown)
    ));
    // The line is still owned until explicitly released.
    assert!(connector.is_connected());
    connector.disconnect().unwrap();
}

#[test]
fn concurrent_writers_each_get_their_own_response() {
    let (line, far) = SerialStream::pair().unwrap();
    let transceiver = spawn_transceiver(far, |frame| vec![ok_with(&frame.data)]);

    let connector = Arc::new(Connector::with_config(fast_config()));
    connector.connect_stream("pair", line).unwrap();

    let workers: Vec<_> = [0x03u8, 0x08, 0x0A]
        .into_iter()
        .map(|code| {
            let connector = Arc::clone(&connector);
            thread::spawn(move || {
                for _ in 0..10 {
                    let response = connector
                        .write(&Frame::common_command(code))
                        .unwrap()
                        .expect("every command is answered");
                    assert_eq!(response.data.as_ref(), &[code]);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    connector.disconnect().unwrap();
    assert_eq!(transceiver.join().unwrap().len(), 30);
}

#[test]
fn read_and_write_do_not_interfere() {
    let (line, far) = SerialStream::pair().unwrap();
    // Radio traffic arrives between a command and its response.
    let transceiver = spawn_transceiver(far, |frame| vec![radio(frame.data[0]), ok_with(&[])]);

    let connector = Arc::new(Connector::with_config(fast_config()));
    connector.connect_stream("pair", line).unwrap();

    let reader = {
        let connector = Arc::clone(&connector);
        thread::spawn(move || {
            let mut seen = Vec::new();
            while seen.len() < 5 {
                if let Some(frame) = connector.read(Duration::from_secs(2)).unwrap() {
                    seen.push(frame);
                }
            }
            seen
        })
    };

    for code in 1..=5u8 {
        let response = connector.write(&Frame::common_command(code)).unwrap();
        assert!(response.expect("answered").is_ok());
    }

    let seen = reader.join().unwrap();
    assert_eq!(seen, (1..=5u8).map(radio).collect::<Vec<_>>());

    connector.disconnect().unwrap();
    transceiver.join().unwrap();
}
