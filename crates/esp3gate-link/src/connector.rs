use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use esp3gate_frame::{Frame, FrameAssembler, FrameConfig, FrameWriter, ResponsePacket};
use esp3gate_transport::{SerialLine, SerialStream};
use tracing::{debug, error, info, warn};

use crate::correlator::Correlator;
use crate::error::{LinkError, Result};

/// ESP3 transceivers answer a command within 500 ms.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(500);

const READ_CHUNK_SIZE: usize = 256;

/// Link behaviour configuration.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// How long `write` waits for the correlated response.
    pub response_timeout: Duration,
    /// How often the byte reader wakes to check for shutdown.
    pub poll_interval: Duration,
    /// Frame limits for both directions.
    pub frame: FrameConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            poll_interval: Duration::from_millis(100),
            frame: FrameConfig::default(),
        }
    }
}

struct Connection {
    port: String,
    control: SerialStream,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

/// Owns the serial line to one transceiver.
///
/// `write` and `read` consume disjoint channels and may be called
/// concurrently from different threads. Concurrent writers are serialized so
/// each one sees the response to its own frame.
pub struct Connector {
    config: LinkConfig,
    correlator: Arc<Correlator>,
    connection: Mutex<Option<Connection>>,
    writer: Mutex<Option<FrameWriter<SerialStream>>>,
}

impl Default for Connector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector {
    pub fn new() -> Self {
        Self::with_config(LinkConfig::default())
    }

    pub fn with_config(config: LinkConfig) -> Self {
        Self {
            config,
            correlator: Arc::new(Correlator::new()),
            connection: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }

    /// Open `port` at 57600 8N1 and start reading from it.
    pub fn connect(&self, port: &str) -> Result<()> {
        if let Some(existing) = self.port() {
            return Err(LinkError::AlreadyConnected(existing));
        }
        let stream = SerialLine::open_with(port, Default::default(), self.config.poll_interval)
            .map_err(|err| {
                error!(port, error = %err, "could not open transceiver line");
                err
            })?;
        self.connect_stream(port, stream)
    }

    /// Start a link over an already-open line.
    pub fn connect_stream(&self, label: &str, stream: SerialStream) -> Result<()> {
        let mut connection = lock(&self.connection);
        if let Some(existing) = connection.as_ref() {
            return Err(LinkError::AlreadyConnected(existing.port.clone()));
        }

        let mut reader_stream = stream.try_clone()?;
        reader_stream.set_read_timeout(self.config.poll_interval)?;
        let control = stream.try_clone()?;

        self.correlator.reopen();
        let stop = Arc::new(AtomicBool::new(false));
        let reader = {
            let correlator = Arc::clone(&self.correlator);
            let stop = Arc::clone(&stop);
            let frame_config = self.config.frame.clone();
            let port = label.to_string();
            std::thread::Builder::new()
                .name("esp3-reader".to_string())
                .spawn(move || read_loop(reader_stream, correlator, stop, frame_config, port))
                .map_err(LinkError::Spawn)?
        };

        *lock(&self.writer) = Some(FrameWriter::with_config(stream, self.config.frame.clone()));
        *connection = Some(Connection {
            port: label.to_string(),
            control,
            stop,
            reader: Some(reader),
        });

        info!(port = label, "transceiver connected");
        Ok(())
    }

    /// Release the line and wake blocked readers with a shutdown signal.
    pub fn disconnect(&self) -> Result<()> {
        let mut connection = lock(&self.connection)
            .take()
            .ok_or(LinkError::NotConnected)?;

        // Waits for an in-flight write to finish its response wait.
        lock(&self.writer).take();

        connection.stop.store(true, Ordering::SeqCst);
        connection.control.shutdown();
        if let Some(reader) = connection.reader.take() {
            if reader.join().is_err() {
                warn!(port = %connection.port, "reader thread panicked");
            }
        }
        self.correlator.close();

        info!(port = %connection.port, "transceiver disconnected");
        Ok(())
    }

    /// Send a frame and wait for the transceiver's response.
    ///
    /// Returns `Ok(None)` when the write fails on the line or no response
    /// arrives within the response timeout; both are logged, neither is an
    /// error. Only calling this without an open line is.
    pub fn write(&self, frame: &Frame) -> Result<Option<ResponsePacket>> {
        let mut writer = lock(&self.writer);
        let writer = writer.as_mut().ok_or(LinkError::NotConnected)?;

        self.correlator.discard_stale_responses();
        if let Err(err) = writer.write_frame(frame) {
            error!(packet_type = %frame.packet_type, error = %err, "could not write frame");
            return Ok(None);
        }

        let Some(raw) = self.correlator.recv_response(self.config.response_timeout) else {
            debug!(
                packet_type = %frame.packet_type,
                timeout = ?self.config.response_timeout,
                "no response"
            );
            return Ok(None);
        };

        match ResponsePacket::try_from(&raw) {
            Ok(response) => Ok(Some(response)),
            Err(err) => {
                warn!(error = %err, "unreadable response frame");
                Ok(None)
            }
        }
    }

    /// Wait up to `timeout` for the next unsolicited frame.
    ///
    /// `Ok(None)` on timeout, `Err(LinkError::Shutdown)` once the link has
    /// been closed.
    pub fn read(&self, timeout: Duration) -> Result<Option<Frame>> {
        self.correlator.recv_data(timeout)
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.connection).is_some()
    }

    /// Label of the open line, if any.
    pub fn port(&self) -> Option<String> {
        lock(&self.connection).as_ref().map(|c| c.port.clone())
    }

    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        if self.is_connected() {
            let _ = self.disconnect();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Byte reader: the only consumer of the line's input side.
fn read_loop(
    mut stream: SerialStream,
    correlator: Arc<Correlator>,
    stop: Arc<AtomicBool>,
    frame_config: FrameConfig,
    port: String,
) {
    let mut assembler = FrameAssembler::with_config(frame_config);
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    while !stop.load(Ordering::SeqCst) {
        let read = match stream.read(&mut chunk) {
            Ok(n) => n,
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                continue
            }
            Err(err) => {
                if !stop.load(Ordering::SeqCst) {
                    error!(port = %port, error = %err, "could not read from transceiver");
                    correlator.close();
                }
                break;
            }
        };

        if read == 0 {
            if !stop.load(Ordering::SeqCst) {
                warn!(port = %port, "transceiver line closed");
                correlator.close();
            }
            break;
        }

        for frame in assembler.push(&chunk[..read]) {
            correlator.route(frame);
        }
    }

    let stats = assembler.stats();
    debug!(
        port = %port,
        frames = stats.frames,
        dropped = stats.dropped,
        skipped_bytes = stats.skipped_bytes,
        "reader stopped"
    );
}
