use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use esp3gate_frame::{Frame, PacketType, RadioTelegram};
use esp3gate_link::{Connector, LinkError};
use tracing::{debug, info, trace, warn};

use crate::bus::Bus;
use crate::error::ServiceError;
use crate::lifecycle::{Lifecycle, Service, ServiceState};
use crate::sync::lock;

/// How long one read of the consumer loop waits before re-checking for
/// shutdown.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(15);

/// Owns the transceiver link and publishes every received radio telegram on
/// the packet bus.
pub struct RadioService {
    lifecycle: Arc<Lifecycle>,
    port: String,
    connector: Arc<Connector>,
    packets: Arc<Bus<RadioTelegram>>,
    read_timeout: Duration,
    running: Arc<AtomicBool>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl RadioService {
    pub const NAME: &'static str = "radio";

    /// A service that connects `connector` to `port` on start. A connector
    /// that is already connected is used as is.
    pub fn new(
        port: impl Into<String>,
        connector: Arc<Connector>,
        packets: Arc<Bus<RadioTelegram>>,
    ) -> Self {
        Self {
            lifecycle: Arc::new(Lifecycle::new(Self::NAME)),
            port: port.into(),
            connector,
            packets,
            read_timeout: DEFAULT_READ_TIMEOUT,
            running: Arc::new(AtomicBool::new(false)),
            consumer: Mutex::new(None),
        }
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn connector(&self) -> &Arc<Connector> {
        &self.connector
    }

    /// Shared lifecycle, for services that wait on this one.
    pub fn lifecycle_handle(&self) -> Arc<Lifecycle> {
        Arc::clone(&self.lifecycle)
    }

    fn spawn_consumer(&self) -> std::io::Result<JoinHandle<()>> {
        let connector = Arc::clone(&self.connector);
        let packets = Arc::clone(&self.packets);
        let running = Arc::clone(&self.running);
        let lifecycle = Arc::clone(&self.lifecycle);
        let read_timeout = self.read_timeout;
        thread::Builder::new()
            .name("esp3-radio".to_string())
            .spawn(move || consume(&connector, &packets, &running, &lifecycle, read_timeout))
    }
}

impl Service for RadioService {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn start(&self) -> Result<(), ServiceError> {
        self.lifecycle.transition(ServiceState::Starting)?;
        if !self.connector.is_connected() {
            if let Err(err) = self.connector.connect(&self.port) {
                self.lifecycle.fail(&err);
                return Err(err.into());
            }
        }

        self.running.store(true, Ordering::Release);
        match self.spawn_consumer() {
            Ok(consumer) => *lock(&self.consumer) = Some(consumer),
            Err(source) => {
                self.running.store(false, Ordering::Release);
                self.lifecycle.fail(&source);
                return Err(ServiceError::Spawn {
                    name: "esp3-radio".to_string(),
                    source,
                });
            }
        }

        self.lifecycle.transition(ServiceState::Running)?;
        info!(port = %self.port, "radio running");
        Ok(())
    }

    fn stop(&self) -> Result<(), ServiceError> {
        match self.lifecycle.state() {
            ServiceState::Idle => return Ok(self.lifecycle.transition(ServiceState::Terminated)?),
            ServiceState::Terminated | ServiceState::Stopping => return Ok(()),
            _ => {}
        }
        // Failed services still release their resources.
        let stopping = self.lifecycle.transition(ServiceState::Stopping).is_ok();

        self.running.store(false, Ordering::Release);
        match self.connector.disconnect() {
            Ok(()) | Err(LinkError::NotConnected) => {}
            Err(err) => warn!(error = %err, "disconnect failed"),
        }
        if let Some(consumer) = lock(&self.consumer).take() {
            if consumer.join().is_err() {
                warn!("radio consumer panicked");
            }
        }
        self.packets.complete();

        if stopping {
            self.lifecycle.transition(ServiceState::Terminated)?;
        }
        info!(port = %self.port, "radio stopped");
        Ok(())
    }
}

fn consume(
    connector: &Connector,
    packets: &Bus<RadioTelegram>,
    running: &AtomicBool,
    lifecycle: &Lifecycle,
    read_timeout: Duration,
) {
    while running.load(Ordering::Acquire) {
        match connector.read(read_timeout) {
            Ok(Some(frame)) => publish(&frame, packets),
            Ok(None) => trace!(timeout = ?read_timeout, "no radio packet"),
            Err(LinkError::Shutdown) => {
                if running.load(Ordering::Acquire) {
                    lifecycle.fail(&"transceiver link closed");
                }
                break;
            }
            Err(err) => {
                lifecycle.fail(&err);
                break;
            }
        }
    }
    debug!("radio consumer stopped");
}

fn publish(frame: &Frame, packets: &Bus<RadioTelegram>) {
    if frame.packet_type != PacketType::RadioErp1 {
        debug!(packet_type = %frame.packet_type, "ignoring packet");
        return;
    }
    match RadioTelegram::try_from(frame) {
        Ok(telegram) => {
            trace!(sender = %telegram.sender, rorg = %telegram.rorg, "radio telegram");
            packets.publish(telegram);
        }
        Err(err) => debug!(error = %err, "undecodable radio telegram dropped"),
    }
}
