use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use esp3gate_device::{DeviceRegistry, ParameterChange};
use esp3gate_frame::{DeviceAddress, RadioTelegram};
use esp3gate_link::Transmitter;
use tracing::info;

use super::DEFAULT_SETUP_TIMEOUT;
use crate::bus::{Bus, Subscription};
use crate::config::GatewayConfig;
use crate::error::{ConfigError, LifecycleError, ServiceError};
use crate::lifecycle::{Lifecycle, Service, ServiceState};
use crate::names::NameTable;
use crate::router::DeviceRouter;
use crate::sync::{lock, read, write};

/// What the device router is built from.
#[derive(Debug, Clone)]
pub struct DeviceSetup {
    pub registry: DeviceRegistry,
    /// Sender ID for outgoing telegrams.
    pub local: DeviceAddress,
    /// `(address, type)` pairs in registration order.
    pub devices: Vec<(DeviceAddress, String)>,
    pub names: NameTable,
}

impl DeviceSetup {
    pub fn from_config(config: &GatewayConfig, registry: DeviceRegistry) -> Result<Self, ConfigError> {
        Ok(Self {
            registry,
            local: config.sender_id,
            devices: config
                .device_entries()
                .map(|(address, device_type)| (address, device_type.to_string()))
                .collect(),
            names: config.name_table()?,
        })
    }
}

/// Builds the device router once the radio runs, feeds it from the packet
/// bus and publishes device parameter changes on the parameter bus.
pub struct DeviceService {
    lifecycle: Arc<Lifecycle>,
    upstream: Arc<Lifecycle>,
    setup_timeout: Duration,
    setup: DeviceSetup,
    transmitter: Arc<dyn Transmitter>,
    packets: Arc<Bus<RadioTelegram>>,
    parameters: Arc<Bus<ParameterChange>>,
    router: RwLock<Option<Arc<DeviceRouter>>>,
    subscription: Mutex<Option<Subscription<RadioTelegram>>>,
}

impl DeviceService {
    pub const NAME: &'static str = "devices";

    /// `upstream` is the radio lifecycle; setup waits for it to run.
    pub fn new(
        setup: DeviceSetup,
        upstream: Arc<Lifecycle>,
        transmitter: Arc<dyn Transmitter>,
        packets: Arc<Bus<RadioTelegram>>,
        parameters: Arc<Bus<ParameterChange>>,
    ) -> Self {
        Self {
            lifecycle: Arc::new(Lifecycle::new(Self::NAME)),
            upstream,
            setup_timeout: DEFAULT_SETUP_TIMEOUT,
            setup,
            transmitter,
            packets,
            parameters,
            router: RwLock::new(None),
            subscription: Mutex::new(None),
        }
    }

    pub fn with_setup_timeout(mut self, setup_timeout: Duration) -> Self {
        self.setup_timeout = setup_timeout;
        self
    }

    pub fn lifecycle_handle(&self) -> Arc<Lifecycle> {
        Arc::clone(&self.lifecycle)
    }

    /// The router, available while the service runs.
    pub fn router(&self) -> Result<Arc<DeviceRouter>, LifecycleError> {
        self.lifecycle.ensure_running()?;
        read(&self.router)
            .clone()
            .ok_or(LifecycleError::NotRunning {
                service: Self::NAME,
                state: self.lifecycle.state(),
            })
    }

    fn set_up(&self) -> Result<(), ServiceError> {
        self.upstream.await_running(self.setup_timeout)?;

        let router = Arc::new(DeviceRouter::build(
            &self.setup.registry,
            self.setup.local,
            Arc::clone(&self.transmitter),
            self.setup
                .devices
                .iter()
                .map(|(address, device_type)| (*address, device_type.as_str())),
            self.setup.names.clone(),
        )?);

        let parameters = Arc::clone(&self.parameters);
        router.add_listener(Arc::new(move |change: &ParameterChange| {
            parameters.publish(change.clone());
        }));

        let dispatcher = Arc::clone(&router);
        let subscription = self
            .packets
            .subscribe_fn("device-router", move |telegram: &RadioTelegram| {
                dispatcher.dispatch(telegram);
                Ok(())
            })?;

        info!(
            devices = router.len(),
            names = router.names().len(),
            "device router ready"
        );
        *write(&self.router) = Some(router);
        *lock(&self.subscription) = Some(subscription);
        Ok(())
    }
}

impl Service for DeviceService {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn start(&self) -> Result<(), ServiceError> {
        self.lifecycle.transition(ServiceState::Starting)?;
        if let Err(err) = self.set_up() {
            self.lifecycle.fail(&err);
            return Err(err);
        }
        self.lifecycle.transition(ServiceState::Running)?;
        Ok(())
    }

    fn stop(&self) -> Result<(), ServiceError> {
        match self.lifecycle.state() {
            ServiceState::Idle => return Ok(self.lifecycle.transition(ServiceState::Terminated)?),
            ServiceState::Terminated | ServiceState::Stopping => return Ok(()),
            _ => {}
        }
        let stopping = self.lifecycle.transition(ServiceState::Stopping).is_ok();

        if let Some(subscription) = lock(&self.subscription).take() {
            subscription.unsubscribe();
        }
        self.parameters.complete();
        write(&self.router).take();

        if stopping {
            self.lifecycle.transition(ServiceState::Terminated)?;
        }
        info!("devices stopped");
        Ok(())
    }
}
