use std::sync::Arc;
use std::time::Duration;

use esp3gate_device::{DeviceRegistry, ParameterChange};
use esp3gate_frame::RadioTelegram;
use esp3gate_link::Connector;

use crate::bus::Bus;
use crate::config::GatewayConfig;
use crate::error::{LifecycleError, ServiceError};
use crate::lifecycle::{ServiceManager, ShutdownHandle};
use crate::router::DeviceRouter;
use crate::rules::RuleEngine;
use crate::service::{DeviceService, DeviceSetup, RadioService, RulesService};

/// How often a running gateway checks its services for failure.
const HEALTH_POLL: Duration = Duration::from_secs(1);

/// The assembled pipeline: buses, services and their manager.
pub struct Gateway {
    packets: Arc<Bus<RadioTelegram>>,
    parameters: Arc<Bus<ParameterChange>>,
    radio: Arc<RadioService>,
    devices: Arc<DeviceService>,
    rules: Arc<RulesService>,
    manager: ServiceManager,
}

impl Gateway {
    /// Wire the services for `config`. Nothing starts until [`Gateway::start`].
    pub fn new(
        config: &GatewayConfig,
        registry: DeviceRegistry,
        connector: Arc<Connector>,
        engine: Arc<dyn RuleEngine>,
    ) -> Result<Self, ServiceError> {
        let timeouts = config.timeouts;
        let packets = Arc::new(Bus::new("packets")?);
        let parameters = Arc::new(Bus::new("parameters")?);

        let radio = Arc::new(
            RadioService::new(&config.device, Arc::clone(&connector), Arc::clone(&packets))
                .with_read_timeout(timeouts.read()),
        );
        let devices = Arc::new(
            DeviceService::new(
                DeviceSetup::from_config(config, registry)?,
                radio.lifecycle_handle(),
                connector,
                Arc::clone(&packets),
                Arc::clone(&parameters),
            )
            .with_setup_timeout(timeouts.setup()),
        );
        let rules = Arc::new(
            RulesService::new(Arc::clone(&devices), engine, Arc::clone(&parameters))
                .with_setup_timeout(timeouts.setup()),
        );

        let mut manager = ServiceManager::new(timeouts.setup());
        manager
            .add(radio.clone())
            .add(devices.clone())
            .add(rules.clone());

        Ok(Self {
            packets,
            parameters,
            radio,
            devices,
            rules,
            manager,
        })
    }

    pub fn start(&self) -> Result<(), ServiceError> {
        self.manager.start_all()
    }

    pub fn stop(&self) {
        self.manager.stop_all();
    }

    /// Block until shutdown is requested or a service fails, then stop.
    ///
    /// Returns the services that failed; empty after a clean shutdown.
    pub fn run_until_shutdown(&self) -> Vec<&'static str> {
        self.manager.await_stopped(HEALTH_POLL)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.manager.shutdown_handle()
    }

    pub fn manager(&self) -> &ServiceManager {
        &self.manager
    }

    pub fn packets(&self) -> &Arc<Bus<RadioTelegram>> {
        &self.packets
    }

    pub fn parameters(&self) -> &Arc<Bus<ParameterChange>> {
        &self.parameters
    }

    pub fn radio(&self) -> &Arc<RadioService> {
        &self.radio
    }

    pub fn router(&self) -> Result<Arc<DeviceRouter>, LifecycleError> {
        self.devices.router()
    }

    pub fn rules(&self) -> &Arc<RulesService> {
        &self.rules
    }
}
