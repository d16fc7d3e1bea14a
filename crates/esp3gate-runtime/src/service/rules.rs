use std::sync::{Arc, Mutex};
use std::time::Duration;

use esp3gate_device::ParameterChange;
use tracing::info;

use super::DEFAULT_SETUP_TIMEOUT;
use crate::bus::{Bus, Subscriber, SubscriberError, Subscription};
use crate::error::ServiceError;
use crate::lifecycle::{Lifecycle, Service, ServiceState};
use crate::router::DeviceRouter;
use crate::rules::{ParameterFact, RuleEngine};
use crate::service::DeviceService;
use crate::sync::lock;

/// Feeds parameter changes, with the device's logical name attached, to a
/// rule engine that writes back through the router.
pub struct RulesService {
    lifecycle: Lifecycle,
    devices: Arc<DeviceService>,
    engine: Arc<dyn RuleEngine>,
    parameters: Arc<Bus<ParameterChange>>,
    setup_timeout: Duration,
    subscription: Mutex<Option<Subscription<ParameterChange>>>,
}

struct RuleFeeder {
    router: Arc<DeviceRouter>,
    engine: Arc<dyn RuleEngine>,
}

impl Subscriber<ParameterChange> for RuleFeeder {
    fn on_event(&self, change: &ParameterChange) -> Result<(), SubscriberError> {
        let fact = ParameterFact {
            name: self.router.names().name_for(change.source.address).to_string(),
            change: change.clone(),
        };
        self.engine.evaluate(&fact, self.router.as_ref())?;
        Ok(())
    }
}

impl RulesService {
    pub const NAME: &'static str = "rules";

    pub fn new(
        devices: Arc<DeviceService>,
        engine: Arc<dyn RuleEngine>,
        parameters: Arc<Bus<ParameterChange>>,
    ) -> Self {
        Self {
            lifecycle: Lifecycle::new(Self::NAME),
            devices,
            engine,
            parameters,
            setup_timeout: DEFAULT_SETUP_TIMEOUT,
            subscription: Mutex::new(None),
        }
    }

    pub fn with_setup_timeout(mut self, setup_timeout: Duration) -> Self {
        self.setup_timeout = setup_timeout;
        self
    }

    /// Failures of the engine since start.
    pub fn restarts(&self) -> u64 {
        lock(&self.subscription)
            .as_ref()
            .map_or(0, Subscription::restarts)
    }

    fn set_up(&self) -> Result<(), ServiceError> {
        self.devices.lifecycle().await_running(self.setup_timeout)?;
        let router = self.devices.router()?;
        let subscription = self.parameters.subscribe(
            "rule-engine",
            RuleFeeder {
                router,
                engine: Arc::clone(&self.engine),
            },
        )?;
        *lock(&self.subscription) = Some(subscription);
        Ok(())
    }
}

impl Service for RulesService {
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
        info!("rules running");
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
        if stopping {
            self.lifecycle.transition(ServiceState::Terminated)?;
        }
        info!("rules stopped");
        Ok(())
    }
}
