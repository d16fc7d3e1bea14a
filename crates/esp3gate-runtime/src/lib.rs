//! The gateway runtime.
//!
//! Radio telegrams read by the [`RadioService`] are published on the packet
//! [`Bus`]; the [`DeviceService`] dispatches them through the
//! [`DeviceRouter`] to device instances, whose parameter changes are
//! published on the parameter bus; the [`RulesService`] feeds those changes
//! to a [`RuleEngine`], which may write parameters back through the router.
//! Services are started and stopped in order by the [`ServiceManager`].

pub mod bus;
pub mod config;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod names;
pub mod router;
pub mod rules;
pub mod service;
mod sync;

pub use bus::{Bus, Subscriber, SubscriberError, Subscription, DEFAULT_DELIVERY_THREADS};
pub use config::{GatewayConfig, Timeouts};
pub use error::{BusError, ConfigError, LifecycleError, RouterError, RuleError, ServiceError};
pub use gateway::Gateway;
pub use lifecycle::{Lifecycle, Service, ServiceManager, ServiceState, ShutdownHandle};
pub use names::{NameTable, UNKNOWN_NAME};
pub use router::DeviceRouter;
pub use rules::{CommandSink, ParameterFact, RuleEngine, RuleSet};
pub use service::{DeviceService, DeviceSetup, RadioService, RulesService};
