//! Service state machines and ordered startup.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{LifecycleError, ServiceError};
use crate::sync::{lock, wait, wait_timeout};

/// Lifecycle state of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Idle,
    Starting,
    Running,
    Stopping,
    Terminated,
    /// Unrecoverable error while starting or running.
    Failed,
}

impl ServiceState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated | Self::Failed)
    }

    fn can_become(self, next: Self) -> bool {
        use ServiceState::*;
        matches!(
            (self, next),
            (Idle, Starting)
                | (Idle, Terminated)
                | (Starting, Running)
                | (Starting, Stopping)
                | (Starting, Failed)
                | (Running, Stopping)
                | (Running, Failed)
                | (Stopping, Terminated)
        )
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Terminated => "terminated",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Observable state cell of one service.
pub struct Lifecycle {
    service: &'static str,
    state: Mutex<ServiceState>,
    changed: Condvar,
}

impl Lifecycle {
    pub fn new(service: &'static str) -> Self {
        Self {
            service,
            state: Mutex::new(ServiceState::Idle),
            changed: Condvar::new(),
        }
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn state(&self) -> ServiceState {
        *self.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ServiceState::Running
    }

    /// Move to `next` if the state machine allows it.
    pub fn transition(&self, next: ServiceState) -> Result<(), LifecycleError> {
        let mut state = self.lock();
        if !state.can_become(next) {
            return Err(LifecycleError::InvalidTransition {
                service: self.service,
                from: *state,
                to: next,
            });
        }
        debug!(service = self.service, from = %*state, to = %next, "state change");
        *state = next;
        self.changed.notify_all();
        Ok(())
    }

    /// Mark the service failed. No-op outside Starting and Running.
    pub fn fail(&self, reason: &dyn fmt::Display) {
        if self.transition(ServiceState::Failed).is_ok() {
            error!(service = self.service, %reason, "service failed");
        }
    }

    pub fn ensure_running(&self) -> Result<(), LifecycleError> {
        match self.state() {
            ServiceState::Running => Ok(()),
            state => Err(LifecycleError::NotRunning {
                service: self.service,
                state,
            }),
        }
    }

    /// Block until Running. Fails on timeout, or as soon as the service
    /// can no longer get there.
    pub fn await_running(&self, timeout: Duration) -> Result<(), LifecycleError> {
        let state = self.wait_for(timeout, |state| {
            !matches!(state, ServiceState::Idle | ServiceState::Starting)
        });
        match state {
            ServiceState::Running => Ok(()),
            ServiceState::Idle | ServiceState::Starting => Err(LifecycleError::Timeout {
                service: self.service,
                expected: ServiceState::Running,
                timeout,
            }),
            state => Err(LifecycleError::NotRunning {
                service: self.service,
                state,
            }),
        }
    }

    /// Block until Terminated or Failed; returns the final state.
    pub fn await_terminated(&self, timeout: Duration) -> Result<ServiceState, LifecycleError> {
        let state = self.wait_for(timeout, ServiceState::is_terminal);
        if state.is_terminal() {
            Ok(state)
        } else {
            Err(LifecycleError::Timeout {
                service: self.service,
                expected: ServiceState::Terminated,
                timeout,
            })
        }
    }

    fn wait_for(&self, timeout: Duration, done: impl Fn(ServiceState) -> bool) -> ServiceState {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while !done(*state) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            state = wait_timeout(&self.changed, state, deadline - now);
        }
        *state
    }

    fn lock(&self) -> MutexGuard<'_, ServiceState> {
        lock(&self.state)
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("service", &self.service)
            .field("state", &self.state())
            .finish()
    }
}

/// A managed component of the gateway.
pub trait Service: Send + Sync {
    fn name(&self) -> &'static str;

    fn lifecycle(&self) -> &Lifecycle;

    /// Bring the service up. Returns once it is Running or has failed.
    fn start(&self) -> Result<(), ServiceError>;

    /// Shut the service down. Safe to call in any state.
    fn stop(&self) -> Result<(), ServiceError>;
}

/// Shutdown request flag shared with signal handlers.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ShutdownHandle {
    pub fn request(&self) {
        let (requested, signal) = &*self.inner;
        *lock(requested) = true;
        signal.notify_all();
    }

    pub fn is_requested(&self) -> bool {
        *lock(&self.inner.0)
    }

    /// Block until a shutdown is requested or `timeout` elapses.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let (requested, signal) = &*self.inner;
        let mut guard = lock(requested);
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        while !*guard {
            guard = match deadline {
                None => wait(signal, guard),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    wait_timeout(signal, guard, deadline - now)
                }
            };
        }
        true
    }
}

/// Starts services in order and stops them in reverse.
pub struct ServiceManager {
    services: Vec<Arc<dyn Service>>,
    start_timeout: Duration,
    started: Mutex<usize>,
    shutdown: ShutdownHandle,
}

impl ServiceManager {
    pub fn new(start_timeout: Duration) -> Self {
        Self {
            services: Vec::new(),
            start_timeout,
            started: Mutex::new(0),
            shutdown: ShutdownHandle::default(),
        }
    }

    /// Append a service; start order is insertion order.
    pub fn add(&mut self, service: Arc<dyn Service>) -> &mut Self {
        self.services.push(service);
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// `(name, state)` of every service in start order.
    pub fn states(&self) -> Vec<(&'static str, ServiceState)> {
        self.services
            .iter()
            .map(|service| (service.name(), service.lifecycle().state()))
            .collect()
    }

    /// Start every service. Each must be Running before the next starts; on
    /// failure the ones already started are stopped again.
    pub fn start_all(&self) -> Result<(), ServiceError> {
        for (index, service) in self.services.iter().enumerate() {
            info!(service = service.name(), "starting");
            let started = service
                .start()
                .and_then(|()| Ok(service.lifecycle().await_running(self.start_timeout)?));
            if let Err(err) = started {
                error!(service = service.name(), error = %err, "start failed");
                *self.lock_started() = index + 1;
                self.stop_all();
                return Err(err);
            }
            *self.lock_started() = index + 1;
        }
        info!(services = self.services.len(), "all services running");
        Ok(())
    }

    /// Stop started services in reverse order. Idempotent.
    pub fn stop_all(&self) {
        let started = std::mem::take(&mut *self.lock_started());
        for service in self.services[..started].iter().rev() {
            info!(service = service.name(), "stopping");
            if let Err(err) = service.stop() {
                warn!(service = service.name(), error = %err, "stop failed");
            }
        }
    }

    /// Names of the services currently in `Failed`, in start order.
    pub fn failed(&self) -> Vec<&'static str> {
        self.states()
            .into_iter()
            .filter(|(_, state)| *state == ServiceState::Failed)
            .map(|(name, _)| name)
            .collect()
    }

    /// Block until a shutdown is requested or a service fails on its own,
    /// checking every `poll`, then stop everything.
    ///
    /// Returns the failed services; empty after a requested shutdown.
    pub fn await_stopped(&self, poll: Duration) -> Vec<&'static str> {
        let failed = loop {
            if self.shutdown.wait(Some(poll)) {
                info!("shutdown requested");
                break Vec::new();
            }
            let failed = self.failed();
            if !failed.is_empty() {
                error!(services = ?failed, "service failed, shutting down");
                break failed;
            }
        };
        self.stop_all();
        failed
    }

    fn lock_started(&self) -> MutexGuard<'_, usize> {
        lock(&self.started)
    }
}

impl fmt::Debug for ServiceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceManager")
            .field("services", &self.states())
            .finish()
    }
}
