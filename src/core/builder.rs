use std::sync::Arc;

use crate::core::config::SupervisorConfig;
use crate::deployment::Deployment;
use crate::events::Bus;
use crate::subscribers::{Subscribe, SubscriberSet};

use super::supervisor::Supervisor;

/// Builder for a [`Supervisor`].
pub struct SupervisorBuilder {
    cfg: SupervisorConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl SupervisorBuilder {
    /// Creates a builder with the given configuration and no subscribers.
    pub fn new(cfg: SupervisorConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers.
    ///
    /// Each subscriber gets its own worker and bounded queue; a slow or
    /// panicking subscriber never delays the monitors.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the supervisor for `deployment`.
    ///
    /// Spawns the event listener, so it must be called inside a Tokio runtime.
    /// No service is started until [`Supervisor::start`] or [`Supervisor::run`].
    pub fn build(self, deployment: Deployment) -> Arc<Supervisor> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = SubscriberSet::new(self.subscribers);
        Arc::new(Supervisor::new_internal(self.cfg, deployment, bus, subs))
    }
}
