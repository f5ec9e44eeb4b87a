use std::sync::Arc;

use super::supervisor::Supervisor;
use crate::{
    bus::MessageBus,
    config::Config,
    dispatch::{Dispatcher, Sink},
    events::Bus,
    subscribers::Subscribe,
};

/// Builder for constructing a [`Supervisor`].
pub struct SupervisorBuilder {
    cfg: Config,
    bus: Arc<dyn MessageBus>,
    sink: Arc<dyn Sink>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl SupervisorBuilder {
    /// Creates a new builder over the message bus and notification sink.
    pub fn new(cfg: Config, bus: Arc<dyn MessageBus>, sink: Arc<dyn Sink>) -> Self {
        Self {
            cfg,
            bus,
            sink,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers.
    ///
    /// Subscribers receive runtime events (provisioning, message flow, failures)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the supervisor. Nothing is spawned until it runs.
    pub fn build(self) -> Supervisor {
        let events = Bus::new(self.cfg.bus_capacity_clamped());
        Supervisor::new_internal(
            self.cfg,
            self.bus,
            Dispatcher::new(self.sink),
            events,
            self.subscribers,
        )
    }
}
