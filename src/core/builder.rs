use std::sync::Arc;

use super::{config::Config, manager::LifecycleManager};
use crate::{
    error::WorkerError,
    events::Bus,
    providers::ExecutionProvider,
    subscribers::{Subscribe, SubscriberSet},
    workers::{ThreadWorkerFactory, WorkerFactory},
};

/// Builder for constructing a [`LifecycleManager`] with optional features.
pub struct ManagerBuilder {
    provider: Arc<dyn ExecutionProvider>,
    cfg: Config,
    bus: Option<Bus>,
    factory: Option<Arc<dyn WorkerFactory>>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl ManagerBuilder {
    /// Creates a new builder over `provider` with the default configuration.
    pub fn new(provider: Arc<dyn ExecutionProvider>) -> Self {
        Self {
            provider,
            cfg: Config::default(),
            bus: None,
            factory: None,
            subscribers: Vec::new(),
        }
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, cfg: Config) -> Self {
        self.cfg = cfg;
        self
    }

    /// Uses an existing bus instead of creating one.
    ///
    /// Pass the same bus to providers so their pool events reach the
    /// manager's subscribers.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Sets the factory handed out by [`LifecycleManager::worker_factory`].
    ///
    /// Defaults to a [`ThreadWorkerFactory`] prefixed with
    /// [`Config::thread_name_prefix`].
    pub fn with_worker_factory(mut self, factory: Arc<dyn WorkerFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (handles, pools, workers) through
    /// dedicated worker threads with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds and returns the manager.
    ///
    /// This consumes the builder and initializes:
    /// - the event bus (unless one was supplied)
    /// - the worker factory
    /// - one worker thread per subscriber, attached to the bus
    ///
    /// Fails if a subscriber thread cannot be spawned.
    pub fn build(self) -> Result<Arc<LifecycleManager>, WorkerError> {
        let bus = self
            .bus
            .unwrap_or_else(|| Bus::new(self.cfg.bus_capacity_clamped()));

        let factory = self.factory.unwrap_or_else(|| {
            let mut f = ThreadWorkerFactory::new();
            if !self.cfg.thread_name_prefix.is_empty() {
                f = f.with_prefix(self.cfg.thread_name_prefix.as_str());
            }
            Arc::new(f) as Arc<dyn WorkerFactory>
        });

        let subs = if self.subscribers.is_empty() {
            None
        } else {
            let set = Arc::new(SubscriberSet::new(
                self.subscribers,
                bus.clone(),
                factory.as_ref(),
            )?);
            if bus.attach(&set) {
                Some(set)
            } else {
                tracing::warn!("bus already feeds a subscriber set; ignoring these subscribers");
                None
            }
        };

        Ok(Arc::new(LifecycleManager::new_internal(
            self.provider,
            factory,
            bus,
            self.cfg,
            subs,
        )))
    }
}
