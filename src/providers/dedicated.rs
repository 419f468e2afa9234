//! # One pool per instance.
//!
//! [`DedicatedPoolProvider`] starts a [`ThreadPool`] the first time an instance
//! asks for one and shuts it down when that instance releases its last
//! acquisition. Repeated `executor` calls for the same instance return the same
//! pool and are counted.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use super::{ExecutionProvider, terminate};
use crate::core::Config;
use crate::error::ProviderError;
use crate::events::{Bus, Event, EventKind};
use crate::executor::{ExecutorRef, ThreadPool, same_executor};
use crate::instance::InstanceId;
use crate::sync::lock;
use crate::workers::{ThreadWorkerFactory, WorkerFactory};

struct Dedicated {
    pool: ExecutorRef,
    /// Live acquisitions by the owning instance.
    users: usize,
}

#[derive(Default)]
struct DedicatedState {
    pools: HashMap<InstanceId, Dedicated>,
    closed: bool,
}

/// Provider giving every instance its own pool.
pub struct DedicatedPoolProvider {
    cfg: Config,
    factory: Arc<dyn WorkerFactory>,
    bus: Bus,
    state: Mutex<DedicatedState>,
}

impl DedicatedPoolProvider {
    /// Creates a provider whose pools follow `cfg`.
    pub fn new(cfg: Config) -> Self {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        Self {
            cfg,
            factory: Arc::new(ThreadWorkerFactory::new()),
            bus,
            state: Mutex::new(DedicatedState::default()),
        }
    }

    /// Creates pool threads through `factory`.
    pub fn with_worker_factory(mut self, factory: Arc<dyn WorkerFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Publishes pool events on `bus`.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = bus;
        self
    }

    /// Number of pools currently alive.
    pub fn live(&self) -> usize {
        lock(&self.state).pools.len()
    }

    /// Shuts every pool down regardless of live users and refuses further requests.
    pub fn close(&self) {
        let pools: Vec<_> = {
            let mut st = lock(&self.state);
            if st.closed {
                return;
            }
            st.closed = true;
            st.pools.drain().collect()
        };
        for (instance, entry) in pools {
            terminate(&entry.pool, Some(instance), &self.cfg, &self.bus);
        }
    }

    fn start_pool(&self, instance: InstanceId) -> Result<ExecutorRef, ProviderError> {
        let name = self.cfg.thread_name(&format!("instance-{}", instance.as_u64()));
        let pool = ThreadPool::with_config(name.as_str(), &self.cfg, self.factory.as_ref())?;
        self.bus.publish(
            Event::new(EventKind::PoolStarted)
                .with_name(name)
                .with_instance(instance)
                .with_count(pool.size()),
        );
        Ok(Arc::new(pool))
    }
}

impl ExecutionProvider for DedicatedPoolProvider {
    fn executor(&self, instance: InstanceId) -> Result<ExecutorRef, ProviderError> {
        let mut st = lock(&self.state);
        if st.closed {
            return Err(ProviderError::ShutDown);
        }
        if let Some(entry) = st.pools.get_mut(&instance) {
            entry.users += 1;
            return Ok(Arc::clone(&entry.pool));
        }
        let pool = self.start_pool(instance)?;
        st.pools.insert(
            instance,
            Dedicated {
                pool: Arc::clone(&pool),
                users: 1,
            },
        );
        Ok(pool)
    }

    fn release_executor(
        &self,
        instance: InstanceId,
        executor: ExecutorRef,
    ) -> Result<(), ProviderError> {
        let pool = {
            let mut st = lock(&self.state);
            if st.closed {
                return Err(ProviderError::ShutDown);
            }
            let Some(entry) = st
                .pools
                .get_mut(&instance)
                .filter(|e| same_executor(&e.pool, &executor))
            else {
                return Err(ProviderError::UnknownExecutor { instance });
            };
            entry.users -= 1;
            if entry.users > 0 {
                return Ok(());
            }
            st.pools.remove(&instance).map(|e| e.pool)
        };
        if let Some(pool) = pool {
            terminate(&pool, Some(instance), &self.cfg, &self.bus);
        }
        Ok(())
    }
}

impl fmt::Debug for DedicatedPoolProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = lock(&self.state);
        f.debug_struct("DedicatedPoolProvider")
            .field("live", &st.pools.len())
            .field("closed", &st.closed)
            .finish()
    }
}
