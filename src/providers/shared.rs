//! # One pool for everyone.
//!
//! [`SharedPoolProvider`] models a process-wide pool. The pool is started lazily
//! on the first acquisition, counted per acquisition, and shut down when the
//! last one is released. A later acquisition starts a fresh pool.
//!
//! ```text
//! executor(a) ──► start pool P1, users {a:1}
//! executor(b) ──► P1, users {a:1, b:1}
//! release(a, P1) ──► users {b:1}
//! release(b, P1) ──► users {} ──► terminate(P1)
//! executor(c) ──► start pool P2, users {c:1}
//! ```

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

#[derive(Default)]
struct SharedState {
    pool: Option<ExecutorRef>,
    /// Live acquisitions per instance.
    users: HashMap<InstanceId, usize>,
    closed: bool,
}

/// Provider sharing one reference-counted pool across all instances.
pub struct SharedPoolProvider {
    cfg: Config,
    factory: Arc<dyn WorkerFactory>,
    bus: Bus,
    state: Mutex<SharedState>,
}

impl SharedPoolProvider {
    /// Creates a provider whose pool follows `cfg`.
    pub fn new(cfg: Config) -> Self {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        Self {
            cfg,
            factory: Arc::new(ThreadWorkerFactory::new()),
            bus,
            state: Mutex::new(SharedState::default()),
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

    /// Number of live acquisitions.
    pub fn users(&self) -> usize {
        lock(&self.state).users.values().sum()
    }

    /// Returns true while a pool is running.
    pub fn is_running(&self) -> bool {
        lock(&self.state).pool.is_some()
    }

    /// Shuts the pool down regardless of live users and refuses further requests.
    pub fn close(&self) {
        let pool = {
            let mut st = lock(&self.state);
            if st.closed {
                return;
            }
            st.closed = true;
            st.users.clear();
            st.pool.take()
        };
        if let Some(pool) = pool {
            terminate(&pool, None, &self.cfg, &self.bus);
        }
    }
}

impl ExecutionProvider for SharedPoolProvider {
    fn executor(&self, instance: InstanceId) -> Result<ExecutorRef, ProviderError> {
        let mut st = lock(&self.state);
        if st.closed {
            return Err(ProviderError::ShutDown);
        }

        let pool = match st.pool.clone() {
            Some(pool) => pool,
            None => {
                let name = self.cfg.thread_name("shared");
                let pool: ExecutorRef = Arc::new(ThreadPool::with_config(
                    name.as_str(),
                    &self.cfg,
                    self.factory.as_ref(),
                )?);
                self.bus.publish(
                    Event::new(EventKind::PoolStarted)
                        .with_name(name)
                        .with_instance(instance)
                        .with_count(self.cfg.resolved_pool_size()),
                );
                st.pool = Some(Arc::clone(&pool));
                pool
            }
        };

        *st.users.entry(instance).or_insert(0) += 1;
        Ok(pool)
    }

    fn release_executor(
        &self,
        instance: InstanceId,
        executor: ExecutorRef,
    ) -> Result<(), ProviderError> {
        let last = {
            let mut st = lock(&self.state);
            if st.closed {
                return Err(ProviderError::ShutDown);
            }
            let current = st.pool.as_ref().is_some_and(|p| same_executor(p, &executor));
            let Some(count) = st.users.get_mut(&instance).filter(|_| current) else {
                return Err(ProviderError::UnknownExecutor { instance });
            };

            *count -= 1;
            if *count == 0 {
                st.users.remove(&instance);
            }
            if st.users.is_empty() { st.pool.take() } else { None }
        };

        if let Some(pool) = last {
            terminate(&pool, Some(instance), &self.cfg, &self.bus);
        }
        Ok(())
    }
}

impl fmt::Debug for SharedPoolProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = lock(&self.state);
        f.debug_struct("SharedPoolProvider")
            .field("running", &st.pool.is_some())
            .field("users", &st.users.values().sum::<usize>())
            .field("closed", &st.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn provider() -> SharedPoolProvider {
        SharedPoolProvider::new(Config {
            pool_size: 2,
            grace: Duration::from_secs(5),
            ..Config::default()
        })
    }

    #[test]
    fn test_pool_is_shared_and_refcounted() {
        let p = provider();
        let a = InstanceId::new();
        let b = InstanceId::new();

        let pa = p.executor(a).unwrap();
        let pb = p.executor(b).unwrap();
        assert!(same_executor(&pa, &pb));
        assert_eq!(p.users(), 2);

        p.release_executor(a, pa).unwrap();
        assert!(p.is_running());
        assert!(!pb.is_shutdown());

        p.release_executor(b, Arc::clone(&pb)).unwrap();
        assert!(!p.is_running());
        assert!(pb.is_shutdown());
    }

    #[test]
    fn test_pool_restarts_after_last_release() {
        let p = provider();
        let a = InstanceId::new();
        let first = p.executor(a).unwrap();
        p.release_executor(a, Arc::clone(&first)).unwrap();

        let b = InstanceId::new();
        let second = p.executor(b).unwrap();
        assert!(!same_executor(&first, &second));
        assert!(!second.is_shutdown());

        // a stale resource from the previous generation is not accepted
        let err = p.release_executor(b, first).unwrap_err();
        assert!(matches!(err, ProviderError::UnknownExecutor { .. }));
        p.release_executor(b, second).unwrap();
    }

    #[test]
    fn test_release_for_unknown_instance() {
        let p = provider();
        let pool = p.executor(InstanceId::new()).unwrap();
        let stranger = InstanceId::new();
        assert!(matches!(
            p.release_executor(stranger, pool),
            Err(ProviderError::UnknownExecutor { instance }) if instance == stranger
        ));
        assert_eq!(p.users(), 1);
        p.close();
        assert!(!p.is_running());
    }

    #[test]
    fn test_same_instance_acquiring_twice_needs_two_releases() {
        let p = provider();
        let id = InstanceId::new();
        let one = p.executor(id).unwrap();
        let two = p.executor(id).unwrap();

        p.release_executor(id, one).unwrap();
        assert!(p.is_running());
        p.release_executor(id, two).unwrap();
        assert!(!p.is_running());
    }
}
