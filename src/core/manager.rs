//! # LifecycleManager: hands out and takes back execution resources.
//!
//! The [`LifecycleManager`] sits between application instances and an
//! [`ExecutionProvider`]. It keeps no per-instance state: every call goes to the
//! provider, and the only record of which raw resource belongs to which
//! acquisition is the [`ExecutorHandle`] itself.
//!
//! ## Flow
//! ```text
//! acquire_handle(instance)
//!   └─► provider.executor(instance) ──► raw
//!         ├─ Err(e) ──► publish(AcquireFailed) ──► Err(ManagerError::Provider(e))
//!         └─ Ok(raw) ─► HandleState(Created) + ListeningExecutor(raw)
//!                        └─► activate() ──► publish(HandleAcquired) ──► ExecutorHandle
//!
//! release_handle(instance, handle)
//!   ├─ handle.manager != self.id   ──► publish(ReleaseFailed) ──► Err(ForeignHandle)
//!   ├─ handle.instance != instance ──► publish(ReleaseFailed) ──► Err(InstanceMismatch)
//!   └─ mark Released ──► provider.release_executor(instance, raw)
//!         ├─ Ok  ──► publish(HandleReleased)
//!         └─ Err ──► publish(ReleaseFailed) ──► Err(ManagerError::Provider(e))
//! ```
//!
//! Preconditions are checked before the provider is touched. A handle whose
//! release fails a precondition is still consumed; its resource stays with the
//! provider until that provider shuts it down.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use poolvisor::{Config, InstanceId, LifecycleManager, SharedPoolProvider};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = Config { pool_size: 2, ..Config::default() };
//! let provider = Arc::new(SharedPoolProvider::new(cfg.clone()));
//! let manager = LifecycleManager::builder(provider).with_config(cfg).build()?;
//!
//! let instance = InstanceId::new();
//! let handle = manager.acquire_handle(instance)?;
//! let fut = handle.executor().submit(|| Ok(6 * 7))?;
//! assert_eq!(fut.wait(), Ok(42));
//!
//! manager.release_handle(instance, handle)?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use super::builder::ManagerBuilder;
use super::config::Config;
use super::handle::{ExecutorHandle, HandleState, ManagerId};
use crate::error::ManagerError;
use crate::events::{Bus, Event, EventKind};
use crate::executor::ListeningExecutor;
use crate::instance::InstanceId;
use crate::providers::ExecutionProvider;
use crate::subscribers::SubscriberSet;
use crate::workers::WorkerFactory;

/// Issues [`ExecutorHandle`]s backed by an [`ExecutionProvider`].
///
/// Safe to share across threads and to call concurrently for any number of
/// instances.
pub struct LifecycleManager {
    id: ManagerId,
    provider: Arc<dyn ExecutionProvider>,
    factory: Arc<dyn WorkerFactory>,
    bus: Bus,
    cfg: Config,
    /// Owns the fan-out; the bus only holds it weakly.
    subs: Option<Arc<SubscriberSet>>,
}

impl LifecycleManager {
    /// Starts building a manager over `provider`.
    pub fn builder(provider: Arc<dyn ExecutionProvider>) -> ManagerBuilder {
        ManagerBuilder::new(provider)
    }

    pub(super) fn new_internal(
        provider: Arc<dyn ExecutionProvider>,
        factory: Arc<dyn WorkerFactory>,
        bus: Bus,
        cfg: Config,
        subs: Option<Arc<SubscriberSet>>,
    ) -> Self {
        Self {
            id: ManagerId::next(),
            provider,
            factory,
            bus,
            cfg,
            subs,
        }
    }

    /// Obtains a fresh handle for `instance`.
    ///
    /// The provider may hand the same raw resource to many instances; each call
    /// still produces a distinct handle. Provider errors are returned unchanged
    /// inside [`ManagerError::Provider`]; nothing is retried.
    pub fn acquire_handle(&self, instance: InstanceId) -> Result<ExecutorHandle, ManagerError> {
        let raw = match self.provider.executor(instance) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!(%instance, error = %e, "acquire failed");
                self.bus.publish(
                    Event::new(EventKind::AcquireFailed)
                        .with_instance(instance)
                        .with_reason(e.as_message()),
                );
                return Err(e.into());
            }
        };

        let state = Arc::new(HandleState::new(instance));
        let executor = ListeningExecutor::managed(
            Arc::clone(&raw),
            Arc::clone(&state),
            self.cfg.listener_dispatch,
            self.bus.clone(),
        );
        let handle = ExecutorHandle::new(raw, executor, Arc::clone(&state), self.id);
        state.activate();

        tracing::debug!(%instance, handle = %state.id(), executor = handle.raw().name(), "handle acquired");
        self.bus.publish(
            Event::new(EventKind::HandleAcquired)
                .with_instance(instance)
                .with_handle(state.id()),
        );
        Ok(handle)
    }

    /// Releases `handle`, returning its raw resource to the provider.
    ///
    /// `instance` must be the identity the handle was acquired for, and the
    /// handle must come from this manager; both are checked before the provider
    /// is consulted. After this call every clone of the handle's executor
    /// refuses submissions with [`SubmitError::Released`](crate::SubmitError::Released).
    pub fn release_handle(
        &self,
        instance: InstanceId,
        handle: ExecutorHandle,
    ) -> Result<(), ManagerError> {
        let handle_id = handle.id();

        if let Err(e) = self.check_release(instance, &handle) {
            tracing::warn!(%instance, handle = %handle_id, error = %e, "release refused");
            self.publish_release_failed(instance, handle_id, &e);
            return Err(e);
        }

        handle.mark_released();
        let raw = Arc::clone(handle.raw());
        drop(handle);

        match self.provider.release_executor(instance, raw) {
            Ok(()) => {
                tracing::debug!(%instance, handle = %handle_id, "handle released");
                self.bus.publish(
                    Event::new(EventKind::HandleReleased)
                        .with_instance(instance)
                        .with_handle(handle_id),
                );
                Ok(())
            }
            Err(e) => {
                let e = ManagerError::from(e);
                tracing::warn!(%instance, handle = %handle_id, error = %e, "provider release failed");
                self.publish_release_failed(instance, handle_id, &e);
                Err(e)
            }
        }
    }

    /// The worker factory configured at build time.
    pub fn worker_factory(&self) -> Arc<dyn WorkerFactory> {
        Arc::clone(&self.factory)
    }

    /// Event bus shared with providers and worker groups.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Configuration this manager was built with.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Identity of this manager.
    pub fn id(&self) -> ManagerId {
        self.id
    }

    fn check_release(
        &self,
        instance: InstanceId,
        handle: &ExecutorHandle,
    ) -> Result<(), ManagerError> {
        if handle.manager() != self.id {
            return Err(ManagerError::ForeignHandle {
                handle: handle.id(),
                expected: self.id,
                actual: handle.manager(),
            });
        }
        if handle.instance() != instance {
            return Err(ManagerError::InstanceMismatch {
                acquired: handle.instance(),
                released: instance,
            });
        }
        Ok(())
    }

    fn publish_release_failed(
        &self,
        instance: InstanceId,
        handle: crate::core::HandleId,
        err: &ManagerError,
    ) {
        self.bus.publish(
            Event::new(EventKind::ReleaseFailed)
                .with_instance(instance)
                .with_handle(handle)
                .with_reason(err.as_label()),
        );
    }
}

impl fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("id", &self.id)
            .field("cfg", &self.cfg)
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

impl Drop for LifecycleManager {
    /// Stops event fan-out and waits for subscribers to drain their queues.
    ///
    /// If a publisher holds the set at this moment, the subscriber threads
    /// are left to drain on their own.
    fn drop(&mut self) {
        if let Some(set) = self.subs.take().and_then(Arc::into_inner) {
            set.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::executor::{ExecutorRef, ThreadPool, same_executor};
    use crate::workers::ThreadWorkerFactory;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Hands out one pool to everyone and records releases.
    struct OnePool {
        pool: ExecutorRef,
        acquired: AtomicUsize,
        released: Mutex<Vec<(InstanceId, ExecutorRef)>>,
    }

    impl OnePool {
        fn new() -> Arc<Self> {
            let pool = ThreadPool::new("one", 2, None, &ThreadWorkerFactory::new()).unwrap();
            Arc::new(Self {
                pool: Arc::new(pool),
                acquired: AtomicUsize::new(0),
                released: Mutex::new(Vec::new()),
            })
        }
    }

    impl ExecutionProvider for OnePool {
        fn executor(&self, _instance: InstanceId) -> Result<ExecutorRef, ProviderError> {
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::clone(&self.pool))
        }

        fn release_executor(
            &self,
            instance: InstanceId,
            executor: ExecutorRef,
        ) -> Result<(), ProviderError> {
            self.released.lock().unwrap().push((instance, executor));
            Ok(())
        }
    }

    struct Broken;

    impl ExecutionProvider for Broken {
        fn executor(&self, _instance: InstanceId) -> Result<ExecutorRef, ProviderError> {
            Err(ProviderError::ShutDown)
        }

        fn release_executor(&self, _: InstanceId, _: ExecutorRef) -> Result<(), ProviderError> {
            Err(ProviderError::ShutDown)
        }
    }

    fn manager(provider: Arc<dyn ExecutionProvider>) -> LifecycleManager {
        LifecycleManager::new_internal(
            provider,
            Arc::new(ThreadWorkerFactory::new()),
            Bus::new(16),
            Config::default(),
            None,
        )
    }

    #[test]
    fn test_acquire_release_forwards_same_resource() {
        let provider = OnePool::new();
        let mgr = manager(provider.clone());
        let id = InstanceId::new();

        let handle = mgr.acquire_handle(id).unwrap();
        assert_eq!(handle.instance(), id);
        assert_eq!(handle.state(), crate::core::HandlePhase::Active);
        mgr.release_handle(id, handle).unwrap();

        let released = provider.released.lock().unwrap();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].0, id);
        assert!(same_executor(&released[0].1, &provider.pool));
    }

    #[test]
    fn test_instance_mismatch_skips_provider() {
        let provider = OnePool::new();
        let mgr = manager(provider.clone());
        let mut events = mgr.bus().subscribe();

        let handle = mgr.acquire_handle(InstanceId::new()).unwrap();
        let err = mgr.release_handle(InstanceId::new(), handle).unwrap_err();
        assert!(matches!(err, ManagerError::InstanceMismatch { .. }));
        assert!(provider.released.lock().unwrap().is_empty());

        assert_eq!(events.try_recv().unwrap().kind, EventKind::HandleAcquired);
        let ev = events.try_recv().unwrap();
        assert_eq!(ev.kind, EventKind::ReleaseFailed);
        assert_eq!(ev.reason.as_deref(), Some("manager_instance_mismatch"));
    }

    #[test]
    fn test_foreign_handle_skips_provider() {
        let provider = OnePool::new();
        let a = manager(provider.clone());
        let b = manager(provider.clone());
        let id = InstanceId::new();

        let handle = a.acquire_handle(id).unwrap();
        let err = b.release_handle(id, handle).unwrap_err();
        match err {
            ManagerError::ForeignHandle {
                expected, actual, ..
            } => {
                assert_eq!(expected, b.id());
                assert_eq!(actual, a.id());
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(provider.released.lock().unwrap().is_empty());
    }

    #[test]
    fn test_provider_error_propagates() {
        let mgr = manager(Arc::new(Broken));
        let mut events = mgr.bus().subscribe();

        let err = mgr.acquire_handle(InstanceId::new()).unwrap_err();
        assert!(matches!(err, ManagerError::Provider(ProviderError::ShutDown)));
        assert_eq!(events.try_recv().unwrap().kind, EventKind::AcquireFailed);
    }

    #[test]
    fn test_released_executor_refuses_work() {
        let provider = OnePool::new();
        let mgr = manager(provider);
        let id = InstanceId::new();

        let handle = mgr.acquire_handle(id).unwrap();
        let exec = handle.executor().clone();
        let handle_id = handle.id();
        mgr.release_handle(id, handle).unwrap();

        assert!(exec.is_released());
        assert_eq!(
            exec.submit(|| Ok(1)).unwrap_err(),
            crate::error::SubmitError::Released { handle: handle_id }
        );
    }

    #[test]
    fn test_drop_drains_subscribers() {
        use crate::events::Event;
        use crate::subscribers::Subscribe;

        struct Slow(Arc<Mutex<Vec<EventKind>>>);

        impl Subscribe for Slow {
            fn on_event(&self, ev: &Event) {
                std::thread::sleep(std::time::Duration::from_millis(5));
                self.0.lock().unwrap().push(ev.kind);
            }
            fn name(&self) -> &'static str {
                "slow"
            }
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let provider = OnePool::new();
        let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(Slow(Arc::clone(&seen)))];
        let mgr = LifecycleManager::builder(provider)
            .with_subscribers(subs)
            .build()
            .unwrap();

        for _ in 0..4 {
            let id = InstanceId::new();
            let handle = mgr.acquire_handle(id).unwrap();
            mgr.release_handle(id, handle).unwrap();
        }
        drop(mgr);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 8);
        assert_eq!(seen[0], EventKind::HandleAcquired);
        assert_eq!(seen[7], EventKind::HandleReleased);
    }
}
