//! # Execution resource providers.
//!
//! An [`ExecutionProvider`] decides which raw resource an instance gets and when
//! that resource is shut down. The [`LifecycleManager`](crate::LifecycleManager)
//! never caches anything; all sharing and reference counting lives here.
//!
//! ## Bundled providers
//! - [`DedicatedPoolProvider`]: one [`ThreadPool`](crate::ThreadPool) per instance,
//!   shut down when that instance releases it.
//! - [`SharedPoolProvider`]: one process-wide pool, reference-counted by live
//!   acquisitions, shut down when the last one is released and recreated lazily.
//!
//! ## Contract
//! ```text
//! executor(instance)                  may be called repeatedly; returns a usable resource
//! release_executor(instance, raw)     called once per acquisition with the exact `raw`
//!                                     returned; shuts `raw` down iff nobody else uses it
//! ```

mod dedicated;
mod shared;

pub use dedicated::DedicatedPoolProvider;
pub use shared::SharedPoolProvider;

use crate::core::Config;
use crate::error::ProviderError;
use crate::events::{Bus, Event, EventKind};
use crate::executor::ExecutorRef;
use crate::instance::InstanceId;

/// Source of raw execution resources.
///
/// Implementations must be thread-safe: the manager calls them concurrently
/// for many instances.
pub trait ExecutionProvider: Send + Sync + 'static {
    /// Returns a resource for `instance`, possibly shared with other instances.
    fn executor(&self, instance: InstanceId) -> Result<ExecutorRef, ProviderError>;

    /// Takes back a resource previously returned by [`executor`](Self::executor)
    /// for `instance`.
    fn release_executor(
        &self,
        instance: InstanceId,
        executor: ExecutorRef,
    ) -> Result<(), ProviderError>;
}

/// Shuts `pool` down and waits up to the configured grace for its threads.
///
/// Publishes `PoolShutdown`, plus `PoolGraceExceeded` if the pool is still
/// running when the grace period ends.
pub(crate) fn terminate(pool: &ExecutorRef, last_user: Option<InstanceId>, cfg: &Config, bus: &Bus) {
    pool.shutdown();

    let mut ev = Event::new(EventKind::PoolShutdown).with_name(pool.name());
    if let Some(instance) = last_user {
        ev = ev.with_instance(instance);
    }
    bus.publish(ev);

    let Some(grace) = cfg.termination_grace() else {
        return;
    };
    if !pool.await_termination(grace) {
        tracing::warn!(pool = pool.name(), ?grace, "pool did not terminate within grace");
        bus.publish(
            Event::new(EventKind::PoolGraceExceeded)
                .with_name(pool.name())
                .with_reason(format!("grace {grace:?} exceeded")),
        );
    }
}
