//! # Global runtime configuration.
//!
//! Provides [`Config`] centralized settings for the lifecycle manager and the
//! bundled providers.
//!
//! Config is used in three ways:
//! 1. **Manager creation**: `LifecycleManager::builder(provider).with_config(cfg)`
//! 2. **Pool creation**: `ThreadPool::with_config(name, &cfg, factory)`
//! 3. **Teardown**: `grace` bounds pool termination and worker-group shutdown
//!
//! ## Sentinel values
//! - `pool_size = 0` → one thread per available CPU
//! - `queue_capacity = 0` → unbounded queue
//! - `grace = 0s` → do not wait for termination

use std::num::NonZeroUsize;
use std::thread;
use std::time::Duration;

use crate::executor::ListenerDispatch;

/// Global configuration for the lifecycle manager.
///
/// ## Field semantics
/// - `pool_size`: Threads per pool (`0` = available parallelism)
/// - `queue_capacity`: Pending jobs per pool (`0` = unbounded)
/// - `thread_name_prefix`: Prefix for every thread the crate names
/// - `grace`: Maximum wait for pools and workers to stop (`0s` = no wait)
/// - `bus_capacity`: Event bus ring buffer size (min 1; clamped by Bus)
/// - `listener_dispatch`: Where task listeners run
///
/// ## Notes
/// All fields are public for flexibility. Prefer using helper accessors to avoid
/// sprinkling sentinel checks (`0`) across the codebase.
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of threads in pools created by the bundled providers.
    ///
    /// - `0` = [`std::thread::available_parallelism`] (falls back to 1)
    /// - `n > 0` = exactly `n` threads
    pub pool_size: usize,

    /// Maximum number of queued jobs per pool.
    ///
    /// When full, submissions fail with `SubmitError::Rejected { reason: "queue_full" }`.
    pub queue_capacity: usize,

    /// Prefix for pool and worker thread names.
    pub thread_name_prefix: String,

    /// Maximum time to wait for a pool or worker group to stop.
    ///
    /// On release or instance deletion:
    /// - Workers are cancelled via `CancellationToken`
    /// - Pools stop accepting work and drain their queue
    /// - If the deadline passes, `RuntimeError::GraceExceeded` is reported and the
    ///   remaining threads are left detached
    pub grace: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Default listener dispatch for executors handed out by the manager.
    pub listener_dispatch: ListenerDispatch,
}

impl Config {
    /// Returns the pool size with the `0` sentinel resolved.
    #[inline]
    pub fn resolved_pool_size(&self) -> usize {
        if self.pool_size == 0 {
            thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        } else {
            self.pool_size
        }
    }

    /// Returns the per-pool queue bound as an `Option`.
    ///
    /// - `None` → unbounded
    /// - `Some(n)` → at most `n` pending jobs
    #[inline]
    pub fn queue_bound(&self) -> Option<usize> {
        if self.queue_capacity == 0 {
            None
        } else {
            Some(self.queue_capacity)
        }
    }

    /// Returns the termination grace as an `Option`.
    ///
    /// - `None` → shut down without waiting
    /// - `Some(d)` → wait up to `d`
    #[inline]
    pub fn termination_grace(&self) -> Option<Duration> {
        if self.grace == Duration::ZERO {
            None
        } else {
            Some(self.grace)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Builds a thread or pool name from the configured prefix.
    pub fn thread_name(&self, name: &str) -> String {
        if self.thread_name_prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}-{name}", self.thread_name_prefix)
        }
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `pool_size = 0` (one thread per CPU)
    /// - `queue_capacity = 0` (unbounded)
    /// - `thread_name_prefix = "poolvisor"`
    /// - `grace = 10s`
    /// - `bus_capacity = 1024`
    /// - `listener_dispatch = Executor`
    fn default() -> Self {
        Self {
            pool_size: 0,
            queue_capacity: 0,
            thread_name_prefix: "poolvisor".to_string(),
            grace: Duration::from_secs(10),
            bus_capacity: 1024,
            listener_dispatch: ListenerDispatch::Executor,
        }
    }
}
