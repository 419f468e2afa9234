//! # Long-lived workers.
//!
//! Subsystems that need threads outliving single tasks (run loops, event
//! targets, schedulers) create them through a [`WorkerFactory`]. Each
//! [`Worker`] owns a [`CancellationToken`]; its body must return once the token
//! is cancelled, which is what lets an instance stop all its workers at deletion.
//!
//! ## Contents
//! - [`WorkerFactory`] the capability (stateless w.r.t. instances)
//! - [`Worker`] a named thread plus its cancellation token
//! - [`ThreadWorkerFactory`] default factory over `std::thread::Builder`
//! - [`WorkerGroup`] per-instance tracker that stops workers as a group
//!
//! ## Example
//! ```rust
//! use poolvisor::{ThreadWorkerFactory, WorkerFactory};
//! use tokio_util::sync::CancellationToken;
//!
//! let factory = ThreadWorkerFactory::new().with_prefix("app");
//! let worker = factory
//!     .new_worker("ticker", Box::new(|ctx: CancellationToken| {
//!         while !ctx.is_cancelled() {
//!             std::thread::sleep(std::time::Duration::from_millis(1));
//!         }
//!     }))
//!     .unwrap();
//! assert_eq!(worker.name(), "app-ticker");
//! worker.stop().unwrap();
//! ```

mod group;
mod thread;
mod worker;

pub use group::WorkerGroup;
pub use thread::ThreadWorkerFactory;
pub use worker::{Worker, WorkerFn};

use crate::error::WorkerError;

/// # Factory for long-lived worker threads.
///
/// Implementations must be safe to call concurrently and must not keep
/// per-instance state: callers track which workers belong to which instance.
pub trait WorkerFactory: Send + Sync + 'static {
    /// Starts a worker named `name` running `run`.
    ///
    /// The returned [`Worker`] is already running; cancel its token to ask it to stop.
    fn new_worker(&self, name: &str, run: WorkerFn) -> Result<Worker, WorkerError>;
}
