//! # Raw execution resources and the listening decorator.
//!
//! A raw resource is anything implementing [`ExecutorService`]: a pool of
//! threads that runs boxed jobs. Providers own raw resources; application code
//! only ever sees the [`ListeningExecutor`] built on top of one.
//!
//! ## Contents
//! - [`ExecutorService`] the raw resource contract, shared as [`ExecutorRef`]
//! - [`ThreadPool`] fixed-size pool of OS threads created by a `WorkerFactory`
//! - [`RuntimeExecutor`] a tokio multi-thread runtime used as a blocking-job pool
//! - [`ListeningExecutor`] submit-and-observe interface returning [`TaskFuture`]s
//!
//! ## Submission flow
//! ```text
//! ListeningExecutor::submit(f)
//!   ├─► state != Active      → Err(SubmitError::Released)
//!   ├─► raw.execute(job)     → Err(RejectedJob) → Err(SubmitError::Rejected)
//!   └─► Ok(TaskFuture)
//!          job runs on a pool thread:
//!            f() → Ok(v)         → success listeners
//!                → Err(e)/panic  → failure listeners
//!          (job dropped unrun    → failure listeners with TaskError::Abandoned)
//! ```

mod future;
mod listening;
mod pool;
mod runtime;

pub use future::TaskFuture;
pub use listening::{ListenerDispatch, ListeningExecutor};
pub use pool::ThreadPool;
pub use runtime::RuntimeExecutor;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::SubmitError;

/// Unit of work accepted by a raw resource.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Shared reference to a raw resource. Identity is pointer identity.
pub type ExecutorRef = Arc<dyn ExecutorService>;

/// A job the resource refused, handed back to the caller.
pub struct RejectedJob {
    /// Why the job was refused (`shut_down`, `queue_full`, ...).
    pub reason: &'static str,
    /// The refused job.
    pub job: Job,
}

impl RejectedJob {
    pub fn new(reason: &'static str, job: Job) -> Self {
        Self { reason, job }
    }
}

impl fmt::Debug for RejectedJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RejectedJob")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

impl From<RejectedJob> for SubmitError {
    fn from(r: RejectedJob) -> Self {
        SubmitError::Rejected {
            reason: r.reason.to_string(),
        }
    }
}

/// # Raw execution resource.
///
/// Conceptually a thread pool. Implementations must be thread-safe: several
/// instances may share one resource and submit concurrently.
pub trait ExecutorService: Send + Sync + 'static {
    /// Queues `job` for execution on some pool thread.
    ///
    /// Returns the job inside [`RejectedJob`] if the resource cannot accept it.
    fn execute(&self, job: Job) -> Result<(), RejectedJob>;

    /// Stops accepting jobs. Already queued jobs still run.
    fn shutdown(&self);

    /// Returns true once [`shutdown`](Self::shutdown) was called.
    fn is_shutdown(&self) -> bool;

    /// Waits up to `timeout` for all threads to exit after shutdown.
    ///
    /// Returns true if the resource is fully terminated.
    fn await_termination(&self, timeout: Duration) -> bool;

    /// Name for logs and events.
    fn name(&self) -> &str {
        "executor"
    }
}

/// Returns true if both references point to the same raw resource.
#[inline]
pub fn same_executor(a: &ExecutorRef, b: &ExecutorRef) -> bool {
    Arc::ptr_eq(a, b)
}
