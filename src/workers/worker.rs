use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio_util::sync::CancellationToken;

use crate::error::{WorkerError, panic_message};

/// Body of a long-lived worker; must return once the token is cancelled.
pub type WorkerFn = Box<dyn FnOnce(CancellationToken) + Send + 'static>;

/// A running long-lived worker.
///
/// Dropping a `Worker` without [`stop`](Worker::stop) or [`join`](Worker::join)
/// detaches the thread; it keeps running until its body returns.
pub struct Worker {
    name: Arc<str>,
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl Worker {
    /// Assembles a worker from a spawned thread and the token its body observes.
    ///
    /// For custom [`WorkerFactory`](super::WorkerFactory) implementations.
    pub fn from_parts(name: impl Into<Arc<str>>, token: CancellationToken, join: JoinHandle<()>) -> Self {
        Self {
            name: name.into(),
            token,
            join,
        }
    }

    /// Thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Token observed by the worker body.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Asks the worker to stop without waiting.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns true once the worker body has returned (or panicked).
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the worker body to return.
    pub fn join(self) -> Result<(), WorkerError> {
        self.join.join().map_err(|payload| WorkerError::Panicked {
            name: self.name.to_string(),
            message: panic_message(&*payload),
        })
    }

    /// Cancels the worker and waits for it.
    pub fn stop(self) -> Result<(), WorkerError> {
        self.cancel();
        self.join()
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("cancelled", &self.token.is_cancelled())
            .field("finished", &self.join.is_finished())
            .finish()
    }
}
