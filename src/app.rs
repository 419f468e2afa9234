//! # Application instances.
//!
//! [`AppInstance`] is the lifecycle a hosting application goes through for each
//! of its instances: created once, used, deleted at most once.
//!
//! ```text
//! AppInstance::new(name, manager)
//!   └─► InstanceId::new() ──► manager.acquire_handle(id) ──► ExecutorHandle
//!
//! executor().submit(..)        work on the provider's pool
//! spawn_worker(name, f)        long-lived thread tracked by a WorkerGroup
//!
//! delete()   (or Drop)
//!   ├─► workers.shutdown(cfg.grace)        cancel + join, stuck ones detached
//!   ├─► manager.release_handle(id, handle) executor clones start refusing work
//!   └─► publish(InstanceDeleted)
//! ```
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use poolvisor::{AppInstance, Config, LifecycleManager, SharedPoolProvider};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = Config { pool_size: 2, ..Config::default() };
//! let manager = LifecycleManager::builder(Arc::new(SharedPoolProvider::new(cfg.clone())))
//!     .with_config(cfg)
//!     .build()?;
//!
//! let app = AppInstance::new("default", &manager)?;
//! app.spawn_worker("heartbeat", |ctx| {
//!     while !ctx.is_cancelled() {
//!         std::thread::sleep(Duration::from_millis(10));
//!     }
//! })?;
//!
//! let fut = app.executor().submit(|| Ok("done"))?;
//! assert_eq!(fut.wait(), Ok("done"));
//!
//! app.delete()?;
//! assert!(app.executor().submit(|| Ok(())).is_err());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::core::{ExecutorHandle, LifecycleManager};
use crate::error::{InstanceError, ManagerError, WorkerError};
use crate::events::{Event, EventKind};
use crate::executor::ListeningExecutor;
use crate::instance::InstanceId;
use crate::sync::lock;
use crate::workers::WorkerGroup;

/// One application instance holding an executor handle and its workers.
pub struct AppInstance {
    id: InstanceId,
    name: Arc<str>,
    manager: Arc<LifecycleManager>,
    handle: Mutex<Option<ExecutorHandle>>,
    executor: ListeningExecutor,
    workers: WorkerGroup,
    deleted: AtomicBool,
}

impl AppInstance {
    /// Allocates a new identity and acquires its executor handle.
    pub fn new(
        name: impl Into<Arc<str>>,
        manager: &Arc<LifecycleManager>,
    ) -> Result<Self, ManagerError> {
        let id = InstanceId::new();
        let handle = manager.acquire_handle(id)?;
        let executor = handle.executor().clone();
        let workers = WorkerGroup::new(id, manager.worker_factory(), manager.bus().clone());

        Ok(Self {
            id,
            name: name.into(),
            manager: Arc::clone(manager),
            handle: Mutex::new(Some(handle)),
            executor,
            workers,
            deleted: AtomicBool::new(false),
        })
    }

    /// Identity of this instance.
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Human-readable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Submission interface; refuses work once the instance is deleted.
    pub fn executor(&self) -> &ListeningExecutor {
        &self.executor
    }

    /// Starts a long-lived worker named `"{instance name}-{name}"`.
    ///
    /// `run` must return once its token is cancelled; deletion waits for it
    /// up to [`Config::grace`](crate::Config::grace).
    pub fn spawn_worker<F>(&self, name: &str, run: F) -> Result<(), WorkerError>
    where
        F: FnOnce(CancellationToken) + Send + 'static,
    {
        self.workers.spawn(&format!("{}-{name}", self.name), run)
    }

    /// Names of the workers still tracked.
    pub fn workers(&self) -> Vec<String> {
        self.workers.names()
    }

    /// Returns true once [`delete`](Self::delete) has run.
    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    /// Stops the workers, releases the handle and publishes `InstanceDeleted`.
    ///
    /// Only the first call has an effect; later calls return `Ok(())`. Every
    /// step runs even if an earlier one fails; the first failure is returned.
    pub fn delete(&self) -> Result<(), InstanceError> {
        if self.deleted.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let grace = self.manager.config().grace;
        let workers = self.workers.shutdown(grace).map_err(InstanceError::from);

        let released = match lock(&self.handle).take() {
            Some(handle) => self
                .manager
                .release_handle(self.id, handle)
                .map_err(InstanceError::from),
            None => Ok(()),
        };

        self.manager.bus().publish(
            Event::new(EventKind::InstanceDeleted)
                .with_instance(self.id)
                .with_name(Arc::clone(&self.name)),
        );
        tracing::debug!(instance = %self.id, name = %self.name, "instance deleted");

        workers.map(|_| ()).and(released)
    }
}

impl Drop for AppInstance {
    fn drop(&mut self) {
        if let Err(e) = self.delete() {
            tracing::warn!(instance = %self.id, error = %e, "instance deletion on drop failed");
        }
    }
}

impl fmt::Debug for AppInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppInstance")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("deleted", &self.is_deleted())
            .finish_non_exhaustive()
    }
}
