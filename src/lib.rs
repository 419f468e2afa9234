//! # poolvisor
//!
//! **Poolvisor** manages background execution resources on behalf of many
//! independent application instances.
//!
//! Each instance obtains a decorated, observable executor from a
//! [`LifecycleManager`], submits work through it, and hands it back when the
//! instance is deleted. The manager forwards the exact raw resource to an
//! [`ExecutionProvider`], which decides whether that pool is shared and when it
//! shuts down. Long-lived threads are created through a [`WorkerFactory`] and
//! stopped as a group at teardown.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │ AppInstance  │   │ AppInstance  │   │ AppInstance  │
//!     │ (instance#1) │   │ (instance#2) │   │ (instance#3) │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            │ acquire/release  │                  │
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  LifecycleManager (no per-instance state)                         │
//! │  - acquire_handle(instance) ─► ExecutorHandle                     │
//! │  - release_handle(instance, handle)                               │
//! │  - worker_factory() ─► Arc<dyn WorkerFactory>                     │
//! └──────┬─────────────────────────────────────────────┬──────────────┘
//!        │ executor / release_executor                 │ publish(Event)
//!        ▼                                             ▼
//! ┌──────────────────────────────┐      ┌───────────────────────────────┐
//! │ ExecutionProvider            │      │ Bus (broadcast channel)       │
//! │  - SharedPoolProvider        │─────►│  └─► SubscriberSet            │
//! │  - DedicatedPoolProvider     │      │       ├─► [queue] ─► sub1     │
//! │  - your own                  │      │       └─► [queue] ─► subN     │
//! └──────┬───────────────────────┘      └───────────────────────────────┘
//!        ▼
//!   ThreadPool / RuntimeExecutor (raw resource, Arc<dyn ExecutorService>)
//! ```
//!
//! ### Handle lifecycle
//! ```text
//! acquire_handle ──► Created ──► Active ──► release_handle ──► Released
//!                                  │                              │
//!                    executor().submit(f) ─► TaskFuture     submit ─► Err(Released)
//!                                  │
//!                  f() runs on a pool thread
//!                    ├─ Ok(v)         ─► on_success listeners (once)
//!                    └─ Err/panic     ─► on_failure listeners (once)
//! ```
//!
//! ## Features
//! | Area              | Description                                                     | Key types / traits                                 |
//! |-------------------|-----------------------------------------------------------------|----------------------------------------------------|
//! | **Lifecycle**     | Acquire and release executors per instance.                     | [`LifecycleManager`], [`ExecutorHandle`]           |
//! | **Providers**     | Decide sharing and shutdown of raw pools.                       | [`ExecutionProvider`], [`SharedPoolProvider`]      |
//! | **Executors**     | Submit work and observe outcomes.                               | [`ListeningExecutor`], [`TaskFuture`]              |
//! | **Workers**       | Named long-lived threads stopped as a group.                    | [`WorkerFactory`], [`WorkerGroup`]                 |
//! | **Subscriber API**| Hook into runtime events (logging, metrics, custom subscribers). | [`Subscribe`]                                      |
//! | **Errors**        | Typed errors for every layer.                                   | [`ManagerError`], [`SubmitError`], [`TaskError`]   |
//! | **Configuration** | Centralize runtime settings.                                    | [`Config`]                                         |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use poolvisor::{Config, InstanceId, LifecycleManager, SharedPoolProvider, TaskError};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = Config { pool_size: 2, ..Config::default() };
//!
//! // Build subscribers (optional)
//! #[cfg(feature = "logging")]
//! let subs: Vec<Arc<dyn poolvisor::Subscribe>> = vec![Arc::new(poolvisor::LogWriter::new())];
//! #[cfg(not(feature = "logging"))]
//! let subs: Vec<Arc<dyn poolvisor::Subscribe>> = Vec::new();
//!
//! let manager = LifecycleManager::builder(Arc::new(SharedPoolProvider::new(cfg.clone())))
//!     .with_config(cfg)
//!     .with_subscribers(subs)
//!     .build()?;
//!
//! let instance = InstanceId::new();
//! let handle = manager.acquire_handle(instance)?;
//!
//! let fut = handle.executor().submit(|| {
//!     "42".parse::<u32>().map_err(|e| TaskError::fail(e.to_string()))
//! })?;
//! fut.on_success(|v| println!("answer: {v}"))
//!    .on_failure(|e| eprintln!("failed: {e}"));
//! assert_eq!(fut.wait(), Ok(42));
//!
//! manager.release_handle(instance, handle)?;
//! # Ok(())
//! # }
//! ```
mod app;
mod core;
mod error;
mod events;
mod executor;
mod instance;
mod providers;
mod subscribers;
mod sync;
mod workers;

// ---- Public re-exports ----

pub use app::AppInstance;
pub use crate::core::{
    Config, ExecutorHandle, HandleId, HandlePhase, LifecycleManager, ManagerBuilder, ManagerId,
};
pub use error::{
    InstanceError, ManagerError, ProviderError, RuntimeError, SubmitError, TaskError, WorkerError,
};
pub use events::{Bus, Event, EventKind};
pub use executor::{
    ExecutorRef, ExecutorService, Job, ListenerDispatch, ListeningExecutor, RejectedJob,
    RuntimeExecutor, TaskFuture, ThreadPool, same_executor,
};
pub use instance::InstanceId;
pub use providers::{DedicatedPoolProvider, ExecutionProvider, SharedPoolProvider};
pub use subscribers::{Subscribe, SubscriberSet};
pub use workers::{ThreadWorkerFactory, Worker, WorkerFactory, WorkerFn, WorkerGroup};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
