//! # Tokio runtime as a raw execution resource.
//!
//! [`RuntimeExecutor`] owns a multi-thread tokio runtime and runs jobs on its
//! blocking pool (`spawn_blocking`). Useful when the hosting application
//! already standardises on tokio and wants its short-lived work on a runtime
//! it controls.
//!
//! ## Rules
//! - `shutdown()` stops accepting jobs and shuts the runtime down in the
//!   background. Blocking jobs that already started run to completion; jobs
//!   still waiting for a blocking thread may be dropped (listening tasks then
//!   observe `TaskError::Abandoned`).
//! - `await_termination()` waits for in-flight jobs only, so it is safe to call
//!   from inside an async context.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tokio::runtime::{self, Runtime};

use super::{ExecutorService, Job, RejectedJob};
use crate::core::Config;
use crate::error::ProviderError;
use crate::sync::lock;

/// Poll interval of [`RuntimeExecutor::await_termination`].
const TERMINATION_POLL: Duration = Duration::from_millis(2);

/// Tokio runtime used as a pool for blocking jobs.
pub struct RuntimeExecutor {
    name: Arc<str>,
    runtime: Mutex<Option<Runtime>>,
    in_flight: Arc<AtomicUsize>,
    shut_down: AtomicBool,
}

/// Counts a job from submission until it finishes or is dropped unrun.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl RuntimeExecutor {
    /// Builds a runtime with `threads` workers (at least 1) named `"{name}-rt"`.
    pub fn new(name: impl Into<Arc<str>>, threads: usize) -> Result<Self, ProviderError> {
        let name: Arc<str> = name.into();
        let rt = runtime::Builder::new_multi_thread()
            .worker_threads(threads.max(1))
            .max_blocking_threads(threads.max(1))
            .thread_name(format!("{name}-rt"))
            .enable_time()
            .build()
            .map_err(|e| ProviderError::Spawn {
                reason: e.to_string(),
            })?;

        Ok(Self {
            name,
            runtime: Mutex::new(Some(rt)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Builds a runtime sized by `cfg`.
    pub fn with_config(name: impl Into<Arc<str>>, cfg: &Config) -> Result<Self, ProviderError> {
        Self::new(name, cfg.resolved_pool_size())
    }

    /// Tokio handle of the runtime, while it is running.
    pub fn handle(&self) -> Option<runtime::Handle> {
        lock(&self.runtime).as_ref().map(|rt| rt.handle().clone())
    }

    /// Jobs submitted and not yet finished or dropped.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl ExecutorService for RuntimeExecutor {
    fn execute(&self, job: Job) -> Result<(), RejectedJob> {
        let guard = lock(&self.runtime);
        match guard.as_ref() {
            Some(rt) if !self.shut_down.load(Ordering::Acquire) => {
                let counted = InFlight::enter(&self.in_flight);
                drop(rt.spawn_blocking(move || {
                    let _counted = counted;
                    job();
                }));
                Ok(())
            }
            _ => Err(RejectedJob::new("shut_down", job)),
        }
    }

    fn shutdown(&self) {
        let rt = {
            let mut guard = lock(&self.runtime);
            if self.shut_down.swap(true, Ordering::AcqRel) {
                return;
            }
            guard.take()
        };
        if let Some(rt) = rt {
            rt.shutdown_background();
            tracing::debug!(runtime = %self.name, "runtime shutting down");
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn await_termination(&self, timeout: Duration) -> bool {
        if !self.is_shutdown() {
            return false;
        }
        let deadline = Instant::now() + timeout;
        loop {
            if self.in_flight() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(TERMINATION_POLL);
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for RuntimeExecutor {
    fn drop(&mut self) {
        if let Some(rt) = lock(&self.runtime).take() {
            rt.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_runs_job_on_runtime_thread() {
        let rt = RuntimeExecutor::new("io", 1).unwrap();
        let (tx, rx) = mpsc::channel();
        rt.execute(Box::new(move || {
            let _ = tx.send(std::thread::current().id());
        }))
        .unwrap();
        let id = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(id, std::thread::current().id());
        assert!(rt.handle().is_some());
    }

    #[test]
    fn test_shutdown_rejects_and_terminates() {
        let rt = RuntimeExecutor::new("io", 1).unwrap();
        assert!(!rt.await_termination(Duration::from_millis(1)));
        rt.shutdown();
        assert!(rt.is_shutdown());
        assert_eq!(rt.execute(Box::new(|| {})).unwrap_err().reason, "shut_down");
        assert!(rt.await_termination(Duration::from_secs(1)));
        assert!(rt.handle().is_none());
    }

    #[test]
    fn test_await_termination_waits_for_running_job() {
        let rt = RuntimeExecutor::new("io", 1).unwrap();
        let (started_tx, started_rx) = mpsc::channel();
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        rt.execute(Box::new(move || {
            let _ = started_tx.send(());
            let _ = gate_rx.recv();
        }))
        .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        rt.shutdown();
        assert!(rt.handle().is_none());
        assert_eq!(rt.in_flight(), 1);
        assert!(!rt.await_termination(Duration::from_millis(20)));

        let _ = gate_tx.send(());
        assert!(rt.await_termination(Duration::from_secs(5)));
        assert_eq!(rt.in_flight(), 0);
    }

    #[test]
    fn test_terminate_reports_grace_exceeded() {
        use crate::events::{Bus, EventKind};
        use crate::executor::ExecutorRef;

        let rt = RuntimeExecutor::new("slow", 1).unwrap();
        let (started_tx, started_rx) = mpsc::channel();
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        rt.execute(Box::new(move || {
            let _ = started_tx.send(());
            let _ = gate_rx.recv();
        }))
        .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let cfg = Config {
            grace: Duration::from_millis(20),
            ..Config::default()
        };
        let raw: ExecutorRef = Arc::new(rt);
        crate::providers::terminate(&raw, None, &cfg, &bus);

        assert_eq!(rx.try_recv().unwrap().kind, EventKind::PoolShutdown);
        assert_eq!(rx.try_recv().unwrap().kind, EventKind::PoolGraceExceeded);
        let _ = gate_tx.send(());
        assert!(raw.await_termination(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_shutdown_inside_async_context() {
        let rt = RuntimeExecutor::new("nested", 1).unwrap();
        let (tx, rx) = mpsc::channel();
        rt.execute(Box::new(move || {
            let _ = tx.send(7);
        }))
        .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);

        rt.shutdown();
        assert!(rt.await_termination(Duration::from_secs(5)));
        drop(rt);
    }
}
