//! # Fixed-size thread pool.
//!
//! [`ThreadPool`] runs jobs on `size` long-lived threads obtained from a
//! [`WorkerFactory`]. Jobs travel through one MPMC queue
//! (`crossbeam-channel`), optionally bounded.
//!
//! ## Rules
//! - `shutdown()` closes the queue; workers drain what is already queued, then exit.
//! - `shutdown_now()` additionally cancels every worker; queued jobs that never
//!   started are dropped (listening tasks observe `TaskError::Abandoned`).
//! - A panicking job is contained; the worker thread keeps serving the queue.
//! - Dropping the pool performs `shutdown()` without waiting.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use tokio_util::sync::CancellationToken;

use super::{ExecutorService, Job, RejectedJob};
use crate::core::Config;
use crate::error::{WorkerError, panic_message};
use crate::sync::{lock, read, write};
use crate::workers::{Worker, WorkerFactory};

/// How often an idle worker re-checks its cancellation token.
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Poll interval of [`ThreadPool::await_termination`].
const TERMINATION_POLL: Duration = Duration::from_millis(2);

/// Fixed-size pool of worker threads.
pub struct ThreadPool {
    name: Arc<str>,
    size: usize,
    sender: RwLock<Option<Sender<Job>>>,
    workers: Mutex<Vec<Worker>>,
    shut_down: AtomicBool,
}

impl ThreadPool {
    /// Starts a pool of `size` threads (at least 1) named `"{name}-{i}"`.
    ///
    /// `queue_capacity = None` means an unbounded queue.
    pub fn new(
        name: impl Into<Arc<str>>,
        size: usize,
        queue_capacity: Option<usize>,
        factory: &dyn WorkerFactory,
    ) -> Result<Self, WorkerError> {
        let name: Arc<str> = name.into();
        let size = size.max(1);
        let (tx, rx) = match queue_capacity {
            Some(cap) => crossbeam_channel::bounded::<Job>(cap.max(1)),
            None => crossbeam_channel::unbounded::<Job>(),
        };

        let mut workers = Vec::with_capacity(size);
        for i in 0..size {
            let rx = rx.clone();
            let pool = Arc::clone(&name);
            match factory.new_worker(&format!("{name}-{i}"), Box::new(move |ctx| serve(&pool, rx, ctx))) {
                Ok(w) => workers.push(w),
                Err(e) => {
                    // closing the queue lets the already started workers exit
                    drop(tx);
                    for w in workers {
                        let _ = w.stop();
                    }
                    return Err(e);
                }
            }
        }

        tracing::debug!(pool = %name, size, "thread pool started");
        Ok(Self {
            name,
            size,
            sender: RwLock::new(Some(tx)),
            workers: Mutex::new(workers),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Starts a pool sized and bounded by `cfg`.
    pub fn with_config(
        name: impl Into<Arc<str>>,
        cfg: &Config,
        factory: &dyn WorkerFactory,
    ) -> Result<Self, WorkerError> {
        Self::new(name, cfg.resolved_pool_size(), cfg.queue_bound(), factory)
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs queued but not yet picked up.
    pub fn queued(&self) -> usize {
        read(&self.sender).as_ref().map_or(0, Sender::len)
    }

    /// Shuts down and cancels all workers; jobs still queued are dropped.
    pub fn shutdown_now(&self) {
        self.shutdown();
        for w in lock(&self.workers).iter() {
            w.cancel();
        }
    }
}

impl ExecutorService for ThreadPool {
    fn execute(&self, job: Job) -> Result<(), RejectedJob> {
        let guard = read(&self.sender);
        let Some(tx) = guard.as_ref() else {
            return Err(RejectedJob::new("shut_down", job));
        };
        match tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) => Err(RejectedJob::new("queue_full", job)),
            Err(TrySendError::Disconnected(job)) => Err(RejectedJob::new("shut_down", job)),
        }
    }

    fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::AcqRel) {
            write(&self.sender).take();
            tracing::debug!(pool = %self.name, "thread pool shutting down");
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut workers = lock(&self.workers);
                if workers.iter().all(Worker::is_finished) {
                    for w in workers.drain(..) {
                        if let Err(e) = w.join() {
                            tracing::warn!(pool = %self.name, error = %e, "pool worker panicked");
                        }
                    }
                    return true;
                }
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

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Worker loop: run jobs until the queue closes or the token is cancelled.
fn serve(pool: &str, rx: Receiver<Job>, ctx: CancellationToken) {
    while !ctx.is_cancelled() {
        match rx.recv_timeout(IDLE_POLL) {
            Ok(job) => {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
                    tracing::error!(pool, panic = %panic_message(&*payload), "job panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::ThreadWorkerFactory;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    fn pool(size: usize, cap: Option<usize>) -> ThreadPool {
        ThreadPool::new("test-pool", size, cap, &ThreadWorkerFactory::new()).unwrap()
    }

    #[test]
    fn test_runs_jobs_on_pool_threads() {
        let p = pool(2, None);
        let (tx, rx) = mpsc::channel();
        for _ in 0..4 {
            let tx = tx.clone();
            p.execute(Box::new(move || {
                let _ = tx.send(thread::current().name().map(str::to_string));
            }))
            .unwrap();
        }
        for _ in 0..4 {
            let name = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
            assert!(name.starts_with("test-pool-"), "{name}");
        }
    }

    #[test]
    fn test_shutdown_drains_queue() {
        let p = pool(1, None);
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let done = Arc::clone(&done);
            p.execute(Box::new(move || {
                done.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }
        p.shutdown();
        assert!(p.is_shutdown());
        assert!(p.await_termination(Duration::from_secs(5)));
        assert_eq!(done.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_rejects_after_shutdown() {
        let p = pool(1, None);
        p.shutdown();
        let err = p.execute(Box::new(|| {})).unwrap_err();
        assert_eq!(err.reason, "shut_down");
    }

    #[test]
    fn test_bounded_queue_rejects_when_full() {
        let p = pool(1, Some(1));
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel::<()>();

        p.execute(Box::new(move || {
            let _ = started_tx.send(());
            let _ = gate_rx.recv();
        }))
        .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        p.execute(Box::new(|| {})).unwrap();
        let err = p.execute(Box::new(|| {})).unwrap_err();
        assert_eq!(err.reason, "queue_full");
        assert_eq!(p.queued(), 1);

        let _ = gate_tx.send(());
    }

    #[test]
    fn test_panicking_job_keeps_worker_alive() {
        let p = pool(1, None);
        p.execute(Box::new(|| panic!("job failure"))).unwrap();

        let (tx, rx) = mpsc::channel();
        p.execute(Box::new(move || {
            let _ = tx.send(42);
        }))
        .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
    }

    #[test]
    fn test_shutdown_now_abandons_queued_tasks() {
        use crate::error::TaskError;
        use crate::executor::ListeningExecutor;

        let p = Arc::new(pool(1, None));
        let exec = ListeningExecutor::detached(Arc::clone(&p) as crate::executor::ExecutorRef);
        let (started_tx, started_rx) = mpsc::channel::<()>();
        let (gate_tx, gate_rx) = mpsc::channel::<()>();

        let first = exec
            .submit(move || {
                let _ = started_tx.send(());
                let _ = gate_rx.recv();
                Ok(1)
            })
            .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let queued = exec.submit(|| Ok(2)).unwrap();

        p.shutdown_now();
        let _ = gate_tx.send(());
        assert!(p.await_termination(Duration::from_secs(5)));

        assert_eq!(first.wait_timeout(Duration::from_secs(5)), Some(Ok(1)));
        assert_eq!(
            queued.wait_timeout(Duration::from_secs(5)),
            Some(Err(TaskError::Abandoned))
        );
    }

    #[test]
    fn test_await_termination_times_out_while_running() {
        let p = pool(1, None);
        assert!(!p.await_termination(Duration::from_millis(10)));
        p.shutdown();
        assert!(p.await_termination(Duration::from_secs(5)));
    }
}
