//! # Listenable task result.
//!
//! [`TaskFuture`] is the observable side of a submitted task. Callers either
//! attach listeners (`on_success`, `on_failure`, `on_complete`) or block/await
//! for the outcome. The job side holds a `Completer`; whatever happens to the
//! job, the outcome is set exactly once:
//!
//! ```text
//! job runs → Ok(v)            → complete(Ok(v))
//!          → Err(e)           → complete(Err(e))
//!          → panic            → complete(Err(Panicked))
//! job dropped without running → complete(Err(Abandoned))   (Completer::drop)
//! ```
//!
//! ## Listener rules
//! - Each listener runs **exactly once**.
//! - Listeners attached before completion run when the task completes;
//!   listeners attached afterwards run immediately.
//! - With [`ListenerDispatch::Executor`](super::ListenerDispatch) listeners run
//!   as jobs on the same raw resource; if it refuses them they run on the
//!   thread that attached or completed them.

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::task::AtomicWaker;

use super::{ExecutorService, Job};
use crate::error::{TaskError, panic_message};
use crate::sync::lock;

type Outcome<T> = Result<T, TaskError>;
type Listener<T> = Box<dyn FnOnce(&Outcome<T>) + Send + 'static>;

/// Where listeners run.
#[derive(Clone)]
pub(crate) enum Dispatcher {
    /// On the completing (or attaching) thread.
    Direct,
    /// As a job on the raw resource.
    Executor(Weak<dyn ExecutorService>),
}

impl Dispatcher {
    fn run<T: Send + Sync + 'static>(&self, listener: Listener<T>, outcome: Arc<Outcome<T>>) {
        let once = OnceJob(Some(Box::new(move || listener(&outcome))));
        match self {
            Dispatcher::Direct => once.run(),
            Dispatcher::Executor(weak) => match weak.upgrade() {
                // a refused job is dropped here, which runs it inline
                Some(exec) => drop(exec.execute(Box::new(move || once.run()))),
                None => once.run(),
            },
        }
    }
}

/// Runs its job once: when invoked, or when dropped unrun.
struct OnceJob(Option<Job>);

impl OnceJob {
    fn run(mut self) {
        if let Some(job) = self.0.take() {
            run_guarded(job);
        }
    }
}

impl Drop for OnceJob {
    fn drop(&mut self) {
        if let Some(job) = self.0.take() {
            run_guarded(job);
        }
    }
}

fn run_guarded(job: Job) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
        tracing::error!(panic = %panic_message(&*payload), "task listener panicked");
    }
}

struct Inner<T> {
    outcome: Option<Arc<Outcome<T>>>,
    listeners: Vec<Listener<T>>,
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
    done: Condvar,
    waker: AtomicWaker,
    dispatch: Dispatcher,
}

impl<T: Send + Sync + 'static> Shared<T> {
    fn complete(&self, outcome: Outcome<T>) {
        let outcome = Arc::new(outcome);
        let listeners = {
            let mut inner = lock(&self.inner);
            if inner.outcome.is_some() {
                return;
            }
            inner.outcome = Some(Arc::clone(&outcome));
            std::mem::take(&mut inner.listeners)
        };

        self.done.notify_all();
        self.waker.wake();

        for listener in listeners {
            self.dispatch.run(listener, Arc::clone(&outcome));
        }
    }

    fn outcome(&self) -> Option<Arc<Outcome<T>>> {
        lock(&self.inner).outcome.clone()
    }
}

/// Creates the two ends of one task.
pub(crate) fn task_pair<T: Send + Sync + 'static>(dispatch: Dispatcher) -> (Completer<T>, TaskFuture<T>) {
    let shared = Arc::new(Shared {
        inner: Mutex::new(Inner {
            outcome: None,
            listeners: Vec::new(),
        }),
        done: Condvar::new(),
        waker: AtomicWaker::new(),
        dispatch,
    });
    (
        Completer {
            shared: Some(Arc::clone(&shared)),
        },
        TaskFuture { shared },
    )
}

/// Job-side end: sets the outcome once, or `Abandoned` when dropped unused.
pub(crate) struct Completer<T: Send + Sync + 'static> {
    shared: Option<Arc<Shared<T>>>,
}

impl<T: Send + Sync + 'static> Completer<T> {
    pub(crate) fn complete(mut self, outcome: Outcome<T>) {
        if let Some(shared) = self.shared.take() {
            shared.complete(outcome);
        }
    }
}

impl<T: Send + Sync + 'static> Drop for Completer<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.complete(Err(TaskError::Abandoned));
        }
    }
}

/// Observable result of a task submitted through a [`ListeningExecutor`](super::ListeningExecutor).
///
/// # Example
/// ```rust
/// use poolvisor::{ThreadPool, ThreadWorkerFactory, ListeningExecutor};
/// use std::sync::Arc;
///
/// let pool = Arc::new(ThreadPool::new("demo", 1, None, &ThreadWorkerFactory::new()).unwrap());
/// let exec = ListeningExecutor::detached(pool);
///
/// let fut = exec.submit(|| Ok(6 * 7)).unwrap();
/// fut.on_success(|v| assert_eq!(*v, 42));
/// assert_eq!(fut.wait(), Ok(42));
/// ```
pub struct TaskFuture<T: Send + Sync + 'static> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + Sync + 'static> TaskFuture<T> {
    /// Attaches a listener receiving the outcome, whichever it is.
    pub fn on_complete<F>(&self, f: F) -> &Self
    where
        F: FnOnce(&Result<T, TaskError>) + Send + 'static,
    {
        let mut inner = lock(&self.shared.inner);
        let done = inner.outcome.clone();
        match done {
            Some(outcome) => {
                drop(inner);
                self.shared.dispatch.run(Box::new(f), outcome);
            }
            None => inner.listeners.push(Box::new(f)),
        }
        self
    }

    /// Attaches a listener that runs only if the task produced a value.
    pub fn on_success<F>(&self, f: F) -> &Self
    where
        F: FnOnce(&T) + Send + 'static,
    {
        self.on_complete(move |outcome| {
            if let Ok(v) = outcome {
                f(v);
            }
        })
    }

    /// Attaches a listener that runs only if the task failed, panicked or was abandoned.
    pub fn on_failure<F>(&self, f: F) -> &Self
    where
        F: FnOnce(&TaskError) + Send + 'static,
    {
        self.on_complete(move |outcome| {
            if let Err(e) = outcome {
                f(e);
            }
        })
    }

    /// Returns true once the outcome is set.
    pub fn is_done(&self) -> bool {
        lock(&self.shared.inner).outcome.is_some()
    }
}

impl<T: Clone + Send + Sync + 'static> TaskFuture<T> {
    /// Returns the outcome if it is already set.
    pub fn try_outcome(&self) -> Option<Result<T, TaskError>> {
        self.shared.outcome().map(|o| (*o).clone())
    }

    /// Blocks the current thread until the task completes.
    pub fn wait(&self) -> Result<T, TaskError> {
        let mut inner = lock(&self.shared.inner);
        loop {
            if let Some(o) = &inner.outcome {
                return (**o).clone();
            }
            inner = self
                .shared
                .done
                .wait(inner)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// Blocks up to `timeout`; `None` if the task is still running.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T, TaskError>> {
        let deadline = Instant::now() + timeout;
        let mut inner = lock(&self.shared.inner);
        loop {
            if let Some(o) = &inner.outcome {
                return Some((**o).clone());
            }
            let left = deadline.checked_duration_since(Instant::now())?;
            inner = self
                .shared
                .done
                .wait_timeout(inner, left)
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .0;
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Future for TaskFuture<T> {
    type Output = Result<T, TaskError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(o) = self.try_outcome() {
            return Poll::Ready(o);
        }
        self.shared.waker.register(cx.waker());
        // re-check: completion may have raced with registration
        match self.try_outcome() {
            Some(o) => Poll::Ready(o),
            None => Poll::Pending,
        }
    }
}

impl<T: Send + Sync + 'static> std::fmt::Debug for TaskFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskFuture")
            .field("done", &self.is_done())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_listener_after_completion_runs_immediately() {
        let (c, fut) = task_pair::<u32>(Dispatcher::Direct);
        c.complete(Ok(7));

        let seen = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&seen);
        fut.on_success(move |v| {
            s.store(*v as usize, Ordering::SeqCst);
        });
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_dropped_completer_abandons() {
        let (c, fut) = task_pair::<u32>(Dispatcher::Direct);
        drop(c);
        assert_eq!(fut.wait(), Err(TaskError::Abandoned));
    }

    #[test]
    fn test_only_matching_listener_runs() {
        let (c, fut) = task_pair::<u32>(Dispatcher::Direct);
        let ok = Arc::new(AtomicUsize::new(0));
        let err = Arc::new(AtomicUsize::new(0));
        let (o, e) = (Arc::clone(&ok), Arc::clone(&err));
        fut.on_success(move |_| {
            o.fetch_add(1, Ordering::SeqCst);
        })
        .on_failure(move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        });

        c.complete(Err(TaskError::fail("boom")));
        assert_eq!(ok.load(Ordering::SeqCst), 0);
        assert_eq!(err.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_wait_timeout_pending() {
        let (_c, fut) = task_pair::<u32>(Dispatcher::Direct);
        assert_eq!(fut.wait_timeout(Duration::from_millis(5)), None);
        assert!(!fut.is_done());
    }

    #[test]
    fn test_panicking_listener_does_not_block_others() {
        let (c, fut) = task_pair::<u32>(Dispatcher::Direct);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        fut.on_complete(|_| panic!("listener bug"));
        fut.on_complete(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        c.complete(Ok(1));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_refused_listener_runs_inline() {
        use crate::executor::{ExecutorRef, ThreadPool};
        use crate::workers::ThreadWorkerFactory;

        let pool: ExecutorRef =
            Arc::new(ThreadPool::new("closed", 1, None, &ThreadWorkerFactory::new()).unwrap());
        pool.shutdown();

        let (c, fut) = task_pair::<u32>(Dispatcher::Executor(Arc::downgrade(&pool)));
        let ran_on = Arc::new(Mutex::new(None));
        let r = Arc::clone(&ran_on);
        fut.on_success(move |_| {
            *lock(&r) = Some(std::thread::current().id());
        });

        c.complete(Ok(3));
        assert_eq!(*lock(&ran_on), Some(std::thread::current().id()));
    }

    #[test]
    fn test_future_resolves() {
        let (c, fut) = task_pair::<&'static str>(Dispatcher::Direct);
        std::thread::spawn(move || c.complete(Ok("done")));
        assert_eq!(futures::executor::block_on(fut), Ok("done"));
    }
}
