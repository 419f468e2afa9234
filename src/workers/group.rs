//! # Per-instance worker group.
//!
//! [`WorkerGroup`] records every worker an instance creates through a
//! [`WorkerFactory`] and stops them together when the instance is deleted.
//!
//! ## Shutdown
//! ```text
//! shutdown(grace)
//!   ├─► close group (later spawns fail with GroupClosed)
//!   ├─► cancel every worker token
//!   ├─► join finished workers until the deadline
//!   │     ├─ Ok     → WorkerStopped
//!   │     └─ panic  → WorkerPanicked
//!   ├─► workers still running at the deadline are detached (stuck)
//!   └─► WorkerGroupStopped; Err(GraceExceeded{stuck}) if any were stuck
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::{Worker, WorkerFactory};
use crate::error::{RuntimeError, WorkerError};
use crate::events::{Bus, Event, EventKind};
use crate::instance::InstanceId;
use crate::sync::lock;

/// Poll interval while waiting for workers to finish.
const JOIN_POLL: Duration = Duration::from_millis(2);

/// Workers owned by one application instance.
pub struct WorkerGroup {
    instance: InstanceId,
    factory: Arc<dyn WorkerFactory>,
    bus: Bus,
    workers: Mutex<Vec<Worker>>,
    closed: AtomicBool,
}

impl WorkerGroup {
    /// Creates an empty group for `instance`.
    pub fn new(instance: InstanceId, factory: Arc<dyn WorkerFactory>, bus: Bus) -> Self {
        Self {
            instance,
            factory,
            bus,
            workers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Starts a worker through the factory and records it.
    ///
    /// Fails with [`WorkerError::GroupClosed`] after [`shutdown`](Self::shutdown).
    pub fn spawn<F>(&self, name: &str, run: F) -> Result<(), WorkerError>
    where
        F: FnOnce(CancellationToken) + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(WorkerError::GroupClosed {
                name: name.to_string(),
            });
        }

        let worker = self.factory.new_worker(name, Box::new(run))?;
        let worker_name = worker.name().to_string();

        {
            let mut workers = lock(&self.workers);
            // shutdown may have drained the list between the check above and here
            if self.closed.load(Ordering::Acquire) {
                drop(workers);
                let _ = worker.stop();
                return Err(WorkerError::GroupClosed {
                    name: name.to_string(),
                });
            }
            workers.push(worker);
        }

        self.bus.publish(
            Event::new(EventKind::WorkerStarted)
                .with_instance(self.instance)
                .with_name(worker_name),
        );
        Ok(())
    }

    /// Number of workers currently tracked.
    pub fn len(&self) -> usize {
        lock(&self.workers).len()
    }

    /// Returns true if no workers are tracked.
    pub fn is_empty(&self) -> bool {
        lock(&self.workers).is_empty()
    }

    /// Sorted names of tracked workers.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.workers)
            .iter()
            .map(|w| w.name().to_string())
            .collect();
        names.sort_unstable();
        names
    }

    /// Returns true once [`shutdown`](Self::shutdown) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Cancels every worker and joins them within `grace`.
    ///
    /// Returns the number of workers joined. Idempotent: later calls find an
    /// empty group and return `Ok(0)`.
    pub fn shutdown(&self, grace: Duration) -> Result<usize, RuntimeError> {
        self.closed.store(true, Ordering::Release);
        let mut pending: Vec<Worker> = std::mem::take(&mut *lock(&self.workers));

        for w in &pending {
            w.cancel();
        }

        let deadline = Instant::now() + grace;
        let mut joined = 0usize;

        loop {
            let (finished, running): (Vec<Worker>, Vec<Worker>) =
                pending.into_iter().partition(Worker::is_finished);
            pending = running;

            for w in finished {
                joined += 1;
                self.report_join(w);
            }

            if pending.is_empty() || Instant::now() >= deadline {
                break;
            }
            thread::sleep(JOIN_POLL);
        }

        let stuck: Vec<String> = pending.iter().map(|w| w.name().to_string()).collect();

        let mut ev = Event::new(EventKind::WorkerGroupStopped)
            .with_instance(self.instance)
            .with_count(joined);
        if !stuck.is_empty() {
            ev = ev.with_reason(format!("stuck={stuck:?}"));
        }
        self.bus.publish(ev);

        if stuck.is_empty() {
            Ok(joined)
        } else {
            tracing::warn!(instance = %self.instance, ?stuck, "workers did not stop within grace");
            Err(RuntimeError::GraceExceeded { grace, stuck })
        }
    }

    fn report_join(&self, w: Worker) {
        let name = w.name().to_string();
        match w.join() {
            Ok(()) => self.bus.publish(
                Event::new(EventKind::WorkerStopped)
                    .with_instance(self.instance)
                    .with_name(name),
            ),
            Err(e) => self.bus.publish(
                Event::new(EventKind::WorkerPanicked)
                    .with_instance(self.instance)
                    .with_name(name)
                    .with_reason(e.to_string()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::ThreadWorkerFactory;

    fn group(bus: &Bus) -> WorkerGroup {
        WorkerGroup::new(
            InstanceId::new(),
            Arc::new(ThreadWorkerFactory::new()),
            bus.clone(),
        )
    }

    fn cooperative(ctx: CancellationToken) {
        while !ctx.is_cancelled() {
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_shutdown_stops_all_workers() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let g = group(&bus);

        g.spawn("a", cooperative).unwrap();
        g.spawn("b", cooperative).unwrap();
        assert_eq!(g.names(), vec!["a".to_string(), "b".to_string()]);

        assert_eq!(g.shutdown(Duration::from_secs(5)).unwrap(), 2);
        assert!(g.is_empty());

        let mut stopped = 0;
        let mut group_stopped = false;
        while let Ok(ev) = rx.try_recv() {
            match ev.kind {
                EventKind::WorkerStopped => stopped += 1,
                EventKind::WorkerGroupStopped => {
                    group_stopped = true;
                    assert_eq!(ev.count, Some(2));
                }
                _ => {}
            }
        }
        assert_eq!(stopped, 2);
        assert!(group_stopped);
    }

    #[test]
    fn test_spawn_after_shutdown_is_refused() {
        let bus = Bus::new(8);
        let g = group(&bus);
        g.shutdown(Duration::ZERO).unwrap();
        assert!(g.is_closed());
        assert!(matches!(
            g.spawn("late", cooperative),
            Err(WorkerError::GroupClosed { .. })
        ));
    }

    #[test]
    fn test_stuck_worker_is_reported() {
        let bus = Bus::new(8);
        let g = group(&bus);
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        // ignores its token until the test lets it go
        g.spawn("stubborn", move |_ctx| {
            let _ = release_rx.recv();
        })
        .unwrap();

        match g.shutdown(Duration::from_millis(20)) {
            Err(RuntimeError::GraceExceeded { stuck, .. }) => {
                assert_eq!(stuck, vec!["stubborn".to_string()]);
            }
            other => panic!("unexpected: {other:?}"),
        }
        let _ = release_tx.send(());
    }

    #[test]
    fn test_panicking_worker_is_reported() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let g = group(&bus);
        g.spawn("boom", |_ctx| panic!("bad worker")).unwrap();

        assert_eq!(g.shutdown(Duration::from_secs(5)).unwrap(), 1);
        let panicked = std::iter::from_fn(|| rx.try_recv().ok())
            .find(|ev| ev.kind == EventKind::WorkerPanicked)
            .expect("panic event");
        assert_eq!(panicked.name.as_deref(), Some("boom"));
    }
}
