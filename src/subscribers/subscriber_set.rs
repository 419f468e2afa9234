//! # Non-blocking event fan-out to multiple subscribers.
//!
//! Provides [`SubscriberSet`]: distributes events to multiple subscribers
//! concurrently without blocking the publisher.
//!
//! ## Architecture
//! ```text
//! emit(event)
//!     │
//!     ├──► [queue 1] ──► thread 1 ──► subscriber1.on_event()
//!     │    (bounded)         └──────► panic → SubscriberPanicked
//!     ├──► [queue 2] ──► thread 2 ──► subscriber2.on_event()
//!     │    (bounded)
//!     └──► [queue N] ──► thread N ──► subscriberN.on_event()
//!          (bounded)
//! ```
//!
//! ## Rules
//! - **No cross-subscriber ordering**: subscriber A may process event N while B processes N+5
//! - **Overflow**: event dropped for that subscriber only, `SubscriberOverflow` published
//! - **Non-blocking**: `emit()` returns immediately (uses `try_send`)
//! - **Isolation**: slow/panicking subscriber doesn't affect others
//! - **Per-subscriber FIFO**: each subscriber sees events in order
//! - **Threads**: one long-lived worker per subscriber, created through the
//!   [`WorkerFactory`]; it exits once its queue is closed. The owning
//!   `LifecycleManager` calls [`SubscriberSet::shutdown`] when dropped, so
//!   queued events are delivered before it goes away
//!
//! ## Panic handling
//! Workers use `catch_unwind` to isolate panics:
//! - Panic is caught and converted to `SubscriberPanicked` event
//! - Worker continues processing next event
//!
//! **Warning**: `AssertUnwindSafe` is used, which can leave shared state inconsistent
//! if subscriber uses `Arc<Mutex<T>>` and panics while holding the lock.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::{WorkerError, panic_message};
use crate::events::{Bus, Event};
use crate::subscribers::Subscribe;
use crate::workers::{Worker, WorkerFactory};

/// Per-subscriber channel metadata.
struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Fan-out coordinator for multiple event subscribers.
pub struct SubscriberSet {
    channels: Vec<SubscriberChannel>,
    workers: Vec<Worker>,
    bus: Bus,
}

impl SubscriberSet {
    /// Creates a new set and starts one worker thread per subscriber.
    ///
    /// ### Per-subscriber setup
    /// - Bounded mpsc queue (capacity from [`Subscribe::queue_capacity`], min 1)
    /// - Dedicated thread named `subscriber-{name}` from `factory`
    /// - Panic isolation via `catch_unwind`
    pub fn new(
        subs: Vec<Arc<dyn Subscribe>>,
        bus: Bus,
        factory: &dyn WorkerFactory,
    ) -> Result<Self, WorkerError> {
        let mut channels = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let cap = sub.queue_capacity().max(1);
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(cap);
            let bus_for_worker = bus.clone();

            let worker = factory.new_worker(
                &format!("subscriber-{name}"),
                Box::new(move |_ctx| {
                    while let Some(ev) = rx.blocking_recv() {
                        let s = &sub;
                        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| s.on_event(&ev))) {
                            bus_for_worker.publish(Event::subscriber_panicked(
                                s.name(),
                                panic_message(&*payload),
                            ));
                        }
                    }
                }),
            )?;
            channels.push(SubscriberChannel { name, sender: tx });
            workers.push(worker);
        }

        Ok(Self {
            channels,
            workers,
            bus,
        })
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns true if the set has no subscribers.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Emits an event to all subscribers (clones the event once).
    pub fn emit(&self, event: &Event) {
        if self.channels.is_empty() {
            return;
        }
        self.emit_arc(Arc::new(event.clone()));
    }

    /// Emits a pre-allocated `Arc<Event>` to all subscribers.
    ///
    /// - Uses `try_send` (non-blocking)
    /// - On queue full: drops event, publishes `SubscriberOverflow`
    /// - On queue closed: publishes `SubscriberOverflow` with reason "closed"
    ///
    /// Overflow events that overflow themselves are not re-published.
    pub fn emit_arc(&self, event: Arc<Event>) {
        let is_overflow_evt = event.is_subscriber_event();

        for channel in &self.channels {
            match channel.sender.try_send(Arc::clone(&event)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    if !is_overflow_evt {
                        self.bus
                            .publish(Event::subscriber_overflow(channel.name, "full"));
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    if !is_overflow_evt {
                        self.bus
                            .publish(Event::subscriber_overflow(channel.name, "closed"));
                    }
                }
            }
        }
    }

    /// Closes every queue and waits for the workers to drain and exit.
    pub fn shutdown(self) {
        drop(self.channels);

        for w in self.workers {
            if let Err(e) = w.join() {
                tracing::warn!(error = %e, "subscriber worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::workers::ThreadWorkerFactory;
    use std::sync::Mutex;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    struct Collect(Mutex<std_mpsc::Sender<EventKind>>);

    impl Subscribe for Collect {
        fn on_event(&self, ev: &Event) {
            let _ = self.0.lock().unwrap().send(ev.kind);
        }
        fn name(&self) -> &'static str {
            "collect"
        }
    }

    struct Explode;

    impl Subscribe for Explode {
        fn on_event(&self, _ev: &Event) {
            panic!("subscriber bug");
        }
        fn name(&self) -> &'static str {
            "explode"
        }
    }

    #[test]
    fn test_delivers_in_order() {
        let (tx, rx) = std_mpsc::channel();
        let set = SubscriberSet::new(
            vec![Arc::new(Collect(Mutex::new(tx)))],
            Bus::new(8),
            &ThreadWorkerFactory::new(),
        )
        .unwrap();
        assert_eq!(set.len(), 1);

        set.emit(&Event::new(EventKind::HandleAcquired));
        set.emit(&Event::new(EventKind::HandleReleased));

        let timeout = Duration::from_secs(5);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), EventKind::HandleAcquired);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), EventKind::HandleReleased);
        set.shutdown();
    }

    #[test]
    fn test_panic_is_reported_on_bus() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let set = SubscriberSet::new(vec![Arc::new(Explode)], bus, &ThreadWorkerFactory::new()).unwrap();

        set.emit(&Event::new(EventKind::PoolStarted));
        set.shutdown();

        let ev = rx.try_recv().expect("panic event");
        assert_eq!(ev.kind, EventKind::SubscriberPanicked);
        assert_eq!(ev.name.as_deref(), Some("explode"));
        assert_eq!(ev.reason.as_deref(), Some("subscriber bug"));
    }

    #[test]
    fn test_empty_set_is_noop() {
        let set = SubscriberSet::new(Vec::new(), Bus::new(1), &ThreadWorkerFactory::new()).unwrap();
        assert!(set.is_empty());
        set.emit(&Event::new(EventKind::PoolShutdown));
        set.shutdown();
    }
}
