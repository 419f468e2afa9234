//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing from many sources (manager, providers, pools,
//! worker groups). Once a [`SubscriberSet`] is attached, every published event is
//! also handed to the set, which queues it for each subscriber.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                      Consumers:
//!   LifecycleManager ──┐
//!   Providers        ──┼──► Bus ──┬──► broadcast receivers (Bus::subscribe)
//!   WorkerGroup      ──┤          └──► SubscriberSet::emit ──► [queue] ──► worker ──► on_event
//!   AppInstance      ──┘
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; no receivers means the event is dropped.
//! - **Bounded capacity**: a single ring buffer stores recent events for all broadcast receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **Shared fan-out**: all clones share one (weakly held) `SubscriberSet`, attached once
//!   by the manager builder; providers created before the manager still reach subscribers.

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use tokio::sync::broadcast;

use super::event::Event;
use crate::subscribers::SubscriberSet;

/// Broadcast channel for runtime events.
///
/// ### Properties
/// - **Non-blocking**: `publish()` returns immediately.
/// - **Fire-and-forget**: no delivery or durability guarantees.
/// - **Cloneable**: cheap to clone (`Arc`-backed sender and fan-out).
#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
    fanout: Arc<OnceLock<Weak<SubscriberSet>>>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self {
            tx,
            fanout: Arc::new(OnceLock::new()),
        }
    }

    /// Attaches the subscriber set fed by this bus and all its clones.
    ///
    /// The set is held weakly: once its owner drops it, fan-out stops and its
    /// worker threads exit. Returns false if a set was already attached.
    pub(crate) fn attach(&self, subs: &Arc<SubscriberSet>) -> bool {
        self.fanout.set(Arc::downgrade(subs)).is_ok()
    }

    /// Publishes an event to the subscriber set and all broadcast receivers.
    pub fn publish(&self, ev: Event) {
        if let Some(subs) = self.fanout.get().and_then(Weak::upgrade) {
            subs.emit(&ev);
        }
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    ///
    /// - Each call creates an **independent** receiver.
    /// - A receiver only gets events **sent after** it subscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Bus::new(crate::core::Config::default().bus_capacity_clamped())
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("receivers", &self.tx.receiver_count())
            .field("fanout", &self.fanout.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[test]
    fn test_publish_reaches_receivers() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::PoolStarted).with_name("p"));

        let ev = rx.try_recv().expect("event");
        assert_eq!(ev.kind, EventKind::PoolStarted);
        assert_eq!(ev.name.as_deref(), Some("p"));
    }

    #[test]
    fn test_publish_without_receivers_is_noop() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::PoolShutdown));
    }

    #[test]
    fn test_lagged_receiver() {
        let bus = Bus::new(2);
        let mut rx = bus.subscribe();
        for _ in 0..5 {
            bus.publish(Event::new(EventKind::HandleAcquired));
        }
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(3))
        ));
    }
}
