//! # Runtime events emitted by the manager, providers, pools and workers.
//!
//! [`EventKind`] classifies events into four groups:
//! - **Handle events**: acquisition and release through the lifecycle manager
//! - **Pool events**: raw resources started or shut down by providers
//! - **Worker events**: long-lived workers started, stopped, panicked
//! - **Subscriber events**: delivery problems inside the fan-out
//!
//! [`Event`] carries the metadata (instance, handle, thread/pool name, reason).
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use poolvisor::{Event, EventKind, InstanceId};
//!
//! let id = InstanceId::new();
//! let ev = Event::new(EventKind::WorkerStarted)
//!     .with_instance(id)
//!     .with_name("run-loop")
//!     .with_reason("boot");
//!
//! assert_eq!(ev.kind, EventKind::WorkerStarted);
//! assert_eq!(ev.instance, Some(id));
//! assert_eq!(ev.name.as_deref(), Some("run-loop"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::core::HandleId;
use crate::instance::InstanceId;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Handle events ===
    /// A handle was issued.
    ///
    /// Sets: `instance`, `handle`.
    HandleAcquired,

    /// A handle was released and its resource forwarded to the provider.
    ///
    /// Sets: `instance`, `handle`.
    HandleReleased,

    /// The provider failed to hand out a resource.
    ///
    /// Sets: `instance`, `reason`.
    AcquireFailed,

    /// Release was refused (precondition) or the provider failed to release.
    ///
    /// Sets: `instance`, `handle`, `reason`.
    ReleaseFailed,

    /// A submission through a listening executor was refused.
    ///
    /// Sets: `instance`, `handle`, `reason`.
    SubmitRejected,

    // === Pool events ===
    /// A provider started a raw resource.
    ///
    /// Sets: `name` (pool name), `instance` (first user), `count` (threads).
    PoolStarted,

    /// A provider shut a raw resource down.
    ///
    /// Sets: `name`, `instance` (last user).
    PoolShutdown,

    /// A pool did not terminate within the configured grace period.
    ///
    /// Sets: `name`, `reason`.
    PoolGraceExceeded,

    // === Worker events ===
    /// A long-lived worker was registered with an instance.
    ///
    /// Sets: `instance`, `name`.
    WorkerStarted,

    /// A long-lived worker was cancelled and joined.
    ///
    /// Sets: `instance`, `name`.
    WorkerStopped,

    /// A long-lived worker panicked.
    ///
    /// Sets: `instance`, `name`, `reason`.
    WorkerPanicked,

    /// All workers of an instance were stopped.
    ///
    /// Sets: `instance`, `count` (workers stopped), `reason` (stuck list, if any).
    WorkerGroupStopped,

    // === Instance events ===
    /// An application instance finished deletion.
    ///
    /// Sets: `instance`, `name`.
    InstanceDeleted,

    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `name` (subscriber), `reason` (panic message).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `name` (subscriber), `reason` (`full` or `closed`).
    SubscriberOverflow,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Application instance the event concerns.
    pub instance: Option<InstanceId>,
    /// Executor handle the event concerns.
    pub handle: Option<HandleId>,
    /// Worker, pool or subscriber name.
    pub name: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Thread or worker count.
    pub count: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            instance: None,
            handle: None,
            name: None,
            reason: None,
            count: None,
        }
    }

    /// Attaches an instance identity.
    #[inline]
    pub fn with_instance(mut self, instance: InstanceId) -> Self {
        self.instance = Some(instance);
        self
    }

    /// Attaches a handle id.
    #[inline]
    pub fn with_handle(mut self, handle: HandleId) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Attaches a worker, pool or subscriber name.
    #[inline]
    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a count (saturated to `u32`).
    #[inline]
    pub fn with_count(mut self, n: usize) -> Self {
        self.count = Some(u32::try_from(n).unwrap_or(u32::MAX));
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_name(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_name(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::new(EventKind::PoolStarted);
        let b = Event::new(EventKind::PoolShutdown);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_count_saturates() {
        let ev = Event::new(EventKind::WorkerGroupStopped).with_count(usize::MAX);
        assert_eq!(ev.count, Some(u32::MAX));
    }

    #[test]
    fn test_subscriber_overflow_reason() {
        let ev = Event::subscriber_overflow("audit", "full");
        assert!(ev.is_subscriber_event());
        assert_eq!(ev.name.as_deref(), Some("audit"));
        assert_eq!(ev.reason.as_deref(), Some("subscriber=audit reason=full"));
    }
}
