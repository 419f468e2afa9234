//! # LogWriter — events as `tracing` records
//!
//! A minimal subscriber that renders incoming [`Event`]s through `tracing`.
//! Problems (failures, panics, overflow, stuck threads) are logged at `warn`,
//! the rest at `info`.
//!
//! ## Example output (with `tracing_subscriber::fmt`)
//! ```text
//! INFO poolvisor: handle acquired instance=instance#1 handle=handle#1
//! INFO poolvisor: pool started pool="poolvisor-shared" threads=8
//! WARN poolvisor: submit rejected instance=instance#1 handle=handle#1 reason="submit_released"
//! INFO poolvisor: instance deleted instance=instance#1 name="default"
//! ```

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Subscribe for LogWriter {
    fn on_event(&self, e: &Event) {
        let instance = e.instance.map(|i| i.to_string()).unwrap_or_default();
        let handle = e.handle.map(|h| h.to_string()).unwrap_or_default();
        let name = e.name.as_deref().unwrap_or("");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::HandleAcquired => {
                tracing::info!(target: "poolvisor", %instance, %handle, "handle acquired");
            }
            EventKind::HandleReleased => {
                tracing::info!(target: "poolvisor", %instance, %handle, "handle released");
            }
            EventKind::AcquireFailed => {
                tracing::warn!(target: "poolvisor", %instance, reason, "acquire failed");
            }
            EventKind::ReleaseFailed => {
                tracing::warn!(target: "poolvisor", %instance, %handle, reason, "release failed");
            }
            EventKind::SubmitRejected => {
                tracing::warn!(target: "poolvisor", %instance, %handle, reason, "submit rejected");
            }
            EventKind::PoolStarted => {
                tracing::info!(target: "poolvisor", pool = name, threads = ?e.count, "pool started");
            }
            EventKind::PoolShutdown => {
                tracing::info!(target: "poolvisor", pool = name, %instance, "pool shut down");
            }
            EventKind::PoolGraceExceeded => {
                tracing::warn!(target: "poolvisor", pool = name, reason, "pool grace exceeded");
            }
            EventKind::WorkerStarted => {
                tracing::info!(target: "poolvisor", %instance, worker = name, "worker started");
            }
            EventKind::WorkerStopped => {
                tracing::info!(target: "poolvisor", %instance, worker = name, "worker stopped");
            }
            EventKind::WorkerPanicked => {
                tracing::warn!(target: "poolvisor", %instance, worker = name, reason, "worker panicked");
            }
            EventKind::WorkerGroupStopped => {
                tracing::info!(target: "poolvisor", %instance, stopped = ?e.count, reason, "workers stopped");
            }
            EventKind::InstanceDeleted => {
                tracing::info!(target: "poolvisor", %instance, name, "instance deleted");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(target: "poolvisor", subscriber = name, reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                tracing::warn!(target: "poolvisor", subscriber = name, reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
