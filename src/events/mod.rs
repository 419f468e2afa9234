//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`, with optional fan-out
//!   to a [`SubscriberSet`](crate::SubscriberSet)
//!
//! ## Quick reference
//! - **Publishers**: `LifecycleManager`, `ListeningExecutor` (rejections),
//!   `DedicatedPoolProvider`, `SharedPoolProvider`, `WorkerGroup`, `AppInstance`,
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: user subscribers via `SubscriberSet`, raw `Bus::subscribe` receivers.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
