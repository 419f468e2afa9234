//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait and the [`SubscriberSet`] that
//! fans runtime events out to subscribers attached to the [`Bus`](crate::Bus).
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   Manager/Provider ── publish(Event) ──► Bus ──► SubscriberSet::emit
//!                                                       │
//!                                             ┌─────────┼─────────┐
//!                                             ▼         ▼         ▼
//!                                         LogWriter  Metrics   Custom ...
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use poolvisor::{Event, EventKind, Subscribe};
//!
//! struct MetricsSubscriber;
//!
//! impl Subscribe for MetricsSubscriber {
//!     fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::PoolStarted {
//!             // increment pool counter
//!         }
//!     }
//! }
//! ```

mod embedded;
mod subscribe;
mod subscriber_set;

pub use subscribe::Subscribe;
pub use subscriber_set::SubscriberSet;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
