//! Runtime core: handles and their lifecycle.
//!
//! The public API from this module is [`LifecycleManager`] (built through
//! [`ManagerBuilder`]), the [`ExecutorHandle`] it issues, and [`Config`].
//!
//! Internal modules:
//! - [`manager`]: acquire/release with precondition checks and event publishing;
//! - [`handle`]: handle identity, phase machine, raw-resource pairing;
//! - [`builder`]: wires bus, worker factory and subscribers;
//! - [`config`]: sentinel-based runtime settings.

mod builder;
mod config;
mod handle;
mod manager;

pub use builder::ManagerBuilder;
pub use config::Config;
pub use handle::{ExecutorHandle, HandleId, HandlePhase, ManagerId};
pub use manager::LifecycleManager;

pub(crate) use handle::HandleState;
