//! Error types used by the lifecycle manager, providers, executors and workers.
//!
//! - [`ManagerError`] — precondition violations and provider failures surfaced by
//!   [`LifecycleManager`](crate::LifecycleManager).
//! - [`ProviderError`] — failures of an [`ExecutionProvider`](crate::ExecutionProvider).
//! - [`SubmitError`] — a submission was refused before the task was queued.
//! - [`TaskError`] — outcome of a submitted task that did not produce a value.
//! - [`WorkerError`] — spawning or joining a long-lived worker failed.
//! - [`RuntimeError`] — a group of threads did not stop within its grace period.
//! - [`InstanceError`] — deleting an application instance did not go cleanly.
//!
//! Every enum provides `as_label` (stable snake_case, for logs/metrics) and
//! `as_message` helpers.

use std::time::Duration;
use thiserror::Error;

use crate::core::{HandleId, ManagerId};
use crate::instance::InstanceId;

/// # Errors produced by the lifecycle manager.
///
/// Precondition variants are programming errors of the caller; they are
/// detected before the provider is consulted.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ManagerError {
    /// The handle was issued by a different manager.
    #[error("handle {handle} was issued by manager {actual}, not {expected}")]
    ForeignHandle {
        /// Handle passed to release.
        handle: HandleId,
        /// Manager that was asked to release it.
        expected: ManagerId,
        /// Manager that issued it.
        actual: ManagerId,
    },

    /// The handle was acquired for a different instance.
    #[error("handle acquired for {acquired} released for {released}")]
    InstanceMismatch {
        /// Instance the handle was acquired for.
        acquired: InstanceId,
        /// Instance given at release.
        released: InstanceId,
    },

    /// The provider failed; propagated unchanged.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl ManagerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ManagerError::ForeignHandle { .. } => "manager_foreign_handle",
            ManagerError::InstanceMismatch { .. } => "manager_instance_mismatch",
            ManagerError::Provider(e) => e.as_label(),
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ManagerError::ForeignHandle { handle, expected, .. } => {
                format!("foreign handle {handle} for manager {expected}")
            }
            ManagerError::InstanceMismatch { acquired, released } => {
                format!("instance mismatch: acquired={acquired} released={released}")
            }
            ManagerError::Provider(e) => e.as_message(),
        }
    }

    /// Indicates whether the error is a caller bug rather than a runtime condition.
    ///
    /// # Example
    /// ```
    /// use poolvisor::{InstanceId, ManagerError, ProviderError};
    ///
    /// let err = ManagerError::InstanceMismatch {
    ///     acquired: InstanceId::new(),
    ///     released: InstanceId::new(),
    /// };
    /// assert!(err.is_precondition());
    ///
    /// let err = ManagerError::from(ProviderError::ShutDown);
    /// assert!(!err.is_precondition());
    /// ```
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            ManagerError::ForeignHandle { .. } | ManagerError::InstanceMismatch { .. }
        )
    }
}

/// # Errors produced by execution providers.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The provider could not create an execution resource.
    #[error("failed to create executor: {reason}")]
    Spawn {
        /// Underlying failure.
        reason: String,
    },

    /// The resource being released was never handed out for this instance.
    #[error("no executor was handed out for {instance}")]
    UnknownExecutor {
        /// Instance given at release.
        instance: InstanceId,
    },

    /// The provider no longer hands out resources.
    #[error("provider is shut down")]
    ShutDown,
}

impl ProviderError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProviderError::Spawn { .. } => "provider_spawn",
            ProviderError::UnknownExecutor { .. } => "provider_unknown_executor",
            ProviderError::ShutDown => "provider_shut_down",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ProviderError::Spawn { reason } => format!("spawn: {reason}"),
            ProviderError::UnknownExecutor { instance } => format!("unknown executor: {instance}"),
            ProviderError::ShutDown => "provider shut down".to_string(),
        }
    }
}

impl From<WorkerError> for ProviderError {
    fn from(e: WorkerError) -> Self {
        ProviderError::Spawn {
            reason: e.to_string(),
        }
    }
}

/// # Errors returned when a submission is refused.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// The handle behind this executor has been released.
    #[error("executor handle {handle} has been released")]
    Released {
        /// Released handle.
        handle: HandleId,
    },

    /// The underlying resource refused the job.
    #[error("job rejected: {reason}")]
    Rejected {
        /// Why the resource refused it.
        reason: String,
    },
}

impl SubmitError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SubmitError::Released { .. } => "submit_released",
            SubmitError::Rejected { .. } => "submit_rejected",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            SubmitError::Released { handle } => format!("released handle {handle}"),
            SubmitError::Rejected { reason } => format!("rejected: {reason}"),
        }
    }
}

/// # Errors produced by submitted tasks.
///
/// Delivered to failure listeners and returned by [`TaskFuture::wait`](crate::TaskFuture::wait).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The task returned an error.
    #[error("task failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The task panicked.
    #[error("task panicked: {message}")]
    Panicked {
        /// Panic payload, when it was a string.
        message: String,
    },

    /// The job was dropped by the resource without running.
    #[error("task abandoned before it ran")]
    Abandoned,
}

impl TaskError {
    /// Shorthand for [`TaskError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        TaskError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use poolvisor::TaskError;
    ///
    /// assert_eq!(TaskError::fail("boom").as_label(), "task_failed");
    /// assert_eq!(TaskError::Abandoned.as_label(), "task_abandoned");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "task_failed",
            TaskError::Panicked { .. } => "task_panicked",
            TaskError::Abandoned => "task_abandoned",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            TaskError::Fail { error } => format!("error: {error}"),
            TaskError::Panicked { message } => format!("panic: {message}"),
            TaskError::Abandoned => "abandoned".to_string(),
        }
    }
}

/// # Errors produced by long-lived workers.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WorkerError {
    /// The OS refused to spawn the thread.
    #[error("failed to spawn worker {name:?}: {reason}")]
    Spawn {
        /// Worker name.
        name: String,
        /// Underlying failure.
        reason: String,
    },

    /// The worker panicked before it was joined.
    #[error("worker {name:?} panicked: {message}")]
    Panicked {
        /// Worker name.
        name: String,
        /// Panic payload, when it was a string.
        message: String,
    },

    /// The owning group has already been shut down.
    #[error("worker group is closed; refused {name:?}")]
    GroupClosed {
        /// Worker name.
        name: String,
    },
}

impl WorkerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerError::Spawn { .. } => "worker_spawn",
            WorkerError::Panicked { .. } => "worker_panicked",
            WorkerError::GroupClosed { .. } => "worker_group_closed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            WorkerError::Spawn { name, reason } => format!("spawn {name}: {reason}"),
            WorkerError::Panicked { name, message } => format!("panic in {name}: {message}"),
            WorkerError::GroupClosed { name } => format!("group closed: {name}"),
        }
    }
}

/// # Errors raised while stopping groups of threads.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Grace period was exceeded; the listed threads were left running detached.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Names of the threads that did not stop in time.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use poolvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::GraceExceeded { grace, stuck } => {
                format!("grace exceeded after {grace:?}; stuck={stuck:?}")
            }
        }
    }
}

/// # Errors produced while deleting an [`AppInstance`](crate::AppInstance).
///
/// Deletion always runs to the end; the first failure is reported.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum InstanceError {
    /// Some long-lived workers did not stop within the grace period.
    #[error(transparent)]
    Workers(#[from] RuntimeError),

    /// The executor handle could not be released.
    #[error(transparent)]
    Release(#[from] ManagerError),
}

impl InstanceError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            InstanceError::Workers(e) => e.as_label(),
            InstanceError::Release(e) => e.as_label(),
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            InstanceError::Workers(e) => e.as_message(),
            InstanceError::Release(e) => e.as_message(),
        }
    }
}

/// Extracts a printable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
