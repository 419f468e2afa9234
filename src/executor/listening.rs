//! # Listening decorator over a raw resource.
//!
//! [`ListeningExecutor`] is the only submission surface application code gets.
//! It wraps each task so its outcome lands in a [`TaskFuture`], and refuses
//! work once the [`ExecutorHandle`](crate::ExecutorHandle) it belongs to has
//! been released.
//!
//! The raw resource is held privately; there is no accessor for it.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use super::future::{Dispatcher, TaskFuture, task_pair};
use super::{ExecutorRef, Job, RejectedJob};
use crate::core::HandleState;
use crate::error::{SubmitError, TaskError, panic_message};
use crate::events::{Bus, Event, EventKind};

/// Where task listeners run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListenerDispatch {
    /// As separate jobs on the same raw resource (never on the submitting thread
    /// while the resource accepts work).
    #[default]
    Executor,
    /// On the thread that completes the task, or that attaches the listener
    /// after completion.
    Direct,
}

/// Submit-and-observe interface over a raw execution resource.
///
/// Cheap to clone; all clones share the owning handle's state.
#[derive(Clone)]
pub struct ListeningExecutor {
    raw: ExecutorRef,
    state: Option<Arc<HandleState>>,
    dispatch: ListenerDispatch,
    bus: Option<Bus>,
}

impl ListeningExecutor {
    pub(crate) fn managed(
        raw: ExecutorRef,
        state: Arc<HandleState>,
        dispatch: ListenerDispatch,
        bus: Bus,
    ) -> Self {
        Self {
            raw,
            state: Some(state),
            dispatch,
            bus: Some(bus),
        }
    }

    /// Decorates `raw` without a lifecycle handle.
    ///
    /// The caller keeps responsibility for shutting `raw` down; submissions are
    /// only refused when the resource itself refuses them.
    pub fn detached(raw: ExecutorRef) -> Self {
        Self {
            raw,
            state: None,
            dispatch: ListenerDispatch::default(),
            bus: None,
        }
    }

    /// Returns a copy that runs listeners according to `dispatch`.
    pub fn with_dispatch(mut self, dispatch: ListenerDispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Listener dispatch mode in effect.
    pub fn dispatch(&self) -> ListenerDispatch {
        self.dispatch
    }

    /// Returns true once the owning handle has been released.
    pub fn is_released(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.is_released())
    }

    /// Submits `task` and returns a future observing its outcome.
    ///
    /// A panic inside `task` is reported as [`TaskError::Panicked`].
    pub fn submit<T, F>(&self, task: F) -> Result<TaskFuture<T>, SubmitError>
    where
        F: FnOnce() -> Result<T, TaskError> + Send + 'static,
        T: Send + Sync + 'static,
    {
        self.ensure_active()?;

        let (completer, fut) = task_pair::<T>(self.dispatcher());
        let job: Job = Box::new(move || {
            let outcome = match catch_unwind(AssertUnwindSafe(task)) {
                Ok(res) => res,
                Err(payload) => Err(TaskError::Panicked {
                    message: panic_message(&*payload),
                }),
            };
            completer.complete(outcome);
        });

        self.raw.execute(job).map_err(|r| self.rejected(r))?;
        Ok(fut)
    }

    /// Fire-and-forget submission of `job`.
    pub fn execute<F>(&self, job: F) -> Result<(), SubmitError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.ensure_active()?;
        self.raw.execute(Box::new(job)).map_err(|r| self.rejected(r))
    }

    fn ensure_active(&self) -> Result<(), SubmitError> {
        match &self.state {
            Some(state) if state.is_released() => {
                let err = SubmitError::Released { handle: state.id() };
                self.publish_rejection(&err);
                Err(err)
            }
            _ => Ok(()),
        }
    }

    fn rejected(&self, r: RejectedJob) -> SubmitError {
        let err = SubmitError::from(r);
        self.publish_rejection(&err);
        err
    }

    fn publish_rejection(&self, err: &SubmitError) {
        tracing::debug!(error = %err, "submission rejected");
        let (Some(bus), Some(state)) = (&self.bus, &self.state) else {
            return;
        };
        bus.publish(
            Event::new(EventKind::SubmitRejected)
                .with_instance(state.instance())
                .with_handle(state.id())
                .with_reason(err.as_label()),
        );
    }

    fn dispatcher(&self) -> Dispatcher {
        match self.dispatch {
            ListenerDispatch::Executor => Dispatcher::Executor(Arc::downgrade(&self.raw)),
            ListenerDispatch::Direct => Dispatcher::Direct,
        }
    }
}

impl fmt::Debug for ListeningExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListeningExecutor")
            .field("executor", &self.raw.name())
            .field("handle", &self.state.as_ref().map(|s| s.id()))
            .field("dispatch", &self.dispatch)
            .finish()
    }
}
