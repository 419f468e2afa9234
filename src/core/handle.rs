//! # Executor handles.
//!
//! An [`ExecutorHandle`] pairs the raw resource a provider handed out with the
//! [`ListeningExecutor`] built over it. The pairing is recorded only here: the
//! raw resource is visible to the `core` module alone, so the manager is the
//! single path through which it returns to the provider.
//!
//! ## State machine
//! ```text
//! Created ──activate()──► Active ──release()──► Released (terminal)
//! ```
//! Every clone of the listening executor observes the shared [`HandleState`];
//! once it reads `Released`, submissions fail with `SubmitError::Released`.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use crate::executor::{ExecutorRef, ListeningExecutor};
use crate::instance::InstanceId;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);
static NEXT_MANAGER: AtomicU64 = AtomicU64::new(1);

/// Identity of one acquisition. Never reused within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandleId(u64);

impl HandleId {
    pub(crate) fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle#{}", self.0)
    }
}

/// Identity of a [`LifecycleManager`](crate::LifecycleManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ManagerId(u64);

impl ManagerId {
    pub(crate) fn next() -> Self {
        Self(NEXT_MANAGER.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ManagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "manager#{}", self.0)
    }
}

/// Lifecycle phase of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlePhase {
    /// Constructed, not yet returned to the caller.
    Created,
    /// Returned by `acquire_handle`; submissions are accepted.
    Active,
    /// Passed to `release_handle`; submissions are refused.
    Released,
}

const CREATED: u8 = 0;
const ACTIVE: u8 = 1;
const RELEASED: u8 = 2;

/// State shared between a handle and every clone of its listening executor.
#[derive(Debug)]
pub(crate) struct HandleState {
    id: HandleId,
    instance: InstanceId,
    phase: AtomicU8,
}

impl HandleState {
    pub(crate) fn new(instance: InstanceId) -> Self {
        Self {
            id: HandleId::next(),
            instance,
            phase: AtomicU8::new(CREATED),
        }
    }

    pub(crate) fn id(&self) -> HandleId {
        self.id
    }

    pub(crate) fn instance(&self) -> InstanceId {
        self.instance
    }

    pub(crate) fn phase(&self) -> HandlePhase {
        match self.phase.load(Ordering::Acquire) {
            CREATED => HandlePhase::Created,
            ACTIVE => HandlePhase::Active,
            _ => HandlePhase::Released,
        }
    }

    /// Created → Active. No effect in any other phase.
    pub(crate) fn activate(&self) {
        let _ = self
            .phase
            .compare_exchange(CREATED, ACTIVE, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Moves to Released. Returns false if it already was.
    pub(crate) fn release(&self) -> bool {
        self.phase.swap(RELEASED, Ordering::AcqRel) != RELEASED
    }

    pub(crate) fn is_released(&self) -> bool {
        self.phase.load(Ordering::Acquire) == RELEASED
    }
}

/// Decorated execution resource issued by a [`LifecycleManager`](crate::LifecycleManager).
///
/// Neither `Clone` nor `Copy`: [`release_handle`](crate::LifecycleManager::release_handle)
/// consumes it, so a handle can be released at most once.
pub struct ExecutorHandle {
    raw: ExecutorRef,
    executor: ListeningExecutor,
    state: Arc<HandleState>,
    manager: ManagerId,
}

impl ExecutorHandle {
    pub(super) fn new(
        raw: ExecutorRef,
        executor: ListeningExecutor,
        state: Arc<HandleState>,
        manager: ManagerId,
    ) -> Self {
        Self {
            raw,
            executor,
            state,
            manager,
        }
    }

    /// Identity of this acquisition.
    pub fn id(&self) -> HandleId {
        self.state.id()
    }

    /// Instance the handle was acquired for.
    pub fn instance(&self) -> InstanceId {
        self.state.instance()
    }

    /// Current lifecycle phase.
    pub fn state(&self) -> HandlePhase {
        self.state.phase()
    }

    /// Submission interface over the raw resource.
    ///
    /// Clones outlive the handle but refuse work once it is released.
    pub fn executor(&self) -> &ListeningExecutor {
        &self.executor
    }

    pub(super) fn raw(&self) -> &ExecutorRef {
        &self.raw
    }

    pub(super) fn manager(&self) -> ManagerId {
        self.manager
    }

    pub(super) fn mark_released(&self) -> bool {
        self.state.release()
    }
}

impl Drop for ExecutorHandle {
    fn drop(&mut self) {
        if !self.state.is_released() {
            tracing::warn!(
                handle = %self.state.id(),
                instance = %self.state.instance(),
                "executor handle dropped without release; its resource is not returned to the provider"
            );
        }
    }
}

impl fmt::Debug for ExecutorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorHandle")
            .field("id", &self.state.id())
            .field("instance", &self.state.instance())
            .field("state", &self.state.phase())
            .field("manager", &self.manager)
            .finish()
    }
}
