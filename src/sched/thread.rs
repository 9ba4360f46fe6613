//! Thread control blocks.

use super::{queue::QueueLink, Scheduler};
use crate::{
    arch::context::Continuation,
    mem::PhysAddr,
    sync::{Condvar, Mutex},
};
use core::{cell::Cell, cell::UnsafeCell, fmt, ptr::NonNull};

/// The function a thread runs.
///
/// It receives the scheduler the thread belongs to and the argument given
/// to [`Scheduler::create`]. Its return value is handed to the joiner.
pub type ThreadFn = fn(&'static Scheduler, usize) -> usize;

/// The scheduling state of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// The thread is on the CPU.
    Running,
    /// The thread waits in the ready queue.
    Ready,
    /// The thread waits in some wait queue.
    Blocked,
    /// The thread returned from its entry and waits to be joined.
    Finished,
}

/// What a joiner waits for.
#[derive(Debug, Default)]
pub(super) struct JoinState {
    pub finished: bool,
    pub result: usize,
}

/// The control block of a thread.
pub struct Thread {
    id: usize,
    name: &'static str,
    state: Cell<State>,
    pub(super) continuation: UnsafeCell<Continuation>,
    pub(super) entry: Option<ThreadFn>,
    pub(super) arg: usize,
    pub(super) stack: Option<PhysAddr>,
    pub(super) link: QueueLink,
    pub(super) join: Mutex<JoinState>,
    pub(super) done: Condvar,
    pub(super) scheduler: &'static Scheduler,
}

impl Thread {
    pub(super) fn new(
        id: usize,
        name: &'static str,
        entry: Option<ThreadFn>,
        arg: usize,
        stack: Option<PhysAddr>,
        scheduler: &'static Scheduler,
    ) -> Self {
        Self {
            id,
            name,
            state: Cell::new(State::Running),
            continuation: UnsafeCell::new(Continuation::new()),
            entry,
            arg,
            stack,
            link: QueueLink::new(),
            join: Mutex::new(JoinState::default()),
            done: Condvar::new(),
            scheduler,
        }
    }

    /// The unique id of this thread. The idle thread has id `0`.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> State {
        self.state.get()
    }

    pub(super) fn set_state(&self, state: State) {
        self.state.set(state);
    }

    /// Check if this thread was adopted from the boot context.
    pub fn is_idle(&self) -> bool {
        self.entry.is_none()
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state.get())
            .finish()
    }
}

/// Owning reference to a thread that was not joined yet.
///
/// Passing it to [`Scheduler::join`] is the only way to reclaim the
/// thread, so every thread is joined at most once.
#[must_use = "threads that are never joined leak their stack"]
pub struct ThreadHandle {
    pub(super) thread: NonNull<Thread>,
}

impl ThreadHandle {
    pub fn id(&self) -> usize {
        self.thread().id()
    }

    pub fn name(&self) -> &'static str {
        self.thread().name()
    }

    /// Check if the thread returned from its entry.
    pub fn is_finished(&self) -> bool {
        self.thread().state() == State::Finished
    }

    pub(super) fn thread(&self) -> &Thread {
        // SAFETY
        // The control block is only freed by `join`, which consumes the handle.
        unsafe { self.thread.as_ref() }
    }
}

impl fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThreadHandle").field(self.thread()).finish()
    }
}
