use super::{MutexGuard, WaitQueue};
use crate::{arch::interrupts::IrqGuard, sched};

/// A condition variable.
///
/// Waiting releases the mutex of the given guard, sleeps until another
/// thread notifies the variable and acquires the mutex again.
///
/// `notify_one` wakes exactly the thread that waits the longest. If that
/// thread finds its condition still false it goes back to sleep, and the
/// notification is not passed on. Threads waiting for different
/// conditions on the same variable must be woken with `notify_all`.
///
/// A thread may also return from `wait` without being notified, so
/// conditions must be checked in a loop, as [`wait_while`](Self::wait_while) does.
pub struct Condvar {
    waiters: WaitQueue,
}

impl Condvar {
    pub const fn new() -> Self {
        Self {
            waiters: WaitQueue::new(),
        }
    }

    /// Block the running thread until this condition variable is notified.
    ///
    /// Before the scheduler runs this returns immediately.
    pub fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        if let Some(scheduler) = guard.scheduler() {
            let _irq = IrqGuard::new();
            self.waiters.wait_releasing(scheduler, guard.raw());
        }
        guard
    }

    /// Block the running thread as long as `condition` returns `true`.
    pub fn wait_while<'a, T>(
        &self,
        mut guard: MutexGuard<'a, T>,
        mut condition: impl FnMut(&mut T) -> bool,
    ) -> MutexGuard<'a, T> {
        while condition(&mut *guard) {
            guard = self.wait(guard);
        }
        guard
    }

    /// Wake the thread that waits the longest.
    ///
    /// Returns whether a thread was woken.
    pub fn notify_one(&self) -> bool {
        match sched::active() {
            Some(scheduler) => {
                let _irq = IrqGuard::new();
                self.waiters.wake_one(scheduler)
            }
            None => false,
        }
    }

    /// Wake every waiting thread.
    ///
    /// Returns the number of woken threads.
    pub fn notify_all(&self) -> usize {
        match sched::active() {
            Some(scheduler) => {
                let _irq = IrqGuard::new();
                self.waiters.wake_all(scheduler)
            }
            None => 0,
        }
    }

    /// The number of threads waiting on this condition variable.
    pub fn waiters(&self) -> usize {
        self.waiters.len()
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}
