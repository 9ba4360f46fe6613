use super::WaitQueue;
use crate::{
    arch::interrupts::IrqGuard,
    sched::{self, Scheduler},
};
use core::{
    cell::{Cell, UnsafeCell},
    fmt,
    ops::{Deref, DerefMut},
};

/// The lock state of a [`Mutex`], without the data.
pub struct RawMutex {
    occupied: Cell<bool>,
    waiters: WaitQueue,
}

// SAFETY
// `occupied` is only touched with interrupts disabled on a single CPU.
unsafe impl Sync for RawMutex {}

impl RawMutex {
    const fn new() -> Self {
        Self {
            occupied: Cell::new(false),
            waiters: WaitQueue::new(),
        }
    }

    /// Take the lock, sleeping as long as another thread holds it.
    pub(super) fn acquire(&self, scheduler: &Scheduler) {
        let _irq = IrqGuard::new();
        while self.occupied.get() {
            self.waiters.wait(scheduler);
        }
        self.occupied.set(true);
    }

    /// Drop the lock and wake the thread that waits for it the longest.
    pub(super) fn release(&self, scheduler: &Scheduler) {
        let _irq = IrqGuard::new();
        self.occupied.set(false);
        self.waiters.wake_one(scheduler);
    }

    fn is_locked(&self) -> bool {
        self.occupied.get()
    }
}

/// A mutual exclusion lock for threads.
///
/// Threads that find the lock taken sleep until it is released. Before
/// the scheduler runs there is only one flow of execution, and locking
/// does nothing.
pub struct Mutex<T> {
    raw: RawMutex,
    data: UnsafeCell<T>,
}

// SAFETY
// Access to `data` is serialized by `raw`.
unsafe impl<T: Send> Sync for Mutex<T> {}
unsafe impl<T: Send> Send for Mutex<T> {}

impl<T> Mutex<T> {
    /// Create a new mutex around `value`.
    pub const fn new(value: T) -> Self {
        Self {
            raw: RawMutex::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Acquire the lock, sleeping until it is available.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        let scheduler = sched::active();
        if let Some(scheduler) = scheduler {
            self.raw.acquire(scheduler);
        }

        MutexGuard {
            mutex: self,
            scheduler,
        }
    }

    /// Check if some thread holds the lock right now.
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    /// The number of threads sleeping until the lock is released.
    pub fn waiters(&self) -> usize {
        self.raw.waiters.len()
    }

    /// Consume the mutex and return the inner value.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex")
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

/// Gives access to the data of a locked [`Mutex`], and unlocks it when dropped.
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
    /// The scheduler that acquired the lock, `None` if it was taken
    /// before the scheduler ran.
    scheduler: Option<&'static Scheduler>,
}

impl<'a, T> MutexGuard<'a, T> {
    pub(super) fn raw(&self) -> &'a RawMutex {
        &self.mutex.raw
    }

    pub(super) fn scheduler(&self) -> Option<&'static Scheduler> {
        self.scheduler
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY
        // The guard proves that the lock is held.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY
        // The guard proves that the lock is held.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(scheduler) = self.scheduler {
            self.mutex.raw.release(scheduler);
        }
    }
}
