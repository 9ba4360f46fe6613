//! Synchronization primitives.
//!
//! [`IrqMutex`] is a spin lock that also keeps interrupts away from its
//! critical section. It is what the allocators and the scheduler use
//! internally, and it never puts a thread to sleep.
//!
//! [`Mutex`] and [`Condvar`] are for threads. Waiting on them hands the
//! CPU to the next ready thread through the scheduler.

mod condvar;
mod irq;
mod mutex;
mod wait_queue;

pub use condvar::Condvar;
pub use irq::{IrqMutex, IrqMutexGuard};
pub use mutex::{Mutex, MutexGuard};
pub use wait_queue::WaitQueue;
