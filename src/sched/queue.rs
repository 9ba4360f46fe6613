//! Intrusive FIFO queue of threads.
//!
//! Threads are linked through the [`QueueLink`] inside their control
//! block, so queueing never allocates. A thread is in at most one queue
//! at a time. Queues never own their threads.
//!
//! All queue operations must happen with interrupts disabled.

use super::Thread;
use core::{
    cell::Cell,
    ptr::{self, NonNull},
};

/// The part of a [`Thread`] that links it into a [`ThreadQueue`].
#[derive(Debug)]
pub struct QueueLink {
    prev: Cell<Option<NonNull<Thread>>>,
    next: Cell<Option<NonNull<Thread>>>,
    queue: Cell<*const ThreadQueue>,
}

impl QueueLink {
    pub const fn new() -> Self {
        Self {
            prev: Cell::new(None),
            next: Cell::new(None),
            queue: Cell::new(ptr::null()),
        }
    }

    /// Check if the thread is linked into any queue.
    pub fn is_queued(&self) -> bool {
        !self.queue.get().is_null()
    }
}

pub struct ThreadQueue {
    head: Cell<Option<NonNull<Thread>>>,
    tail: Cell<Option<NonNull<Thread>>>,
    len: Cell<usize>,
}

// SAFETY
// There is a single CPU and queues are only touched with interrupts
// disabled, so no two flows of execution ever access a queue at once.
unsafe impl Send for ThreadQueue {}
unsafe impl Sync for ThreadQueue {}

impl ThreadQueue {
    pub const fn new() -> Self {
        Self {
            head: Cell::new(None),
            tail: Cell::new(None),
            len: Cell::new(0),
        }
    }

    /// Append `thread` to the end of this queue.
    ///
    /// # Panics
    ///
    /// If the thread already is in a queue.
    pub fn push_back(&self, thread: &Thread) {
        let link = &thread.link;
        assert!(
            !link.is_queued(),
            "thread {} is already queued",
            thread.id()
        );

        let node = NonNull::from(thread);
        link.prev.set(self.tail.get());
        link.next.set(None);
        link.queue.set(self);

        match self.tail.get() {
            // SAFETY
            // Queued threads stay alive until they are removed.
            Some(tail) => unsafe { tail.as_ref() }.link.next.set(Some(node)),
            None => self.head.set(Some(node)),
        }
        self.tail.set(Some(node));
        self.len.set(self.len.get() + 1);
    }

    /// Remove the thread at the front of this queue.
    pub fn pop_front(&self) -> Option<NonNull<Thread>> {
        let head = self.head.get()?;
        // SAFETY
        // Queued threads stay alive until they are removed.
        self.unlink(unsafe { head.as_ref() });
        Some(head)
    }

    /// Remove `thread` from this queue.
    ///
    /// # Panics
    ///
    /// If the thread is not part of this queue.
    pub fn remove(&self, thread: &Thread) {
        assert!(
            ptr::eq(thread.link.queue.get(), self),
            "thread {} is not part of this queue",
            thread.id()
        );
        self.unlink(thread);
    }

    /// Check if `thread` is part of this queue.
    pub fn contains(&self, thread: &Thread) -> bool {
        ptr::eq(thread.link.queue.get(), self)
    }

    pub fn len(&self) -> usize {
        self.len.get()
    }

    pub fn is_empty(&self) -> bool {
        self.head.get().is_none()
    }

    fn unlink(&self, thread: &Thread) {
        let link = &thread.link;
        let (prev, next) = (link.prev.get(), link.next.get());

        // SAFETY
        // Neighbours are queued threads, and queued threads stay alive.
        match prev {
            Some(prev) => unsafe { prev.as_ref() }.link.next.set(next),
            None => self.head.set(next),
        }
        match next {
            Some(next) => unsafe { next.as_ref() }.link.prev.set(prev),
            None => self.tail.set(prev),
        }

        link.prev.set(None);
        link.next.set(None);
        link.queue.set(ptr::null());
        self.len.set(self.len.get() - 1);
    }
}

impl Default for ThreadQueue {
    fn default() -> Self {
        Self::new()
    }
}
