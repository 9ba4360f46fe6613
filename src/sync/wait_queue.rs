use crate::sched::{Scheduler, ThreadQueue};

/// Threads waiting for something to happen.
///
/// Every operation requires interrupts to be disabled.
pub struct WaitQueue {
    queue: ThreadQueue,
}

impl WaitQueue {
    pub const fn new() -> Self {
        Self {
            queue: ThreadQueue::new(),
        }
    }

    /// Put the running thread to sleep until it is woken.
    ///
    /// The idle thread only lets the other threads run once and returns.
    pub fn wait(&self, scheduler: &Scheduler) {
        scheduler.block_current(&self.queue);
    }

    /// Release `mutex`, sleep until woken and acquire `mutex` again.
    ///
    /// Releasing and going to sleep happens without any other thread
    /// running in between, so no wakeup can get lost.
    pub(crate) fn wait_releasing(&self, scheduler: &Scheduler, mutex: &super::mutex::RawMutex) {
        mutex.release(scheduler);
        self.wait(scheduler);
        mutex.acquire(scheduler);
    }

    /// Wake the thread that waits the longest.
    ///
    /// Returns whether there was a thread to wake.
    pub fn wake_one(&self, scheduler: &Scheduler) -> bool {
        match self.queue.pop_front() {
            Some(thread) => {
                scheduler.make_ready(thread);
                true
            }
            None => false,
        }
    }

    /// Wake every waiting thread, in the order they started waiting.
    ///
    /// Returns the number of woken threads.
    pub fn wake_all(&self, scheduler: &Scheduler) -> usize {
        let mut woken = 0;
        while self.wake_one(scheduler) {
            woken += 1;
        }
        woken
    }

    /// The number of threads that are waiting.
    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}
