//! Cooperative scheduling of kernel threads on a single CPU.
//!
//! Threads give up the CPU only at explicit points: when they yield,
//! when they wait on a [`Mutex`](crate::sync::Mutex) or
//! [`Condvar`](crate::sync::Condvar), when they finish, or every
//! [`YIELD_TICKS`] timer ticks through [`Scheduler::timer_tick`].
//!
//! The context that calls [`Scheduler::init`] becomes the idle thread.
//! It is never put to sleep: whenever it would block it is put back into
//! the ready queue instead, so there always is a thread that can run.

mod queue;
mod thread;

pub use queue::ThreadQueue;
pub use thread::{State, Thread, ThreadFn, ThreadHandle};

use crate::{
    arch::{
        context::{self, Continuation},
        interrupts::{self, IrqGuard},
    },
    mem::{self, Error, ObjectAllocator, PageAllocator, SlabCache, PAGE_SIZE},
};
use core::{
    cell::Cell,
    ptr::{self, NonNull},
};

/// Threads run on stacks of `2^THREAD_STACK_ORDER` pages.
pub const THREAD_STACK_ORDER: usize = 2;

/// The size of a thread stack in bytes.
pub const THREAD_STACK_SIZE: usize = (1 << THREAD_STACK_ORDER) * PAGE_SIZE;

/// The running thread is switched out every `YIELD_TICKS` timer ticks.
///
/// At the programmable interval timer's rate of ~30Hz this is about once per second.
pub const YIELD_TICKS: usize = 30;

/// What happens to the running thread when it gives up the CPU.
#[derive(Clone, Copy)]
pub enum Transition<'q> {
    /// Append it to the ready queue.
    Ready,
    /// Append it to the given wait queue.
    Blocked(&'q ThreadQueue),
    /// It returned from its entry. Append it to the finished queue.
    Finished,
}

pub struct Scheduler {
    pages: &'static PageAllocator,
    objects: &'static ObjectAllocator,
    threads: spin::Once<&'static SlabCache>,
    ready: ThreadQueue,
    finished: ThreadQueue,
    current: Cell<Option<NonNull<Thread>>>,
    next_id: Cell<usize>,
    ticks: Cell<usize>,
}

// SAFETY
// The scheduler is only used from a single CPU, and every piece of mutable
// state is touched with interrupts disabled.
unsafe impl Sync for Scheduler {}
unsafe impl Send for Scheduler {}

impl Scheduler {
    /// Create a scheduler that allocates stacks from `pages` and control
    /// blocks from `objects`.
    ///
    /// Nothing can be scheduled before [`init`](Self::init) is called.
    pub fn new(pages: &'static PageAllocator, objects: &'static ObjectAllocator) -> Self {
        Self {
            pages,
            objects,
            threads: spin::Once::new(),
            ready: ThreadQueue::new(),
            finished: ThreadQueue::new(),
            current: Cell::new(None),
            next_id: Cell::new(1),
            ticks: Cell::new(0),
        }
    }

    /// Adopt the calling context as the idle thread and start scheduling.
    ///
    /// From now on [`Mutex`](crate::sync::Mutex) and
    /// [`Condvar`](crate::sync::Condvar) put threads to sleep.
    pub fn init(&'static self) -> mem::Result<()> {
        if self.threads.get().is_some() {
            return Err(Error::AlreadyInitialized);
        }

        let cache = self.objects.create_for::<Thread>("thread")?;
        let idle = self.objects.alloc(cache)?.cast::<Thread>();
        // SAFETY
        // The memory was just allocated for a `Thread`.
        unsafe { idle.as_ptr().write(Thread::new(0, "idle", None, 0, None, self)) };

        self.threads.call_once(|| cache);
        self.current.set(Some(idle));
        active::set(self);

        log::info!("scheduler is running");
        Ok(())
    }

    /// Check if [`init`](Self::init) was called.
    pub fn is_running(&self) -> bool {
        self.current.get().is_some()
    }

    /// The thread that is on the CPU right now.
    ///
    /// # Panics
    ///
    /// If the scheduler is not running.
    pub fn current(&self) -> &Thread {
        // SAFETY
        // The running thread is never freed.
        unsafe { self.current_ptr().as_ref() }
    }

    /// Create a new thread that runs `entry(self, arg)`.
    ///
    /// The thread is appended to the ready queue and first runs when
    /// every thread in front of it had its turn.
    pub fn create(
        &'static self,
        entry: ThreadFn,
        arg: usize,
        name: &'static str,
    ) -> mem::Result<ThreadHandle> {
        let cache = *self
            .threads
            .get()
            .unwrap_or_else(|| panic!("tried to create thread `{}` before the scheduler runs", name));

        let stack = self.pages.alloc(THREAD_STACK_ORDER)?;
        let memory = match self.objects.alloc(cache) {
            Ok(memory) => memory.cast::<Thread>(),
            Err(err) => {
                self.pages.free(stack);
                return Err(err);
            }
        };

        let id = self.next_id.get();
        self.next_id.set(id + 1);

        // SAFETY
        // The memory was just allocated for a `Thread`, and the stack is
        // owned by the thread until it is joined.
        let thread = unsafe {
            memory
                .as_ptr()
                .write(Thread::new(id, name, Some(entry), arg, Some(stack), self));
            *(*memory.as_ptr()).continuation.get() = Continuation::prepare(
                self.pages.to_virt(stack),
                THREAD_STACK_SIZE,
                thread_start,
                memory.as_ptr() as usize,
            );
            memory.as_ref()
        };

        let _irq = IrqGuard::new();
        thread.set_state(State::Ready);
        self.ready.push_back(thread);
        log::debug!("created thread {} `{}`", id, name);

        Ok(ThreadHandle { thread: memory })
    }

    /// Move the running thread according to `transition` and switch to
    /// the first thread of the ready queue.
    ///
    /// Returns once the running thread is resumed. Interrupts must be
    /// disabled by the caller.
    ///
    /// # Panics
    ///
    /// If the ready queue is empty, if the idle thread tries to block or
    /// finish, or if a finished thread would be resumed.
    pub fn schedule(&self, transition: Transition<'_>) {
        debug_assert!(
            !interrupts::are_enabled(),
            "schedule requires interrupts to be disabled"
        );

        let current_ptr = self.current_ptr();
        // SAFETY
        // The running thread is never freed.
        let current = unsafe { current_ptr.as_ref() };

        match transition {
            Transition::Ready => {
                current.set_state(State::Ready);
                self.ready.push_back(current);
            }
            Transition::Blocked(queue) => {
                assert!(!current.is_idle(), "the idle thread must never block");
                current.set_state(State::Blocked);
                queue.push_back(current);
            }
            Transition::Finished => {
                assert!(!current.is_idle(), "the idle thread must never finish");
                current.set_state(State::Finished);
                self.finished.push_back(current);
            }
        }

        let next_ptr = self
            .ready
            .pop_front()
            .unwrap_or_else(|| panic!("no thread is ready to run"));
        // SAFETY
        // Threads in the ready queue are alive.
        let next = unsafe { next_ptr.as_ref() };
        assert!(
            next.state() == State::Ready,
            "tried to resume thread {} in state {:?}",
            next.id(),
            next.state()
        );
        next.set_state(State::Running);

        if next_ptr == current_ptr {
            return;
        }

        log::trace!("switch from thread {} to thread {}", current.id(), next.id());
        self.current.set(Some(next_ptr));
        // SAFETY
        // `next` is suspended or freshly prepared, and `current` stays
        // alive while it is suspended.
        unsafe { context::swap(current.continuation.get(), next.continuation.get()) };
    }

    /// Give up the CPU, but stay ready to run.
    pub fn yield_now(&self) {
        let _irq = IrqGuard::new();
        self.schedule(Transition::Ready);
    }

    /// Account one tick of the timer interrupt.
    ///
    /// `acknowledge` must signal the end of the interrupt to the interrupt
    /// controller. It always runs, and it runs before the running thread
    /// is switched out.
    pub fn timer_tick(&self, acknowledge: impl FnOnce()) {
        let ticks = self.ticks.get().wrapping_add(1);
        self.ticks.set(ticks);
        acknowledge();

        if self.is_running() && ticks % YIELD_TICKS == 0 {
            let _irq = IrqGuard::new();
            self.schedule(Transition::Ready);
        }
    }

    /// The number of timer ticks seen so far.
    pub fn ticks(&self) -> usize {
        self.ticks.get()
    }

    /// Wait until the thread of `handle` finished, reclaim it and return
    /// the value its entry returned.
    pub fn join(&self, handle: ThreadHandle) -> usize {
        let thread = handle.thread();
        assert!(
            self.is_running(),
            "tried to join thread {} before the scheduler runs",
            thread.id()
        );

        let result = {
            let state = thread.join.lock();
            let state = thread.done.wait_while(state, |state| !state.finished);
            state.result
        };

        let _irq = IrqGuard::new();
        self.finished.remove(thread);
        let stack = thread.stack;
        log::debug!("reclaimed thread {} `{}`", thread.id(), thread.name());

        // SAFETY
        // The thread finished and left every queue, nothing references it anymore.
        unsafe { ptr::drop_in_place(handle.thread.as_ptr()) };
        if let Some(stack) = stack {
            self.pages.free(stack);
        }
        self.objects.free(handle.thread.cast());

        result
    }

    /// The number of threads waiting in the ready queue.
    pub fn ready_count(&self) -> usize {
        self.ready.len()
    }

    /// Block the running thread on `queue`.
    ///
    /// The idle thread stays ready instead, and simply lets the other
    /// threads run once.
    pub(crate) fn block_current(&self, queue: &ThreadQueue) {
        if self.current().is_idle() {
            self.schedule(Transition::Ready);
        } else {
            self.schedule(Transition::Blocked(queue));
        }
    }

    /// Move a thread that was taken out of a wait queue to the ready queue.
    pub(crate) fn make_ready(&self, thread: NonNull<Thread>) {
        // SAFETY
        // Threads in wait queues are alive.
        let thread = unsafe { thread.as_ref() };
        thread.set_state(State::Ready);
        self.ready.push_back(thread);
    }

    fn current_ptr(&self) -> NonNull<Thread> {
        self.current
            .get()
            .unwrap_or_else(|| panic!("the scheduler is not running"))
    }
}

/// The first function every created thread runs.
extern "C" fn thread_start(arg: usize) -> ! {
    // SAFETY
    // `create` passes a pointer to the control block, which lives until
    // the thread is joined, and joining requires the thread to finish.
    let thread = unsafe { &*(arg as *const Thread) };
    let scheduler = thread.scheduler;

    interrupts::enable();
    let result = match thread.entry {
        Some(entry) => entry(scheduler, thread.arg),
        None => panic!("thread {} has no entry", thread.id()),
    };

    // keep interrupts off until the thread is switched out for good,
    // a joiner may only run once the thread is in the finished queue
    let _irq = IrqGuard::new();
    {
        let mut state = thread.join.lock();
        state.finished = true;
        state.result = result;
        thread.done.notify_all();
    }

    scheduler.schedule(Transition::Finished);
    panic!("finished thread {} was resumed", thread.id())
}

/// The scheduler that runs on this CPU.
pub fn active() -> Option<&'static Scheduler> {
    active::get()
}

#[cfg(not(test))]
mod active {
    use super::Scheduler;
    use core::{
        ptr,
        sync::atomic::{AtomicPtr, Ordering},
    };

    static ACTIVE: AtomicPtr<Scheduler> = AtomicPtr::new(ptr::null_mut());

    pub fn get() -> Option<&'static Scheduler> {
        // SAFETY
        // Only `'static` schedulers are ever stored.
        unsafe { ACTIVE.load(Ordering::Acquire).as_ref() }
    }

    pub fn set(scheduler: &'static Scheduler) {
        ACTIVE.store(scheduler as *const _ as *mut _, Ordering::Release);
    }
}

// every test boots its own machine on its own OS thread, which acts as its CPU
#[cfg(test)]
mod active {
    use super::Scheduler;
    use std::cell::Cell;

    std::thread_local! {
        static ACTIVE: Cell<Option<&'static Scheduler>> = const { Cell::new(None) };
    }

    pub fn get() -> Option<&'static Scheduler> {
        ACTIVE.with(Cell::get)
    }

    pub fn set(scheduler: &'static Scheduler) {
        ACTIVE.with(|active| active.set(Some(scheduler)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        sync::{Condvar, Mutex},
        testing,
        unit::MIB,
    };
    use std::cell::RefCell;

    type Log = RefCell<Vec<(usize, usize)>>;

    fn new_log() -> &'static Log {
        Box::leak(Box::new(RefCell::new(Vec::new())))
    }

    fn log_of(arg: usize) -> &'static Log {
        // SAFETY
        // Every test passes a leaked log.
        unsafe { &*(arg as *const Log) }
    }

    fn record(scheduler: &'static Scheduler, arg: usize) -> usize {
        log_of(arg)
            .borrow_mut()
            .push((scheduler.current().id(), 0));
        0
    }

    fn steps(scheduler: &'static Scheduler, arg: usize) -> usize {
        for step in 0..3 {
            log_of(arg)
                .borrow_mut()
                .push((scheduler.current().id(), step));
            scheduler.yield_now();
        }
        0
    }

    #[test]
    fn new_threads_run_in_creation_order() {
        let core = testing::boot(4 * MIB);
        let scheduler = core.scheduler;
        let log = new_log();
        let arg = log as *const Log as usize;

        let handles = [
            scheduler.create(record, arg, "first").unwrap(),
            scheduler.create(record, arg, "second").unwrap(),
            scheduler.create(record, arg, "third").unwrap(),
        ];
        let ids: Vec<_> = handles.iter().map(|handle| (handle.id(), 0)).collect();
        assert_eq!(scheduler.ready_count(), 3);
        assert!(log.borrow().is_empty());

        for handle in handles {
            scheduler.join(handle);
        }
        assert_eq!(*log.borrow(), ids);
        assert_eq!(scheduler.ready_count(), 0);
    }

    #[test]
    fn yielding_threads_take_turns() {
        let core = testing::boot(4 * MIB);
        let scheduler = core.scheduler;
        let log = new_log();
        let arg = log as *const Log as usize;

        let a = scheduler.create(steps, arg, "a").unwrap();
        let b = scheduler.create(steps, arg, "b").unwrap();
        let (a_id, b_id) = (a.id(), b.id());
        scheduler.join(a);
        scheduler.join(b);

        assert_eq!(
            *log.borrow(),
            vec![(a_id, 0), (b_id, 0), (a_id, 1), (b_id, 1), (a_id, 2), (b_id, 2)]
        );
    }

    #[test]
    fn join_returns_the_result_of_the_entry() {
        let core = testing::boot(4 * MIB);
        let handle = core
            .scheduler
            .create(|_, arg| arg * 2, 21, "double")
            .unwrap();

        assert!(!handle.is_finished());
        assert_eq!(core.scheduler.join(handle), 42);
    }

    #[test]
    fn joined_threads_give_back_their_memory() {
        let core = testing::boot(4 * MIB);
        let free = core.pages.free_bytes();

        let handle = core.scheduler.create(|_, _| 7, 0, "short").unwrap();
        assert_eq!(core.pages.free_bytes(), free - THREAD_STACK_SIZE);
        core.scheduler.yield_now();
        assert!(handle.is_finished());

        assert_eq!(core.scheduler.join(handle), 7);
        assert_eq!(core.pages.free_bytes(), free);
    }

    fn bump(scheduler: &'static Scheduler, arg: usize) -> usize {
        // SAFETY
        // The test passes a leaked mutex.
        let counter = unsafe { &*(arg as *const Mutex<usize>) };
        for _ in 0..5 {
            let mut value = counter.lock();
            let old = *value;
            scheduler.yield_now();
            *value = old + 1;
        }
        0
    }

    #[test]
    fn mutex_excludes_across_yields() {
        let core = testing::boot(4 * MIB);
        let scheduler = core.scheduler;
        let counter: &'static Mutex<usize> = Box::leak(Box::new(Mutex::new(0)));
        let arg = counter as *const Mutex<usize> as usize;

        let a = scheduler.create(bump, arg, "a").unwrap();
        let b = scheduler.create(bump, arg, "b").unwrap();
        scheduler.yield_now();
        assert!(counter.is_locked());
        assert_eq!(counter.waiters(), 1);

        scheduler.join(a);
        scheduler.join(b);
        assert!(!counter.is_locked());
        assert_eq!(*counter.lock(), 10);
    }

    struct Gate {
        lock: Mutex<()>,
        open: Condvar,
        log: Log,
    }

    fn pass_gate(scheduler: &'static Scheduler, arg: usize) -> usize {
        // SAFETY
        // The test passes a leaked gate.
        let gate = unsafe { &*(arg as *const Gate) };
        let guard = gate.lock.lock();
        let _guard = gate.open.wait(guard);
        gate.log.borrow_mut().push((scheduler.current().id(), 0));
        0
    }

    #[test]
    fn notify_one_wakes_a_single_waiter() {
        let core = testing::boot(4 * MIB);
        let scheduler = core.scheduler;
        let gate: &'static Gate = Box::leak(Box::new(Gate {
            lock: Mutex::new(()),
            open: Condvar::new(),
            log: RefCell::new(Vec::new()),
        }));
        let arg = gate as *const Gate as usize;

        let handles: Vec<_> = (0..3)
            .map(|_| scheduler.create(pass_gate, arg, "gate").unwrap())
            .collect();
        let first = handles[0].id();
        scheduler.yield_now();
        assert_eq!(gate.open.waiters(), 3);

        assert!(gate.open.notify_one());
        scheduler.yield_now();
        assert_eq!(*gate.log.borrow(), vec![(first, 0)]);
        assert_eq!(gate.open.waiters(), 2);

        assert_eq!(gate.open.notify_all(), 2);
        for handle in handles {
            scheduler.join(handle);
        }
        assert_eq!(gate.log.borrow().len(), 3);
        assert!(!gate.open.notify_one());
    }

    #[test]
    fn notify_all_wakes_waiters_in_arrival_order() {
        let core = testing::boot(4 * MIB);
        let scheduler = core.scheduler;
        let gate: &'static Gate = Box::leak(Box::new(Gate {
            lock: Mutex::new(()),
            open: Condvar::new(),
            log: RefCell::new(Vec::new()),
        }));
        let arg = gate as *const Gate as usize;

        let handles: Vec<_> = (0..4)
            .map(|_| scheduler.create(pass_gate, arg, "gate").unwrap())
            .collect();
        let ids: Vec<_> = handles.iter().map(|handle| (handle.id(), 0)).collect();
        scheduler.yield_now();
        assert_eq!(gate.open.waiters(), 4);
        assert!(gate.log.borrow().is_empty());

        assert_eq!(gate.open.notify_all(), 4);
        assert_eq!(gate.open.waiters(), 0);
        for handle in handles {
            scheduler.join(handle);
        }
        assert_eq!(*gate.log.borrow(), ids);
    }

    #[test]
    fn timer_switches_threads_every_yield_interval() {
        let core = testing::boot(4 * MIB);
        let scheduler = core.scheduler;
        let log = new_log();
        let handle = scheduler
            .create(record, log as *const Log as usize, "ticked")
            .unwrap();

        let acks = Cell::new(0);
        for _ in 1..YIELD_TICKS {
            scheduler.timer_tick(|| acks.set(acks.get() + 1));
        }
        assert!(log.borrow().is_empty());

        scheduler.timer_tick(|| acks.set(acks.get() + 1));
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(acks.get(), YIELD_TICKS);
        assert_eq!(scheduler.ticks(), YIELD_TICKS);

        scheduler.join(handle);
    }

    #[test]
    fn idle_thread_never_sleeps() {
        let core = testing::boot(4 * MIB);
        let scheduler = core.scheduler;
        let lock = Mutex::new(0);
        let cond = Condvar::new();

        // nobody could ever notify, so waiting must return on its own
        let guard = cond.wait(lock.lock());
        assert_eq!(*guard, 0);
        assert_eq!(cond.waiters(), 0);
        assert!(scheduler.current().is_idle());
        assert_eq!(scheduler.current().state(), State::Running);
    }

    #[test]
    #[should_panic(expected = "the idle thread must never block")]
    fn idle_thread_refuses_to_block() {
        let core = testing::boot(4 * MIB);
        let queue = ThreadQueue::new();
        let _irq = IrqGuard::new();
        core.scheduler.schedule(Transition::Blocked(&queue));
    }

    #[test]
    fn scheduler_starts_only_once() {
        let core = testing::boot(4 * MIB);
        assert_eq!(core.scheduler.init(), Err(Error::AlreadyInitialized));
    }
}
