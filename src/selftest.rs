//! Tests the kernel runs on itself right after booting.
//!
//! They exercise thread creation, joining, mutexes and condition
//! variables on the real scheduler. Shared data lives on the stack of the
//! thread that starts a test, which joins every thread it created before
//! returning.

use crate::{
    boot::Core,
    mem,
    sched::{Scheduler, ThreadHandle},
    sync::{Condvar, Mutex},
};
use core::cell::Cell;

/// The depth of the thread tree [`run`] spawns.
pub const TREE_DEPTH: usize = 10;

struct Tree {
    depth: usize,
    spawned: Cell<usize>,
}

struct TreeNode<'t> {
    tree: &'t Tree,
    level: usize,
    id: usize,
}

impl<'t> TreeNode<'t> {
    fn child(&self, right: bool) -> Self {
        Self {
            tree: self.tree,
            level: self.level + 1,
            id: self.id * 2 + right as usize,
        }
    }
}

/// Spawn a binary tree of threads `depth` levels deep below the calling
/// thread, which is the root.
///
/// Every thread creates and joins its two children and returns its own
/// id to its parent. Returns the number of threads that were created,
/// or `None` if any thread could not be created or returned a wrong id.
pub fn thread_tree(scheduler: &'static Scheduler, depth: usize) -> Option<usize> {
    let tree = Tree {
        depth,
        spawned: Cell::new(0),
    };
    let root = TreeNode {
        tree: &tree,
        level: 0,
        id: 1,
    };

    let id = tree_node(scheduler, &root as *const TreeNode<'_> as usize);
    (id == root.id).then(|| tree.spawned.get())
}

fn tree_node(scheduler: &'static Scheduler, arg: usize) -> usize {
    // SAFETY
    // The parent keeps the node alive until this thread is joined.
    let node = unsafe { &*(arg as *const TreeNode<'_>) };
    log::trace!("tree node {} enters at level {}", node.id, node.level);

    if node.level >= node.tree.depth {
        return node.id;
    }

    let children = [node.child(false), node.child(true)];
    let spawn = |child: &TreeNode<'_>| {
        scheduler.create(tree_node, child as *const TreeNode<'_> as usize, "tree")
    };
    let handles: [mem::Result<ThreadHandle>; 2] = [spawn(&children[0]), spawn(&children[1])];

    let mut ok = true;
    for (child, handle) in children.iter().zip(handles) {
        match handle {
            Ok(handle) => {
                node.tree.spawned.set(node.tree.spawned.get() + 1);
                let id = scheduler.join(handle);
                if id != child.id {
                    log::error!("tree node {} returned {} instead of {}", child.id, id, child.id);
                    ok = false;
                }
            }
            Err(err) => {
                log::error!("tree node {} failed to create node {}: {}", node.id, child.id, err);
                ok = false;
            }
        }
    }

    log::trace!("tree node {} exits", node.id);
    if ok {
        node.id
    } else {
        0
    }
}

struct Handoff {
    slot: Mutex<Option<usize>>,
    ready: Condvar,
    value: usize,
}

impl Handoff {
    fn publish(&self, value: usize) {
        let mut slot = self.slot.lock();
        *slot = Some(value);
        self.ready.notify_one();
    }
}

fn handoff_waiter(_: &'static Scheduler, arg: usize) -> usize {
    // SAFETY
    // `condvar_handoff` joins this thread before the handoff goes away.
    let handoff = unsafe { &*(arg as *const Handoff) };

    let slot = handoff.slot.lock();
    if slot.is_some() {
        log::warn!("the value was published before the waiter ran");
    }
    let slot = handoff.ready.wait_while(slot, |slot| slot.is_none());
    (*slot).unwrap_or(0)
}

fn handoff_setter(scheduler: &'static Scheduler, arg: usize) -> usize {
    // SAFETY
    // See `handoff_waiter`.
    let handoff = unsafe { &*(arg as *const Handoff) };

    // hold the lock across a few switches, the waiter has to sleep on it
    let mut slot = handoff.slot.lock();
    for _ in 0..3 {
        scheduler.yield_now();
    }
    *slot = Some(handoff.value);
    handoff.ready.notify_one();
    0
}

/// Hand `value` from one thread to another through a [`Condvar`].
///
/// The waiter starts first and sleeps on the condition variable, then
/// the setter publishes `value` while holding the mutex for a while.
/// Returns the value the waiter received.
pub fn condvar_handoff(scheduler: &'static Scheduler, value: usize) -> mem::Result<usize> {
    let handoff = Handoff {
        slot: Mutex::new(None),
        ready: Condvar::new(),
        value,
    };
    let arg = &handoff as *const Handoff as usize;

    let waiter = scheduler.create(handoff_waiter, arg, "waiter")?;
    scheduler.yield_now();

    let setter = match scheduler.create(handoff_setter, arg, "setter") {
        Ok(setter) => setter,
        Err(err) => {
            // nobody else is left to wake the waiter
            handoff.publish(0);
            scheduler.join(waiter);
            return Err(err);
        }
    };

    let received = scheduler.join(waiter);
    scheduler.join(setter);
    Ok(received)
}

/// Run every self test and report the outcome.
///
/// Returns `true` if all of them passed.
pub fn run(core: &Core) -> bool {
    let scheduler = core.scheduler;
    let mut passed = true;

    log::info!("starting thread tree test...");
    match thread_tree(scheduler, TREE_DEPTH) {
        Some(count) => log::info!("thread tree test completed with {} threads", count),
        None => {
            log::error!("thread tree test failed");
            passed = false;
        }
    }

    log::info!("starting condition variable test...");
    match condvar_handoff(scheduler, 0xc0ffee) {
        Ok(0xc0ffee) => log::info!("condition variable test completed"),
        Ok(other) => {
            log::error!("condition variable test received {:#x}", other);
            passed = false;
        }
        Err(err) => {
            log::error!("condition variable test failed: {}", err);
            passed = false;
        }
    }

    passed
}
