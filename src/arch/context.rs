//! Suspending and resuming flows of execution.
//!
//! A [`Continuation`] is everything needed to resume a suspended thread:
//! its stack pointer. The callee-saved registers live on the suspended
//! stack itself, pushed there by [`swap`].

use core::ptr::NonNull;

/// The function a fresh continuation starts executing in.
///
/// It receives the `arg` given to [`Continuation::prepare`] and must never return.
pub type EntryFn = extern "C" fn(usize) -> !;

/// A suspended flow of execution.
#[derive(Debug)]
#[repr(C)]
pub struct Continuation {
    sp: usize,
}

impl Continuation {
    /// An empty continuation, filled by the first [`swap`] away from it.
    pub const fn new() -> Self {
        Self { sp: 0 }
    }

    /// Build a continuation that starts `entry(arg)` on the given stack.
    ///
    /// # Safety
    ///
    /// `stack` must point to `len` writable bytes that stay valid and
    /// unused by anything else for as long as the continuation may run.
    pub unsafe fn prepare(stack: NonNull<u8>, len: usize, entry: EntryFn, arg: usize) -> Self {
        let top = stack.as_ptr() as usize + len;
        Self {
            sp: super::imp::prepare_stack(top, entry, arg),
        }
    }

    /// The saved stack pointer, zero if this continuation was never suspended.
    pub fn stack_pointer(&self) -> usize {
        self.sp
    }
}

impl Default for Continuation {
    fn default() -> Self {
        Self::new()
    }
}

extern "C" {
    fn kestrel_continuation_swap(save: *mut usize, load: usize);
}

/// Suspend the running flow into `old` and resume `new`.
///
/// Returns once something swaps back into `old`.
///
/// # Safety
///
/// `new` must hold a continuation that was either prepared or suspended
/// by an earlier `swap`, and must not be running. Both pointers must stay
/// valid until this call returns.
pub unsafe fn swap(old: *mut Continuation, new: *const Continuation) {
    let load = (*new).sp;
    kestrel_continuation_swap(&mut (*old).sp, load);
}
