//! One descriptor per physical page, recording which object cache owns it.
//!
//! This is what lets the object allocator free a pointer without being
//! told which cache it came from.

use super::SlabCache;
use core::{
    ptr::{self, NonNull},
    sync::atomic::{AtomicPtr, Ordering},
};

#[derive(Debug)]
pub struct PageDescriptor {
    owner: AtomicPtr<SlabCache>,
}

impl PageDescriptor {
    /// A descriptor for a page no cache owns.
    pub const fn new() -> Self {
        Self {
            owner: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// The cache that currently owns this page.
    pub fn owner(&self) -> Option<NonNull<SlabCache>> {
        NonNull::new(self.owner.load(Ordering::Acquire))
    }

    /// Record `cache` as the owner of this page.
    ///
    /// # Panics
    ///
    /// If the page already has an owner.
    pub fn assign(&self, cache: &SlabCache) {
        let new = cache as *const SlabCache as *mut SlabCache;
        if let Err(old) =
            self.owner
                .compare_exchange(ptr::null_mut(), new, Ordering::AcqRel, Ordering::Acquire)
        {
            panic!(
                "page is already owned by object cache `{}`",
                // SAFETY
                // Owners clear the descriptor before they go away.
                unsafe { (*old).name() }
            );
        }
    }

    /// Clear the owner of this page.
    ///
    /// # Panics
    ///
    /// If `cache` is not the current owner.
    pub fn release(&self, cache: &SlabCache) {
        let expected = cache as *const SlabCache as *mut SlabCache;
        if self
            .owner
            .compare_exchange(expected, ptr::null_mut(), Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            panic!(
                "object cache `{}` released a page it does not own",
                cache.name()
            );
        }
    }
}

impl Default for PageDescriptor {
    fn default() -> Self {
        Self::new()
    }
}
