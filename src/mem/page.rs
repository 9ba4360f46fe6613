//! The page allocator the rest of the kernel uses.

use super::{
    buddy::BuddyAllocator, AllocStats, MemoryMap, PageDescriptor, PhysAddr, Result,
};
use crate::sync::IrqMutex;
use core::ptr::NonNull;

/// Hands out blocks of physical pages and translates them to the
/// addresses the kernel can access them at.
///
/// The buddy allocator behind it is guarded by an [`IrqMutex`], so
/// allocating and freeing is safe from every thread and from interrupt
/// handlers.
pub struct PageAllocator {
    buddy: IrqMutex<BuddyAllocator>,
    descriptors: &'static [PageDescriptor],
    phys_offset: usize,
}

impl PageAllocator {
    /// Create a page allocator around `buddy`.
    ///
    /// `descriptors` needs one entry for every page `buddy` describes, and
    /// physical memory must be mapped at `phys_offset`.
    pub fn new(
        buddy: BuddyAllocator,
        descriptors: &'static [PageDescriptor],
        phys_offset: usize,
    ) -> Self {
        assert_eq!(
            buddy.page_count(),
            descriptors.len(),
            "every page needs exactly one descriptor"
        );

        Self {
            buddy: IrqMutex::new(buddy),
            descriptors,
            phys_offset,
        }
    }

    /// See [`BuddyAllocator::init_low`].
    pub fn init_low(&self, map: MemoryMap) -> Result<()> {
        self.buddy.lock().init_low(map)
    }

    /// See [`BuddyAllocator::init_high`].
    pub fn init_high(&self) -> Result<()> {
        self.buddy.lock().init_high()
    }

    /// Allocate `2^order` contiguous pages.
    pub fn alloc(&self, order: usize) -> Result<PhysAddr> {
        self.buddy.lock().allocate(order)
    }

    /// Return a block that was allocated using [`alloc`](Self::alloc).
    pub fn free(&self, addr: PhysAddr) {
        self.buddy.lock().deallocate(addr)
    }

    /// The virtual address `addr` is accessible at.
    pub fn to_virt(&self, addr: PhysAddr) -> NonNull<u8> {
        let virt = (addr.as_usize() + self.phys_offset) as *mut u8;
        NonNull::new(virt).unwrap_or_else(|| panic!("{} is mapped at the null address", addr))
    }

    /// The physical address behind a pointer into the direct map.
    pub fn to_phys(&self, ptr: *const u8) -> PhysAddr {
        let addr = (ptr as usize)
            .checked_sub(self.phys_offset)
            .unwrap_or_else(|| panic!("{:p} lies below the direct map", ptr));
        PhysAddr::new(addr)
    }

    /// The descriptor of the page that contains `addr`.
    ///
    /// # Panics
    ///
    /// If `addr` lies outside of physical memory.
    pub fn descriptor(&self, addr: PhysAddr) -> &PageDescriptor {
        self.descriptors
            .get(addr.page())
            .unwrap_or_else(|| panic!("{} has no page descriptor", addr))
    }

    /// The number of free blocks of `order`.
    pub fn free_blocks(&self, order: usize) -> usize {
        self.buddy.lock().free_blocks(order)
    }

    /// The number of bytes that can still be allocated.
    pub fn free_bytes(&self) -> usize {
        self.buddy.lock().stats().free
    }

    pub fn stats(&self) -> AllocStats {
        self.buddy.lock().stats()
    }
}

#[cfg(test)]
mod tests {
    use crate::{mem::PAGE_SIZE, testing, unit::MIB};

    #[test]
    fn pages_are_reachable_through_the_direct_map() {
        let core = testing::boot(4 * MIB);
        let pages = core.pages;

        let page = pages.alloc(0).unwrap();
        let ptr = pages.to_virt(page);
        unsafe { ptr.as_ptr().write_bytes(0xaa, PAGE_SIZE) };
        assert_eq!(pages.to_phys(ptr.as_ptr()), page);

        pages.free(page);
    }

    #[test]
    fn kernel_image_and_firmware_area_are_never_handed_out() {
        let core = testing::boot(4 * MIB);
        let pages = core.pages;

        while let Ok(page) = pages.alloc(0) {
            assert!(page.as_usize() >= 2 * MIB, "handed out {}", page);
        }
        assert_eq!(pages.free_bytes(), 0);
    }
}
