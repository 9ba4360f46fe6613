//! Physical memory management.
//!
//! Memory comes up in three steps:
//!
//! 1. The firmware memory map is turned into a [`MemoryMap`] of usable
//!    regions and the [`BootstrapAllocator`] carves the allocator metadata
//!    out of it.
//! 2. The [`PageAllocator`] hands out power-of-two blocks of pages using
//!    the buddy algorithm.
//! 3. The [`ObjectAllocator`] splits pages into fixed-size objects.

use crate::unit::{self, KIB};
use core::fmt;
use displaydoc_lite::displaydoc;

pub mod bootstrap;
pub mod buddy;
pub mod descriptor;
pub mod linked_list;
pub mod map;
pub mod page;
pub mod slab;

pub use bootstrap::BootstrapAllocator;
pub use buddy::BuddyAllocator;
pub use descriptor::PageDescriptor;
pub use linked_list::LinkedList;
pub use map::{MemoryMap, Region};
pub use page::PageAllocator;
pub use slab::{ObjectAllocator, SlabCache};

/// The size of a single memory page is 4KiB,
/// this is also the size of order-0 in the buddy
/// allocator.
pub const PAGE_SIZE: usize = 4 * KIB;

/// Result for every memory management operation.
pub type Result<T, E = Error> = core::result::Result<T, E>;

displaydoc! {
    /// Any error that can happen while managing memory.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Error {
        /// the `end` of a memory region was before its `start`.
        InvalidRange,
        /// the memory map ran out of slots for regions.
        MapFull,
        /// the bootstrap allocator found no region large enough.
        BootstrapExhausted,
        /// tried to allocate an order that exceeded the maximum order.
        OrderTooLarge,
        /// tried to allocate, but there was no free memory left.
        NoMemoryAvailable,
        /// an object layout had a zero size or an invalid alignment.
        InvalidLayout,
        /// an object does not fit into a single page.
        ObjectTooLarge,
        /// tried to initialize something a second time.
        AlreadyInitialized,
        /// tried to add high memory before low memory was activated.
        LowMemoryInactive,
    }
}

/// A physical memory address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct PhysAddr(usize);

impl PhysAddr {
    /// Create a new physical address.
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// The address of the page with the given index.
    pub const fn from_page(index: usize) -> Self {
        Self(index * PAGE_SIZE)
    }

    /// Return the raw address.
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// The index of the page this address lies in.
    pub const fn page(self) -> usize {
        self.0 / PAGE_SIZE
    }

    /// Round this address down to the page it lies in.
    pub const fn page_base(self) -> Self {
        Self(self.0 & !(PAGE_SIZE - 1))
    }

    /// Check if this address lies on a page boundary.
    pub const fn is_page_aligned(self) -> bool {
        self.0 % PAGE_SIZE == 0
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr({:#x})", self.0)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Aligns the given `addr` upwards to `align`.
///
/// `align` must be a power of two.
pub const fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}

/// Aligns the given `addr` downwards to `align`.
///
/// `align` must be a power of two.
pub const fn align_down(addr: usize, align: usize) -> usize {
    addr & !(align - 1)
}

/// Statistics for a memory allocator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocStats {
    /// The name of the allocator that collected these stats.
    pub name: &'static str,
    /// The number of bytes that are handed out.
    pub allocated: usize,
    /// The number of bytes that are left for allocation.
    pub free: usize,
    /// The total number of bytes that this allocator has available for allocation.
    pub total: usize,
}

impl AllocStats {
    /// Create a new [`AllocStats`] instance for the given allocator name.
    pub const fn with_name(name: &'static str) -> Self {
        Self {
            name,
            allocated: 0,
            free: 0,
            total: 0,
        }
    }
}

impl fmt::Display for AllocStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        self.name.chars().try_for_each(|_| write!(f, "~"))?;
        writeln!(f, "\nAllocated: {}", unit::bytes(self.allocated))?;
        writeln!(f, "Free:      {}", unit::bytes(self.free))?;
        writeln!(f, "Total:     {}", unit::bytes(self.total))?;
        self.name.chars().try_for_each(|_| write!(f, "~"))?;
        writeln!(f)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_helpers() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(PAGE_SIZE, PAGE_SIZE), PAGE_SIZE);
        assert_eq!(align_down(PAGE_SIZE + 7, PAGE_SIZE), PAGE_SIZE);
    }

    #[test]
    fn phys_addr_pages() {
        let addr = PhysAddr::new(3 * PAGE_SIZE + 12);
        assert_eq!(addr.page(), 3);
        assert_eq!(addr.page_base(), PhysAddr::from_page(3));
        assert!(!addr.is_page_aligned());
        assert_eq!(addr.to_string(), "0x300c");
    }

    #[test]
    fn errors_display_their_doc_comment() {
        let message = Error::NoMemoryAvailable.to_string();
        assert!(message.contains("no free memory left"));
    }

    #[test]
    fn stats_display() {
        let stats = AllocStats {
            name: "Pages",
            allocated: 4 * KIB,
            free: 8 * KIB,
            total: 12 * KIB,
        };
        let out = stats.to_string();
        assert!(out.starts_with("Pages\n~~~~~\n"));
        assert!(out.contains("Allocated: 4.00 KiB"));
        assert!(out.contains("Total:     12.00 KiB"));
    }
}
