//! The allocator used while no other allocator exists yet.
//!
//! It bumps through the [`MemoryMap`] and never frees anything: every
//! byte it hands out is removed from the map, and the remaining map is
//! what the page allocator later takes over.

use super::{Error, MemoryMap, PhysAddr, Result};
use core::{mem, slice};

pub struct BootstrapAllocator {
    map: MemoryMap,
    phys_offset: usize,
    used: usize,
}

impl BootstrapAllocator {
    /// Create a bootstrap allocator over `map`.
    ///
    /// Physical memory must be mapped at `phys_offset`.
    pub fn new(map: MemoryMap, phys_offset: usize) -> Self {
        Self {
            map,
            phys_offset,
            used: 0,
        }
    }

    /// The number of bytes handed out so far.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Allocate `size` bytes aligned to `align`.
    pub fn alloc(&mut self, size: usize, align: usize) -> Result<PhysAddr> {
        let start = self
            .map
            .take(size.max(1), align)
            .ok_or(Error::BootstrapExhausted)?;
        self.used += size;
        Ok(PhysAddr::new(start))
    }

    /// Allocate a slice of `len` elements, each initialized by `init`.
    pub fn alloc_slice<T>(
        &mut self,
        len: usize,
        mut init: impl FnMut(usize) -> T,
    ) -> Result<&'static mut [T]> {
        let size = len
            .checked_mul(mem::size_of::<T>())
            .ok_or(Error::BootstrapExhausted)?;
        let addr = self.alloc(size, mem::align_of::<T>())?;
        let ptr = (addr.as_usize() + self.phys_offset) as *mut T;

        // SAFETY
        // The memory was just removed from the map, so nothing else
        // can ever reference it.
        unsafe {
            for idx in 0..len {
                ptr.add(idx).write(init(idx));
            }
            Ok(slice::from_raw_parts_mut(ptr, len))
        }
    }

    /// Move `value` into memory that lives forever.
    pub fn place<T>(&mut self, value: T) -> Result<&'static mut T> {
        let addr = self.alloc(mem::size_of::<T>(), mem::align_of::<T>())?;
        let ptr = (addr.as_usize() + self.phys_offset) as *mut T;

        // SAFETY
        // See `alloc_slice`.
        unsafe {
            ptr.write(value);
            Ok(&mut *ptr)
        }
    }

    /// Stop allocating and return the memory that is left.
    pub fn finish(self) -> MemoryMap {
        log::debug!("bootstrap allocator used {:#x} bytes", self.used);
        self.map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mem::Region, testing};

    #[test]
    fn allocations_leave_the_map() {
        let memory = testing::Memory::new(64 * 1024);
        let mut map = MemoryMap::new();
        map.insert(Region::new(0, memory.size())).unwrap();

        let mut bootstrap = BootstrapAllocator::new(map, memory.offset());
        let numbers = bootstrap.alloc_slice(16, |idx| idx as u64 * 3).unwrap();
        assert_eq!(numbers[5], 15);

        let value = bootstrap.place(0xdead_u32).unwrap();
        assert_eq!(*value, 0xdead);
        assert_eq!(bootstrap.used(), 16 * 8 + 4);

        let left = bootstrap.finish();
        assert_eq!(left.total_size(), memory.size() - 16 * 8 - 4);
    }

    #[test]
    fn exhaustion_is_an_error() {
        let memory = testing::Memory::new(8 * 1024);
        let mut map = MemoryMap::new();
        map.insert(Region::new(0, memory.size())).unwrap();

        let mut bootstrap = BootstrapAllocator::new(map, memory.offset());
        assert_eq!(
            bootstrap.alloc(16 * 1024, 8),
            Err(Error::BootstrapExhausted)
        );
        assert!(bootstrap.alloc_slice(usize::MAX, |_| 0u64).is_err());
    }
}
