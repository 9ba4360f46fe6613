//! Machines for unit tests, with host memory standing in for physical memory.

use crate::{
    boot::{self, BootInfo, Core},
    mem::{map::FirmwareRegion, Region, PAGE_SIZE},
    unit::MIB,
};
use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// Zeroed, page aligned host memory that is never freed.
///
/// Physical address `0` of the emulated machine is the first byte.
pub struct Memory {
    base: NonNull<u8>,
    size: usize,
}

impl Memory {
    pub fn new(size: usize) -> Self {
        let layout = Layout::from_size_align(size, PAGE_SIZE).expect("invalid memory size");
        // SAFETY
        // Every test machine has a non-zero memory size.
        let base = unsafe { alloc::alloc_zeroed(layout) };
        let base = NonNull::new(base).expect("the host ran out of memory");
        Self { base, size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// The direct map offset of this memory.
    pub fn offset(&self) -> usize {
        self.base.as_ptr() as usize
    }
}

/// Boot a machine with `size` bytes of memory.
///
/// Like a real PC, the first megabyte belongs to the firmware and the
/// kernel image occupies the second one.
pub fn boot(size: usize) -> Core {
    let memory = Memory::new(size);
    let regions = [FirmwareRegion::available(0, size)];

    boot::init(&BootInfo {
        memory_map: &regions,
        kernel_image: Region::new(MIB, 2 * MIB),
        phys_offset: memory.offset(),
    })
    .expect("failed to boot the test machine")
}
