//! Bringing up the memory and thread management core.

use crate::{
    mem::{
        self,
        buddy::{BuddyNode, LOW_MEMORY_LIMIT},
        map::FirmwareRegion,
        BootstrapAllocator, BuddyAllocator, MemoryMap, ObjectAllocator, PageAllocator,
        PageDescriptor, Region,
    },
    sched::Scheduler,
    unit,
};

/// What the firmware tells the kernel about the machine.
#[derive(Debug, Clone, Copy)]
pub struct BootInfo<'a> {
    /// The firmware memory map.
    pub memory_map: &'a [FirmwareRegion],
    /// The physical memory the kernel image was loaded to.
    pub kernel_image: Region,
    /// The virtual address physical memory is mapped at.
    pub phys_offset: usize,
}

/// The components every other part of the kernel is built on.
#[derive(Clone, Copy)]
pub struct Core {
    pub pages: &'static PageAllocator,
    pub objects: &'static ObjectAllocator,
    pub scheduler: &'static Scheduler,
}

/// Initialize page and object allocation and adopt the calling context
/// as the idle thread of the scheduler.
///
/// Only memory below [`LOW_MEMORY_LIMIT`] is made available. The rest
/// follows with [`PageAllocator::init_high`] once the kernel maps it.
///
/// Must only be called once.
pub fn init(info: &BootInfo<'_>) -> mem::Result<Core> {
    let map = MemoryMap::from_firmware(info.memory_map, info.kernel_image)?;
    let node_count = BuddyAllocator::node_count(&map);
    log::info!(
        "{} of usable memory in {} regions",
        unit::bytes(map.total_size()),
        map.len()
    );

    let mut bootstrap = BootstrapAllocator::new(map, info.phys_offset);
    let nodes = bootstrap.alloc_slice(node_count, |_| BuddyNode::new())?;
    let descriptors: &'static [PageDescriptor] =
        bootstrap.alloc_slice(node_count, |_| PageDescriptor::new())?;

    let buddy = BuddyAllocator::new(nodes, LOW_MEMORY_LIMIT);
    let pages: &'static PageAllocator =
        bootstrap.place(PageAllocator::new(buddy, descriptors, info.phys_offset))?;
    let objects: &'static ObjectAllocator = bootstrap.place(ObjectAllocator::new(pages))?;
    let scheduler: &'static Scheduler = bootstrap.place(Scheduler::new(pages, objects))?;

    pages.init_low(bootstrap.finish())?;
    objects.init()?;
    scheduler.init()?;

    log::info!("{}", pages.stats());
    Ok(Core {
        pages,
        objects,
        scheduler,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mem::{Error, PAGE_SIZE},
        testing,
        unit::MIB,
    };

    #[test]
    fn boot_structures_are_carved_out_of_usable_memory() {
        let core = testing::boot(8 * MIB);

        // every usable page is either free or holds boot structures and
        // the first slabs of the object allocator
        let stats = core.pages.stats();
        assert!(stats.total < 6 * MIB);
        assert!(stats.total > 5 * MIB);
        assert!(stats.free < stats.total);
        assert_eq!(stats.total % PAGE_SIZE, 0);

        assert!(core.scheduler.is_running());
        assert!(core.scheduler.current().is_idle());
        assert_eq!(core.scheduler.current().id(), 0);
    }

    #[test]
    fn reserved_memory_stays_out_of_reach() {
        let memory = testing::Memory::new(8 * MIB);
        let regions = [
            FirmwareRegion::available(0, 8 * MIB),
            FirmwareRegion::reserved(4 * MIB, 2 * MIB),
        ];
        let core = init(&BootInfo {
            memory_map: &regions,
            kernel_image: Region::new(MIB, 2 * MIB),
            phys_offset: memory.offset(),
        })
        .unwrap();

        while let Ok(page) = core.pages.alloc(0) {
            let addr = page.as_usize();
            assert!(addr >= 2 * MIB && !(4 * MIB..6 * MIB).contains(&addr));
        }
    }

    #[test]
    fn machines_without_usable_memory_do_not_boot() {
        let memory = testing::Memory::new(2 * MIB);
        let regions = [FirmwareRegion::available(0, 2 * MIB)];
        let res = init(&BootInfo {
            memory_map: &regions,
            kernel_image: Region::new(MIB, 2 * MIB),
            phys_offset: memory.offset(),
        });
        assert_eq!(res.err(), Some(Error::BootstrapExhausted));
    }
}
