//! Custom implementation of a slab allocator that splits pages into
//! objects of one fixed size.
//!
//! Every [`SlabCache`] hands out objects of a single layout. Its memory
//! comes in slabs, which are single pages:
//!
//! - Small objects (up to [`SLAB_SMALL`] bytes) live in *inline* slabs.
//!   The slab header sits at the end of the page and the free list is
//!   threaded through the free objects themselves.
//! - Larger objects live in *external* slabs. Their header and one free
//!   list node per object are allocated from two internal pools, so the
//!   whole page is available for objects.
//!
//! The [`PageDescriptor`](super::PageDescriptor) of every slab page points
//! to the owning cache, which is how [`ObjectAllocator::free`] finds the
//! cache of a pointer.

use super::{align_down, align_up, AllocStats, Error, LinkedList, PageAllocator, PhysAddr, Result, PAGE_SIZE};
use crate::sync::IrqMutex;
use core::{iter, mem, ptr::NonNull};

/// Objects up to this size are stored in inline slabs.
pub const SLAB_SMALL: usize = PAGE_SIZE / 8;

const WORD: usize = mem::size_of::<usize>();

/// Offset of the header inside the page of an inline slab.
const INLINE_HEADER: usize = align_down(PAGE_SIZE - mem::size_of::<Slab>(), mem::align_of::<Slab>());

/// Where a slab keeps its bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlabKind {
    /// The header lives at the end of the slab page.
    Inline,
    /// The header and the free list nodes live in separate pools.
    External,
}

/// Bookkeeping of one slab page.
struct Slab {
    next: Option<NonNull<Slab>>,
    page: PhysAddr,
    base: NonNull<u8>,
    /// Free objects of an inline slab, or nodes pointing to the free
    /// objects of an external slab.
    free: LinkedList,
    /// Nodes of an external slab that currently point to nothing.
    spare: LinkedList,
    in_use: usize,
    capacity: usize,
}

/// A free list entry of an external slab.
#[repr(C)]
struct SlabNode {
    /// Written and read by the free list.
    #[allow(dead_code)]
    link: usize,
    object: NonNull<u8>,
}

impl Slab {
    fn new(page: PhysAddr, base: NonNull<u8>, capacity: usize) -> Self {
        Self {
            next: None,
            page,
            base,
            free: LinkedList::new(),
            spare: LinkedList::new(),
            in_use: 0,
            capacity,
        }
    }

    /// Set up an inline slab inside the page at `base`.
    ///
    /// # Safety
    ///
    /// `base` must point to a whole page that is owned by the caller.
    unsafe fn inline(page: PhysAddr, base: NonNull<u8>, stride: usize, capacity: usize) -> NonNull<Slab> {
        let header = base.as_ptr().add(INLINE_HEADER).cast::<Slab>();
        header.write(Slab::new(page, base, capacity));

        // push in reverse, so the lowest object is handed out first
        let slab = &mut *header;
        for idx in (0..capacity).rev() {
            let slot = base.as_ptr().add(idx * stride).cast::<usize>();
            slab.free.push(NonNull::new_unchecked(slot));
        }

        NonNull::new_unchecked(header)
    }

    /// Take a free object out of this slab.
    ///
    /// # Safety
    ///
    /// `kind` must be the kind this slab was created with.
    unsafe fn take(&mut self, kind: SlabKind) -> Option<NonNull<u8>> {
        let slot = self.free.pop()?;
        self.in_use += 1;

        Some(match kind {
            SlabKind::Inline => slot.cast(),
            SlabKind::External => {
                let object = (*slot.cast::<SlabNode>().as_ptr()).object;
                self.spare.push(slot);
                object
            }
        })
    }

    /// Put `object` back onto the free list.
    ///
    /// # Safety
    ///
    /// `object` must be an object slot of this slab, and `kind` the kind
    /// this slab was created with.
    unsafe fn give(&mut self, object: NonNull<u8>, kind: SlabKind) {
        match kind {
            SlabKind::Inline => {
                let slot = object.cast::<usize>();
                assert!(!self.free.contains(slot), "double free of {:p}", object);
                self.free.push(slot);
            }
            SlabKind::External => {
                let is_free = self
                    .free
                    .iter()
                    .any(|node| (*node.cast::<SlabNode>().as_ptr()).object == object);
                assert!(!is_free, "double free of {:p}", object);

                let node = self
                    .spare
                    .pop()
                    .unwrap_or_else(|| panic!("slab at {} has no spare node", self.page));
                (*node.cast::<SlabNode>().as_ptr()).object = object;
                self.free.push(node);
            }
        }

        self.in_use -= 1;
    }
}

/// The slabs of a cache, in the order they were created.
struct SlabList {
    head: Option<NonNull<Slab>>,
    tail: Option<NonNull<Slab>>,
    len: usize,
}

// SAFETY
// Slabs are only reachable through the list, which is guarded by the cache lock.
unsafe impl Send for SlabList {}

impl SlabList {
    const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    fn push_back(&mut self, slab: NonNull<Slab>) {
        match self.tail {
            // SAFETY
            // Slabs in the list are alive.
            Some(mut tail) => unsafe { tail.as_mut().next = Some(slab) },
            None => self.head = Some(slab),
        }
        self.tail = Some(slab);
        self.len += 1;
    }

    fn iter(&self) -> impl Iterator<Item = NonNull<Slab>> + '_ {
        // SAFETY
        // Slabs in the list are alive.
        iter::successors(self.head, |slab| unsafe { slab.as_ref().next })
    }

    /// Empty the list and return its first slab.
    fn take_all(&mut self) -> Option<NonNull<Slab>> {
        self.tail = None;
        self.len = 0;
        self.head.take()
    }
}

/// A pool of objects that share one layout.
pub struct SlabCache {
    name: &'static str,
    size: usize,
    align: usize,
    stride: usize,
    capacity: usize,
    kind: SlabKind,
    slabs: IrqMutex<SlabList>,
}

impl SlabCache {
    fn new(name: &'static str, size: usize, align: usize) -> Result<Self> {
        if size == 0 || !align.is_power_of_two() || align > PAGE_SIZE {
            return Err(Error::InvalidLayout);
        }
        if size > PAGE_SIZE {
            return Err(Error::ObjectTooLarge);
        }

        if size <= SLAB_SMALL {
            // free objects store the free list link
            let stride = align_up(size.max(WORD), align.max(WORD));
            if stride <= INLINE_HEADER {
                return Ok(Self::with_layout(name, size, align, SlabKind::Inline, stride));
            }
        }

        let stride = align_up(size, align);
        if stride > PAGE_SIZE {
            return Err(Error::ObjectTooLarge);
        }
        Ok(Self::with_layout(name, size, align, SlabKind::External, stride))
    }

    /// An inline cache for the allocator's own bookkeeping types.
    fn pool<T>(name: &'static str) -> Self {
        let (size, align) = (mem::size_of::<T>(), mem::align_of::<T>());
        debug_assert!(size <= SLAB_SMALL);
        let stride = align_up(size.max(WORD), align.max(WORD));
        Self::with_layout(name, size, align, SlabKind::Inline, stride)
    }

    fn with_layout(name: &'static str, size: usize, align: usize, kind: SlabKind, stride: usize) -> Self {
        let capacity = match kind {
            SlabKind::Inline => INLINE_HEADER / stride,
            SlabKind::External => PAGE_SIZE / stride,
        };

        Self {
            name,
            size,
            align,
            stride,
            capacity,
            kind,
            slabs: IrqMutex::new(SlabList::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The size of one object, as requested at creation.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn align(&self) -> usize {
        self.align
    }

    /// The distance between two objects inside a slab.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn kind(&self) -> SlabKind {
        self.kind
    }

    /// The number of objects inside one slab.
    pub fn objects_per_slab(&self) -> usize {
        self.capacity
    }

    /// The number of slabs this cache owns.
    pub fn slab_count(&self) -> usize {
        self.slabs.lock().len
    }

    /// The number of objects that are handed out.
    pub fn objects_in_use(&self) -> usize {
        let list = self.slabs.lock();
        // SAFETY
        // Slabs in the list are alive.
        list.iter().map(|slab| unsafe { slab.as_ref().in_use }).sum()
    }

    pub fn stats(&self) -> AllocStats {
        let (slabs, in_use) = {
            let list = self.slabs.lock();
            // SAFETY
            // Slabs in the list are alive.
            let in_use = list.iter().map(|slab| unsafe { slab.as_ref().in_use }).sum::<usize>();
            (list.len, in_use)
        };

        let total = slabs * self.capacity * self.size;
        AllocStats {
            name: self.name,
            allocated: in_use * self.size,
            free: total - in_use * self.size,
            total,
        }
    }
}

/// Creates [`SlabCache`]s and allocates objects from them.
pub struct ObjectAllocator {
    pages: &'static PageAllocator,
    /// Headers of external slabs.
    slabs: SlabCache,
    /// Free list nodes of external slabs.
    nodes: SlabCache,
    /// The caches created through [`create`](Self::create).
    caches: SlabCache,
}

impl ObjectAllocator {
    /// Create an object allocator that takes its pages from `pages`.
    pub fn new(pages: &'static PageAllocator) -> Self {
        Self {
            pages,
            slabs: SlabCache::pool::<Slab>("slab headers"),
            nodes: SlabCache::pool::<SlabNode>("slab nodes"),
            caches: SlabCache::pool::<SlabCache>("object caches"),
        }
    }

    /// Give every internal pool its first slab.
    ///
    /// The pools refer to `self` from the page descriptors, so the
    /// allocator must not move anymore.
    pub fn init(&'static self) -> Result<()> {
        for pool in [&self.slabs, &self.nodes, &self.caches] {
            self.prime(pool)?;
        }
        Ok(())
    }

    /// Create a cache for objects of `size` bytes aligned to `align`.
    ///
    /// The cache gets its first slab right away.
    pub fn create(&self, name: &'static str, size: usize, align: usize) -> Result<&'static SlabCache> {
        let cache = SlabCache::new(name, size, align)?;
        let memory = self.alloc(&self.caches)?.cast::<SlabCache>();

        // SAFETY
        // The memory was just allocated for a `SlabCache`, and stays
        // allocated until the cache is destroyed.
        let cache = unsafe {
            memory.as_ptr().write(cache);
            &*memory.as_ptr()
        };

        if let Err(err) = self.prime(cache) {
            self.free(memory.cast());
            return Err(err);
        }

        log::debug!(
            "created object cache `{}` ({} byte objects, {} per {:?} slab)",
            name,
            size,
            cache.capacity,
            cache.kind
        );
        Ok(cache)
    }

    /// Create a cache for objects of type `T`.
    pub fn create_for<T>(&self, name: &'static str) -> Result<&'static SlabCache> {
        self.create(name, mem::size_of::<T>(), mem::align_of::<T>())
    }

    /// Allocate one object from `cache`.
    ///
    /// Slabs are searched in the order they were created. If all of them
    /// are full, a new slab is added.
    pub fn alloc(&self, cache: &SlabCache) -> Result<NonNull<u8>> {
        let mut list = cache.slabs.lock();

        for mut slab in list.iter() {
            // SAFETY
            // Slabs in the list are alive and belong to `cache`.
            if let Some(object) = unsafe { slab.as_mut().take(cache.kind) } {
                return Ok(object);
            }
        }

        let mut slab = self.grow(cache, &mut list)?;
        // SAFETY
        // See above.
        unsafe { slab.as_mut().take(cache.kind) }.ok_or(Error::NoMemoryAvailable)
    }

    /// Return an object to the cache it was allocated from.
    ///
    /// # Panics
    ///
    /// If `object` was not handed out by any cache, or was already freed.
    pub fn free(&self, object: NonNull<u8>) {
        let page = self.pages.to_phys(object.as_ptr()).page_base();
        let owner = self
            .pages
            .descriptor(page)
            .owner()
            .unwrap_or_else(|| panic!("tried to free {:p}, which no object cache owns", object));

        // SAFETY
        // Caches clear the descriptors of their pages before they go away.
        let cache = unsafe { owner.as_ref() };
        let list = cache.slabs.lock();

        // SAFETY
        // Slabs in the list are alive.
        let mut slab = list
            .iter()
            .find(|slab| unsafe { slab.as_ref().page } == page)
            .unwrap_or_else(|| panic!("object cache `{}` has no slab at {}", cache.name, page));
        // SAFETY
        // The slab belongs to `cache`, whose lock we hold.
        let slab = unsafe { slab.as_mut() };

        let offset = object.as_ptr() as usize - slab.base.as_ptr() as usize;
        assert!(
            offset % cache.stride == 0 && offset / cache.stride < slab.capacity,
            "{:p} is not an object of cache `{}`",
            object,
            cache.name
        );

        // SAFETY
        // `object` is a slot of `slab`.
        unsafe { slab.give(object, cache.kind) };
    }

    /// Give every empty slab except the first back to the page allocator.
    ///
    /// Returns the number of released slabs.
    pub fn shrink(&self, cache: &SlabCache) -> usize {
        let mut list = cache.slabs.lock();
        let mut prev = match list.head {
            Some(head) => head,
            None => return 0,
        };

        let mut released = 0;
        // SAFETY
        // Slabs in the list are alive, and we hold the cache lock.
        let mut cursor = unsafe { prev.as_ref().next };
        while let Some(slab) = cursor {
            let next = unsafe { slab.as_ref().next };

            if unsafe { slab.as_ref().in_use } == 0 {
                unsafe { prev.as_mut().next = next };
                if list.tail == Some(slab) {
                    list.tail = Some(prev);
                }
                list.len -= 1;

                self.release_slab(cache, slab);
                released += 1;
            } else {
                prev = slab;
            }

            cursor = next;
        }

        if released > 0 {
            log::debug!("object cache `{}` released {} slabs", cache.name, released);
        }
        released
    }

    /// Release every slab of `cache`, and the cache itself.
    ///
    /// # Panics
    ///
    /// If some object of the cache is still in use.
    pub fn destroy(&self, cache: &'static SlabCache) {
        {
            let mut list = cache.slabs.lock();

            // SAFETY
            // Slabs in the list are alive.
            let live = list.iter().map(|slab| unsafe { slab.as_ref().in_use }).sum::<usize>();
            assert!(
                live == 0,
                "tried to destroy object cache `{}` with {} live objects",
                cache.name,
                live
            );

            let mut cursor = list.take_all();
            while let Some(slab) = cursor {
                cursor = unsafe { slab.as_ref().next };
                self.release_slab(cache, slab);
            }
        }

        log::debug!("destroyed object cache `{}`", cache.name);
        self.free(NonNull::from(cache).cast());
    }

    /// The page allocator slabs come from.
    pub fn pages(&self) -> &'static PageAllocator {
        self.pages
    }

    /// Give `cache` its first slab if it has none.
    fn prime(&self, cache: &SlabCache) -> Result<()> {
        let mut list = cache.slabs.lock();
        if list.head.is_none() {
            self.grow(cache, &mut list)?;
        }
        Ok(())
    }

    /// Add a new slab to the end of `list`.
    fn grow(&self, cache: &SlabCache, list: &mut SlabList) -> Result<NonNull<Slab>> {
        let page = self.pages.alloc(0)?;
        let base = self.pages.to_virt(page);

        let slab = match cache.kind {
            // SAFETY
            // The page was just allocated.
            SlabKind::Inline => unsafe { Slab::inline(page, base, cache.stride, cache.capacity) },
            SlabKind::External => match self.external(page, base, cache) {
                Ok(slab) => slab,
                Err(err) => {
                    self.pages.free(page);
                    return Err(err);
                }
            },
        };

        self.pages.descriptor(page).assign(cache);
        list.push_back(slab);
        log::trace!("object cache `{}` grew to {} slabs", cache.name, list.len);
        Ok(slab)
    }

    /// Set up an external slab for the page at `base`.
    fn external(&self, page: PhysAddr, base: NonNull<u8>, cache: &SlabCache) -> Result<NonNull<Slab>> {
        let header = self.alloc(&self.slabs)?.cast::<Slab>();
        // SAFETY
        // The memory was just allocated for a `Slab`.
        unsafe { header.as_ptr().write(Slab::new(page, base, cache.capacity)) };

        // push in reverse, so the lowest object is handed out first
        for idx in (0..cache.capacity).rev() {
            let node = match self.alloc(&self.nodes) {
                Ok(node) => node.cast::<SlabNode>(),
                Err(err) => {
                    self.release_external(header);
                    return Err(err);
                }
            };

            // SAFETY
            // The node was just allocated, and the object lies inside the page.
            unsafe {
                let object = NonNull::new_unchecked(base.as_ptr().add(idx * cache.stride));
                node.as_ptr().write(SlabNode { link: 0, object });
                (*header.as_ptr()).free.push(node.cast());
            }
        }

        Ok(header)
    }

    /// Free the header and every node of an external slab.
    fn release_external(&self, header: NonNull<Slab>) {
        // SAFETY
        // The slab is not part of any list anymore.
        let slab = unsafe { &mut *header.as_ptr() };
        while let Some(node) = slab.free.pop().or_else(|| slab.spare.pop()) {
            self.free(node.cast());
        }
        self.free(header.cast());
    }

    /// Give a slab that left its list back to the page allocator.
    fn release_slab(&self, cache: &SlabCache, slab: NonNull<Slab>) {
        // SAFETY
        // The slab is alive until its page is freed below.
        let page = unsafe { slab.as_ref().page };
        self.pages.descriptor(page).release(cache);

        if cache.kind == SlabKind::External {
            self.release_external(slab);
        }
        self.pages.free(page);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{testing, unit::MIB};

    #[test]
    fn objects_are_aligned_and_distinct() {
        let objects = testing::boot(4 * MIB).objects;
        let cache = objects.create("aligned", 24, 16).unwrap();
        assert_eq!(cache.kind(), SlabKind::Inline);
        assert_eq!(cache.stride(), 32);

        let a = objects.alloc(cache).unwrap();
        let b = objects.alloc(cache).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.as_ptr() as usize % 16, 0);
        assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, 32);

        objects.free(a);
        assert_eq!(objects.alloc(cache).unwrap(), a);
    }

    #[test]
    fn objects_of_several_slabs_never_overlap() {
        let objects = testing::boot(4 * MIB).objects;
        for &(size, align) in &[(48, 16), (700, 64)] {
            let cache = objects.create("spread", size, align).unwrap();
            let count = 3 * cache.objects_per_slab();

            let mut all = (0..count)
                .map(|_| objects.alloc(cache).unwrap().as_ptr() as usize)
                .collect::<Vec<_>>();
            assert_eq!(cache.slab_count(), 3);
            assert!(all.iter().all(|addr| addr % align == 0));

            all.sort_unstable();
            for pair in all.windows(2) {
                assert!(
                    pair[1] - pair[0] >= cache.stride(),
                    "objects at {:#x} and {:#x} overlap",
                    pair[0],
                    pair[1]
                );
            }

            for addr in all {
                objects.free(NonNull::new(addr as *mut u8).unwrap());
            }
            assert_eq!(cache.objects_in_use(), 0);
        }
    }

    #[test]
    fn slabs_are_searched_in_creation_order() {
        let objects = testing::boot(4 * MIB).objects;
        let cache = objects.create("first fit", 256, 8).unwrap();
        let per_slab = cache.objects_per_slab();

        let first = (0..per_slab).map(|_| objects.alloc(cache).unwrap()).collect::<Vec<_>>();
        assert_eq!(cache.slab_count(), 1);

        let overflow = objects.alloc(cache).unwrap();
        assert_eq!(cache.slab_count(), 2);

        objects.free(first[3]);
        assert_eq!(objects.alloc(cache).unwrap(), first[3]);

        objects.free(overflow);
        assert_eq!(objects.alloc(cache).unwrap(), overflow);
        assert_eq!(cache.objects_in_use(), per_slab + 1);
    }

    #[test]
    fn large_objects_use_external_slabs() {
        let objects = testing::boot(4 * MIB).objects;
        let cache = objects.create("external", 1000, 8).unwrap();
        assert_eq!(cache.kind(), SlabKind::External);
        assert_eq!(cache.objects_per_slab(), PAGE_SIZE / 1000);

        let all = (0..cache.objects_per_slab())
            .map(|_| objects.alloc(cache).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(all[1].as_ptr() as usize - all[0].as_ptr() as usize, 1000);
        assert_eq!(all[0].as_ptr() as usize % PAGE_SIZE, 0);

        // external slabs keep no bookkeeping inside the page
        unsafe { all[0].as_ptr().write_bytes(0x55, 1000) };

        all.iter().rev().for_each(|&object| objects.free(object));
        assert_eq!(cache.objects_in_use(), 0);
        assert_eq!(objects.alloc(cache).unwrap(), all[0]);
    }

    #[test]
    fn page_sized_objects() {
        let objects = testing::boot(4 * MIB).objects;
        let cache = objects.create("pages", PAGE_SIZE, PAGE_SIZE).unwrap();
        assert_eq!(cache.objects_per_slab(), 1);

        let a = objects.alloc(cache).unwrap();
        let b = objects.alloc(cache).unwrap();
        assert_eq!(cache.slab_count(), 2);
        objects.free(a);
        objects.free(b);
    }

    #[test]
    fn invalid_layouts_are_rejected() {
        let objects = testing::boot(4 * MIB).objects;
        assert_eq!(objects.create("empty", 0, 8).err(), Some(Error::InvalidLayout));
        assert_eq!(objects.create("odd", 8, 3).err(), Some(Error::InvalidLayout));
        assert_eq!(
            objects.create("huge", PAGE_SIZE + 1, 8).err(),
            Some(Error::ObjectTooLarge)
        );
    }

    #[test]
    fn shrink_releases_empty_slabs_and_their_pages() {
        let objects = testing::boot(4 * MIB).objects;
        let pages = objects.pages();
        let cache = objects.create("shrink", 512, 8).unwrap();
        let per_slab = cache.objects_per_slab();

        let all = (0..3 * per_slab)
            .map(|_| objects.alloc(cache).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(cache.slab_count(), 3);
        let last_page = pages.to_phys(all[2 * per_slab].as_ptr()).page_base();

        let free_before = pages.free_bytes();
        all.iter().rev().for_each(|&object| objects.free(object));
        assert_eq!(objects.shrink(cache), 2);
        assert_eq!(cache.slab_count(), 1);
        assert_eq!(pages.free_bytes(), free_before + 2 * PAGE_SIZE);
        assert!(pages.descriptor(last_page).owner().is_none());

        // the remaining slab still works
        let again = objects.alloc(cache).unwrap();
        assert_eq!(again, all[0]);
    }

    #[test]
    fn destroy_returns_every_page() {
        let objects = testing::boot(4 * MIB).objects;
        let pages = objects.pages();

        // warm up the pools, so only the cache pages are measured
        let warmup = objects.create("warmup", 2048, 8).unwrap();
        objects.destroy(warmup);

        let free_before = pages.free_bytes();
        let cache = objects.create("destroy", 2048, 8).unwrap();
        let object = objects.alloc(cache).unwrap();
        objects.free(object);
        objects.destroy(cache);

        assert_eq!(pages.free_bytes(), free_before);
    }

    #[test]
    #[should_panic(expected = "live objects")]
    fn destroying_a_cache_in_use_panics() {
        let objects = testing::boot(4 * MIB).objects;
        let cache = objects.create("busy", 64, 8).unwrap();
        let _object = objects.alloc(cache).unwrap();
        objects.destroy(cache);
    }

    #[test]
    #[should_panic(expected = "no object cache owns")]
    fn freeing_a_foreign_pointer_panics() {
        let core = testing::boot(4 * MIB);
        let page = core.pages.alloc(0).unwrap();
        core.objects.free(core.pages.to_virt(page));
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn double_free_panics() {
        let objects = testing::boot(4 * MIB).objects;
        let cache = objects.create("twice", 64, 8).unwrap();
        let object = objects.alloc(cache).unwrap();
        objects.free(object);
        objects.free(object);
    }

    #[test]
    #[should_panic(expected = "not an object of cache")]
    fn freeing_inside_an_object_panics() {
        let objects = testing::boot(4 * MIB).objects;
        let cache = objects.create("inside", 64, 8).unwrap();
        let object = objects.alloc(cache).unwrap();
        objects.free(unsafe { NonNull::new_unchecked(object.as_ptr().add(8)) });
    }
}
