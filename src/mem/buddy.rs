//! Implementation of a Buddy Allocator that is responsible for allocating
//! physical pages, which will then be used by either the slab allocator
//! to allocate objects, or directly by the kernel.
//!
//! Every physical page has a [`BuddyNode`] in one big array. Free blocks
//! are linked into one list per order through their first node, and the
//! buddy of the block starting at page `i` with order `o` is the block
//! starting at page `i ^ (1 << o)`.

use super::{AllocStats, Error, MemoryMap, PhysAddr, Result, PAGE_SIZE};
use crate::unit::GIB;
use core::cmp;

/// The maximum order for the buddy allocator. (inclusive).
///
/// A block of the maximum order spans `2^MAX_ORDER` pages, which is 4GiB.
pub const MAX_ORDER: usize = 20;

/// The number of free lists inside the buddy allocator.
///
/// We add `1` here because this is the size of the array.
pub const ORDER_COUNT: usize = MAX_ORDER + 1;

/// The first phase of initialization only frees memory below this address.
pub const LOW_MEMORY_LIMIT: usize = 4 * GIB;

/// Calculates the number of bytes inside the `order`.
pub const fn size_for_order(order: usize) -> usize {
    (1 << order) * PAGE_SIZE
}

/// Reference to the neighbour of a node inside a free list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    /// The node is not linked.
    None,
    /// The node is the first one of the list for this order.
    Head(u8),
    /// Index of another node.
    Node(usize),
}

impl Link {
    fn node(self) -> Option<usize> {
        match self {
            Link::Node(idx) => Some(idx),
            _ => None,
        }
    }
}

/// What a page currently is to the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// The page starts a free block and is linked into a free list.
    Free,
    /// The page starts a block that is handed out.
    Allocated,
    /// The page was never made available.
    Unavailable,
    /// The page lies inside a larger block that starts at another page.
    Interior,
}

/// Per-page bookkeeping of the buddy allocator.
#[derive(Debug, Clone, Copy)]
pub struct BuddyNode {
    order: u8,
    state: NodeState,
    prev: Link,
    next: Link,
}

impl BuddyNode {
    /// A node for a page that is not available.
    pub const fn new() -> Self {
        Self {
            order: 0,
            state: NodeState::Unavailable,
            prev: Link::None,
            next: Link::None,
        }
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn order(&self) -> usize {
        self.order as usize
    }
}

impl Default for BuddyNode {
    fn default() -> Self {
        Self::new()
    }
}

/// Which part of the memory was handed to the allocator so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Inactive,
    Low,
    Full,
}

/// The central structure that is responsible for allocating pages
/// using the buddy algorithm.
pub struct BuddyAllocator {
    heads: [Option<usize>; ORDER_COUNT],
    nodes: &'static mut [BuddyNode],
    map: MemoryMap,
    low_limit: usize,
    phase: Phase,
    stats: AllocStats,
}

impl BuddyAllocator {
    /// The number of nodes needed to describe every page of `map`.
    pub fn node_count(map: &MemoryMap) -> usize {
        super::align_up(map.highest_address(), PAGE_SIZE) / PAGE_SIZE
    }

    /// Create a new allocator where no page is available yet.
    ///
    /// `nodes` must hold [`node_count`](Self::node_count) fresh nodes.
    /// The first initialization phase only frees memory below `low_limit`.
    pub fn new(nodes: &'static mut [BuddyNode], low_limit: usize) -> Self {
        Self {
            heads: [None; ORDER_COUNT],
            nodes,
            map: MemoryMap::new(),
            low_limit,
            phase: Phase::Inactive,
            stats: AllocStats::with_name("Buddy Allocator"),
        }
    }

    /// Make every page of `map` below the low memory limit available.
    pub fn init_low(&mut self, map: MemoryMap) -> Result<()> {
        if self.phase != Phase::Inactive {
            return Err(Error::AlreadyInitialized);
        }

        for region in map.iter() {
            self.release_range(region.start, cmp::min(region.end, self.low_limit));
        }

        self.map = map;
        self.phase = Phase::Low;
        log::info!(
            "buddy allocator: {:#x} bytes of low memory available",
            self.stats.total
        );
        Ok(())
    }

    /// Make the rest of the memory map available.
    ///
    /// Must run after [`init_low`](Self::init_low), once the kernel can
    /// reach memory above the low memory limit.
    pub fn init_high(&mut self) -> Result<()> {
        match self.phase {
            Phase::Inactive => return Err(Error::LowMemoryInactive),
            Phase::Full => return Err(Error::AlreadyInitialized),
            Phase::Low => {}
        }

        let map = self.map.clone();
        for region in map.iter() {
            self.release_range(cmp::max(region.start, self.low_limit), region.end);
        }

        self.phase = Phase::Full;
        log::info!(
            "buddy allocator: {:#x} bytes of memory available",
            self.stats.total
        );
        Ok(())
    }

    /// Allocates a block of memory that has the given order.
    ///
    /// The size for the given block is defined by the `order`, calculated using:
    /// ```ignore
    /// size = (1 << order) * PAGE_SIZE
    /// ```
    pub fn allocate(&mut self, order: usize) -> Result<PhysAddr> {
        if order > MAX_ORDER {
            return Err(Error::OrderTooLarge);
        }

        // find the smallest order that has a free block
        let (mut current, idx) = (order..ORDER_COUNT)
            .find_map(|order| self.heads[order].map(|idx| (order, idx)))
            .ok_or(Error::NoMemoryAvailable)?;

        self.unlink(idx);

        // split the block until it has the requested order,
        // the upper half of every split goes back into the free lists
        while current > order {
            current -= 1;
            let buddy = idx ^ (1 << current);
            log::trace!("split page {} from page {} at order {}", buddy, idx, current);
            self.push(buddy, current);
        }

        let node = &mut self.nodes[idx];
        node.order = order as u8;
        node.state = NodeState::Allocated;

        self.stats.allocated += size_for_order(order);
        self.stats.free -= size_for_order(order);
        Ok(PhysAddr::from_page(idx))
    }

    /// Give a block that was returned by [`allocate`](Self::allocate) back to the allocator.
    ///
    /// # Panics
    ///
    /// If `addr` is not the start of an allocated block.
    pub fn deallocate(&mut self, addr: PhysAddr) {
        let idx = self.index_of(addr);
        let node = self.nodes[idx];
        assert!(
            node.state == NodeState::Allocated,
            "tried to free {}, which is not an allocated block ({:?})",
            addr,
            node.state
        );

        self.stats.allocated -= size_for_order(node.order());
        self.stats.free += size_for_order(node.order());
        self.release(idx, node.order());
    }

    /// The index of the buddy of the block at `idx` with `order`,
    /// if that buddy exists at all.
    pub fn buddy_of(&self, idx: usize, order: usize) -> Option<usize> {
        let buddy = idx ^ (1 << order);
        (buddy < self.nodes.len()).then(|| buddy)
    }

    /// The number of free blocks of the given order.
    pub fn free_blocks(&self, order: usize) -> usize {
        core::iter::successors(self.heads[order], |&idx| self.nodes[idx].next.node()).count()
    }

    /// The node that describes the page at `addr`.
    pub fn node(&self, addr: PhysAddr) -> &BuddyNode {
        &self.nodes[self.index_of(addr)]
    }

    /// The number of pages this allocator describes.
    pub fn page_count(&self) -> usize {
        self.nodes.len()
    }

    /// Return a copy of the statistics of this allocator.
    pub fn stats(&self) -> AllocStats {
        self.stats.clone()
    }

    /// Free every page inside `start..end` that was never made available.
    fn release_range(&mut self, start: usize, end: usize) {
        if start >= end {
            return;
        }

        let first = super::align_up(start, PAGE_SIZE) / PAGE_SIZE;
        let last = cmp::min(end / PAGE_SIZE, self.nodes.len());

        for idx in first..last {
            let node = self.nodes[idx];
            if node.state != NodeState::Unavailable {
                continue;
            }

            self.stats.total += PAGE_SIZE;
            self.stats.free += PAGE_SIZE;
            self.release(idx, 0);
        }
    }

    /// Insert the block at `idx` into the free lists, merging it with its
    /// buddies as long as they are free.
    fn release(&mut self, mut idx: usize, mut order: usize) {
        while order < MAX_ORDER {
            let buddy = match self.buddy_of(idx, order) {
                Some(buddy) => buddy,
                None => break,
            };

            let node = self.nodes[buddy];
            if node.state != NodeState::Free || node.order() != order {
                break;
            }

            self.unlink(buddy);

            // the lower block becomes the head of the merged block
            let (low, high) = (cmp::min(idx, buddy), cmp::max(idx, buddy));
            self.nodes[high].state = NodeState::Interior;
            log::trace!("merge page {} into page {} at order {}", high, low, order);

            idx = low;
            order += 1;
        }

        self.push(idx, order);
    }

    /// Push the block at `idx` onto the free list of `order`.
    fn push(&mut self, idx: usize, order: usize) {
        let old = self.heads[order];
        if let Some(old) = old {
            self.nodes[old].prev = Link::Node(idx);
        }

        let node = &mut self.nodes[idx];
        node.order = order as u8;
        node.state = NodeState::Free;
        node.prev = Link::Head(order as u8);
        node.next = old.map_or(Link::None, Link::Node);

        self.heads[order] = Some(idx);
    }

    /// Remove the block at `idx` from whatever free list it is in.
    fn unlink(&mut self, idx: usize) {
        let BuddyNode { prev, next, .. } = self.nodes[idx];

        match prev {
            Link::Head(order) => self.heads[order as usize] = next.node(),
            Link::Node(prev) => self.nodes[prev].next = next,
            Link::None => panic!("page {} is not part of a free list", idx),
        }

        if let Some(next) = next.node() {
            self.nodes[next].prev = prev;
        }

        let node = &mut self.nodes[idx];
        node.prev = Link::None;
        node.next = Link::None;
    }

    fn index_of(&self, addr: PhysAddr) -> usize {
        assert!(addr.is_page_aligned(), "{} is not page aligned", addr);
        let idx = addr.page();
        assert!(
            idx < self.nodes.len(),
            "{} lies outside of the physical memory",
            addr
        );
        idx
    }
}
