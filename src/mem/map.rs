//! A `MemoryMap` which contains a sorted set of non-overlapping,
//! half-open physical memory regions. Regions can be inserted and
//! removed, which is everything needed to turn the firmware map into the
//! set of pages the kernel may hand out.

use super::{align_up, Error, Result};
use crate::unit::MIB;
use core::{cmp, fmt, slice};

/// The number of regions inside a [`MemoryMap`].
pub const REGION_COUNT: usize = 64;

/// Everything below this address belongs to the firmware and is never
/// handed to the allocators.
pub const FIRMWARE_RESERVED: usize = MIB;

/// A half-open range of physical memory: `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// The first address inside this region.
    pub start: usize,
    /// The first address after this region.
    pub end: usize,
}

impl Region {
    /// Create a new `Region` that goes from `start..end`.
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// The number of bytes inside this region.
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    /// Check if this region contains no bytes.
    pub const fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Check if both regions share at least one byte.
    fn overlaps(&self, other: &Region) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Check if both regions share a byte or border each other.
    fn touches(&self, other: &Region) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Check if every byte of `other` lies inside `self`.
    fn covers(&self, other: &Region) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// The kind of memory the firmware reported for a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// Free to use by the kernel.
    Available,
    /// Used by firmware or devices.
    Reserved,
}

/// One entry of the memory map the firmware hands to the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareRegion {
    pub start: usize,
    pub len: usize,
    pub kind: RegionKind,
}

impl FirmwareRegion {
    pub const fn available(start: usize, len: usize) -> Self {
        Self {
            start,
            len,
            kind: RegionKind::Available,
        }
    }

    pub const fn reserved(start: usize, len: usize) -> Self {
        Self {
            start,
            len,
            kind: RegionKind::Reserved,
        }
    }

    /// The physical range covered by this entry.
    pub fn region(&self) -> Result<Region> {
        let end = self.start.checked_add(self.len).ok_or(Error::InvalidRange)?;
        Ok(Region::new(self.start, end))
    }
}

/// A fixed-size, sorted set of available [regions](Region).
///
/// Build it by [inserting](MemoryMap::insert) everything that is usable
/// and then [removing](MemoryMap::remove) everything that is not.
#[derive(Clone)]
pub struct MemoryMap {
    regions: [Region; REGION_COUNT],
    len: usize,
}

impl MemoryMap {
    /// Create a new, empty memory map.
    pub const fn new() -> Self {
        Self {
            regions: [Region::new(0, 0); REGION_COUNT],
            len: 0,
        }
    }

    /// Build the map of usable memory from the firmware memory map.
    ///
    /// The kernel image, all reserved entries and everything below
    /// [`FIRMWARE_RESERVED`] are left out.
    pub fn from_firmware(entries: &[FirmwareRegion], kernel_image: Region) -> Result<Self> {
        let mut map = Self::new();

        for entry in entries.iter().filter(|e| e.kind == RegionKind::Available) {
            map.insert(entry.region()?)?;
        }

        for entry in entries.iter().filter(|e| e.kind == RegionKind::Reserved) {
            map.remove(entry.region()?)?;
        }

        map.remove(kernel_image)?;
        map.remove(Region::new(0, FIRMWARE_RESERVED))?;

        log::debug!(
            "memory map has {} regions, {:#x} bytes usable",
            map.len(),
            map.total_size()
        );
        Ok(map)
    }

    /// Insert a new region into this map.
    ///
    /// If the region overlaps or borders other regions inside this map,
    /// all of them will be collapsed into a single region.
    pub fn insert(&mut self, region: Region) -> Result<()> {
        if region.start > region.end {
            return Err(Error::InvalidRange);
        }
        if region.is_empty() {
            return Ok(());
        }

        let mut merged = region;
        let mut idx = 0;
        while idx < self.len {
            let other = self.regions[idx];
            if merged.touches(&other) {
                merged.start = cmp::min(merged.start, other.start);
                merged.end = cmp::max(merged.end, other.end);
                self.remove_at(idx);
            } else {
                idx += 1;
            }
        }

        if self.len == REGION_COUNT {
            return Err(Error::MapFull);
        }

        let pos = self
            .iter()
            .position(|other| other.start > merged.start)
            .unwrap_or(self.len);
        self.insert_at(pos, merged);
        Ok(())
    }

    /// Remove every byte of `region` from this map.
    ///
    /// Regions are trimmed, dropped or split in two as needed.
    pub fn remove(&mut self, region: Region) -> Result<()> {
        if region.start > region.end {
            return Err(Error::InvalidRange);
        }

        let mut idx = 0;
        while idx < self.len {
            let other = self.regions[idx];

            if !region.overlaps(&other) {
                idx += 1;
                continue;
            }

            if region.covers(&other) {
                self.remove_at(idx);
                continue;
            }

            if region.start <= other.start {
                // [=====`region`=====]
                //              [=====`other`=====]
                //
                // becomes
                //
                // [=====`region`=====][==`other`==]
                self.regions[idx].start = region.end;
            } else if region.end >= other.end {
                // [=====`other`=====]
                //              [=====`region`=====]
                //
                // becomes
                //
                // [==`other`==][=====`region`=====]
                self.regions[idx].end = region.start;
            } else {
                // [==========`other`==========]
                //      [====`region`====]
                //
                // becomes
                //
                // [===]                  [===]
                //      [====`region`====]
                if self.len == REGION_COUNT {
                    return Err(Error::MapFull);
                }
                self.regions[idx].end = region.start;
                self.insert_at(idx + 1, Region::new(region.end, other.end));
                // the tail we just inserted can't overlap `region`
                idx += 1;
            }

            idx += 1;
        }

        Ok(())
    }

    /// Cut `size` bytes aligned to `align` out of the first region that
    /// is large enough, and return the start of the cut.
    pub fn take(&mut self, size: usize, align: usize) -> Option<usize> {
        let start = self.iter().find_map(|region| {
            let start = align_up(region.start, align);
            let end = start.checked_add(size)?;
            (end <= region.end).then(|| start)
        })?;

        self.remove(Region::new(start, start + size)).ok()?;
        Some(start)
    }

    /// The end of the highest available region.
    pub fn highest_address(&self) -> usize {
        self.as_slice().last().map_or(0, |region| region.end)
    }

    /// The number of bytes covered by all regions.
    pub fn total_size(&self) -> usize {
        self.iter().map(Region::len).sum()
    }

    /// Return a slice that contains all regions, sorted by address.
    #[inline]
    pub fn as_slice(&self) -> &[Region] {
        &self.regions[..self.len]
    }

    /// Return an iterator over all regions of this map.
    pub fn iter(&self) -> slice::Iter<'_, Region> {
        self.as_slice().iter()
    }

    /// Return the number of regions inside this map.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if this map is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn remove_at(&mut self, idx: usize) {
        // move the removed region behind the end of the map,
        // where it will be overwritten by the next insertion
        self.regions[idx..self.len].rotate_left(1);
        self.len -= 1;
    }

    fn insert_at(&mut self, idx: usize, region: Region) {
        debug_assert!(self.len < REGION_COUNT);
        self.regions[idx..=self.len].rotate_right(1);
        self.regions[idx] = region;
        self.len += 1;
    }
}

impl Default for MemoryMap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|r| r.start..r.end))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(regions: &[(usize, usize)]) -> MemoryMap {
        let mut map = MemoryMap::new();
        for &(start, end) in regions {
            map.insert(Region::new(start, end)).unwrap();
        }
        map
    }

    #[test]
    fn insert_keeps_regions_sorted() {
        let map = map(&[(0x5000, 0x6000), (0x1000, 0x2000), (0x3000, 0x4000)]);
        assert_eq!(
            map.as_slice(),
            &[
                Region::new(0x1000, 0x2000),
                Region::new(0x3000, 0x4000),
                Region::new(0x5000, 0x6000),
            ]
        );
    }

    #[test]
    fn insert_merges_overlapping_and_touching_regions() {
        let mut map = map(&[(0x1000, 0x2000), (0x3000, 0x4000)]);
        map.insert(Region::new(0x2000, 0x3000)).unwrap();
        assert_eq!(map.as_slice(), &[Region::new(0x1000, 0x4000)]);

        map.insert(Region::new(0x3800, 0x5000)).unwrap();
        assert_eq!(map.as_slice(), &[Region::new(0x1000, 0x5000)]);
    }

    #[test]
    fn insert_rejects_inverted_regions() {
        let mut map = MemoryMap::new();
        assert_eq!(map.insert(Region::new(2, 1)), Err(Error::InvalidRange));
    }

    #[test]
    fn remove_trims_and_splits() {
        let mut map = map(&[(0x0, 0x10000)]);

        map.remove(Region::new(0x0, 0x1000)).unwrap();
        map.remove(Region::new(0xf000, 0x20000)).unwrap();
        assert_eq!(map.as_slice(), &[Region::new(0x1000, 0xf000)]);

        map.remove(Region::new(0x4000, 0x5000)).unwrap();
        assert_eq!(
            map.as_slice(),
            &[Region::new(0x1000, 0x4000), Region::new(0x5000, 0xf000)]
        );

        map.remove(Region::new(0x0, 0x100000)).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn split_fails_on_a_full_map() {
        let mut map = MemoryMap::new();
        for idx in 0..REGION_COUNT {
            map.insert(Region::new(idx * 0x3000, idx * 0x3000 + 0x2000))
                .unwrap();
        }
        assert_eq!(
            map.remove(Region::new(0x800, 0x1000)),
            Err(Error::MapFull)
        );
    }

    #[test]
    fn take_respects_alignment_and_consumes_memory() {
        let mut map = map(&[(0x1800, 0x3000), (0x10000, 0x20000)]);

        assert_eq!(map.take(0x1000, 0x1000), Some(0x2000));
        assert_eq!(
            map.as_slice(),
            &[Region::new(0x1800, 0x2000), Region::new(0x10000, 0x20000)]
        );

        assert_eq!(map.take(0x4000, 0x1000), Some(0x10000));
        assert_eq!(map.take(0x100000, 8), None);
    }

    #[test]
    fn firmware_map_drops_reserved_memory_and_the_kernel() {
        let entries = [
            FirmwareRegion::available(0, 0x9f000),
            FirmwareRegion::available(0x100000, 0x7f00000),
            FirmwareRegion::reserved(0x4000000, 0x1000),
        ];
        let kernel = Region::new(0x100000, 0x300000);

        let map = MemoryMap::from_firmware(&entries, kernel).unwrap();
        assert_eq!(
            map.as_slice(),
            &[
                Region::new(0x300000, 0x4000000),
                Region::new(0x4001000, 0x8000000),
            ]
        );
        assert_eq!(map.highest_address(), 0x8000000);
    }
}
