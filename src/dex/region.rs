use crate::error::Result;
use crate::memory::{MemoryAccess, MemoryRegion};

use super::DEX_MAGIC_PREFIX;

/// A memory collaborator restricted to `[base, end]`.
///
/// All header and map-table reads go through here. A read whose bytes do not
/// fit inside the bounds yields `Ok(None)` without touching memory; `Err` is
/// reserved for addresses that are in bounds but unreadable.
pub struct BoundedRegion<'a, M: ?Sized> {
    mem: &'a M,
    base: u64,
    end: u64,
}

impl<'a, M: MemoryAccess + ?Sized> BoundedRegion<'a, M> {
    pub fn new(mem: &'a M, region: &MemoryRegion) -> Self {
        Self {
            mem,
            base: region.base,
            end: region.end(),
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn size(&self) -> u64 {
        self.end - self.base
    }

    /// Inclusive of `end`: a structure may finish exactly at the region end.
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr <= self.end
    }

    /// Whether `len` bytes starting at `addr` lie inside the region.
    pub fn fits(&self, addr: u64, len: u64) -> bool {
        addr >= self.base && addr.checked_add(len).is_some_and(|last| last <= self.end)
    }

    /// `addr + off`, if that lands inside the region.
    pub fn offset(&self, addr: u64, off: u64) -> Option<u64> {
        addr.checked_add(off).filter(|a| self.contains(*a))
    }

    pub fn read_u16(&self, addr: u64) -> Result<Option<u16>> {
        if !self.fits(addr, 2) {
            return Ok(None);
        }
        self.mem.read_u16(addr).map(Some)
    }

    pub fn read_u32(&self, addr: u64) -> Result<Option<u32>> {
        if !self.fits(addr, 4) {
            return Ok(None);
        }
        self.mem.read_u32(addr).map(Some)
    }

    /// True iff the bytes at `addr` read exactly `"dex\n"`.
    pub fn has_magic(&self, addr: u64) -> Result<bool> {
        if !self.fits(addr, DEX_MAGIC_PREFIX.len() as u64) {
            return Ok(false);
        }
        let text = self.mem.read_cstring(addr, DEX_MAGIC_PREFIX.len())?;
        Ok(text.as_bytes() == DEX_MAGIC_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySnapshot;

    fn snapshot() -> (MemorySnapshot, MemoryRegion) {
        let region = MemoryRegion::new(0x1000, 0x10);
        let mut data = vec![0u8; 0x10];
        data[..4].copy_from_slice(b"dex\n");
        data[0x0c..].copy_from_slice(&0xAABB_CCDDu32.to_le_bytes());
        (
            MemorySnapshot::new().with_region(region.clone(), data),
            region,
        )
    }

    #[test]
    fn bounds_are_inclusive_of_end() {
        let (mem, region) = snapshot();
        let bounded = BoundedRegion::new(&mem, &region);
        assert!(bounded.contains(0x1010));
        assert!(!bounded.contains(0x1011));
        assert!(!bounded.contains(0x0fff));
        assert!(bounded.fits(0x100c, 4));
        assert!(!bounded.fits(0x100d, 4));
        assert!(!bounded.fits(u64::MAX, 4));
        assert_eq!(bounded.offset(0x1000, 0x10), Some(0x1010));
        assert_eq!(bounded.offset(0x1000, 0x11), None);
        assert_eq!(bounded.offset(u64::MAX, 1), None);
    }

    #[test]
    fn out_of_bounds_reads_are_none() {
        let (mem, region) = snapshot();
        let bounded = BoundedRegion::new(&mem, &region);
        assert_eq!(bounded.read_u32(0x100c).unwrap(), Some(0xAABB_CCDD));
        assert_eq!(bounded.read_u32(0x100e).unwrap(), None);
        assert_eq!(bounded.read_u16(0x0ffe).unwrap(), None);
    }

    #[test]
    fn magic_check_requires_exact_prefix() {
        let (mem, region) = snapshot();
        let bounded = BoundedRegion::new(&mem, &region);
        assert!(bounded.has_magic(0x1000).unwrap());
        assert!(!bounded.has_magic(0x1001).unwrap());
        assert!(!bounded.has_magic(0x100e).unwrap());
    }
}
