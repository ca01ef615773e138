use std::io;
use std::ops::Range;
use std::path::Path;

use super::{MemoryAccess, MemoryRegion};
use crate::error::{DumperError, Result};

struct SnapshotRegion {
    region: MemoryRegion,
    data: Vec<u8>,
    holes: Vec<Range<u64>>,
}

/// An address space held entirely in memory.
///
/// Regions are reported in insertion order. Reads must fall inside a single
/// region and must not touch any hole added with [`MemorySnapshot::with_hole`];
/// otherwise they fail like an unmapped page would (`EIO`).
#[derive(Default)]
pub struct MemorySnapshot {
    regions: Vec<SnapshotRegion>,
}

impl MemorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a region. `data` is truncated or zero-padded to `region.size`.
    pub fn with_region(mut self, region: MemoryRegion, mut data: Vec<u8>) -> Self {
        data.resize(region.size as usize, 0);
        self.regions.push(SnapshotRegion {
            region,
            data,
            holes: Vec::new(),
        });
        self
    }

    /// Mark `range` as unreadable in whichever regions it overlaps.
    pub fn with_hole(mut self, range: Range<u64>) -> Self {
        for entry in &mut self.regions {
            if range.start < entry.region.end() && range.end > entry.region.base {
                entry.holes.push(range.clone());
            }
        }
        self
    }

    /// Load a raw memory dump as one read-only region starting at `base`.
    pub fn from_file(path: &Path, base: u64) -> Result<Self> {
        let data = std::fs::read(path)
            .map_err(|err| DumperError::from_io_error(path.display().to_string(), err))?;
        let region = MemoryRegion::new(base, data.len() as u64).with_path(path);
        Ok(Self::new().with_region(region, data))
    }
}

impl MemoryAccess for MemorySnapshot {
    fn readable_regions(&self) -> Result<Vec<MemoryRegion>> {
        Ok(self.regions.iter().map(|r| r.region.clone()).collect())
    }

    fn read_bytes(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        let len = buf.len();
        let unmapped = || DumperError::unreadable(addr, len, io::Error::from_raw_os_error(5));
        let end = addr.checked_add(len as u64).ok_or_else(unmapped)?;

        let entry = self
            .regions
            .iter()
            .find(|r| addr >= r.region.base && end <= r.region.end())
            .ok_or_else(unmapped)?;
        if entry.holes.iter().any(|h| addr < h.end && end > h.start) {
            return Err(unmapped());
        }

        let start = (addr - entry.region.base) as usize;
        buf.copy_from_slice(&entry.data[start..start + len]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_inside_region() {
        let mem = MemorySnapshot::new()
            .with_region(MemoryRegion::new(0x4000, 8), vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(mem.read_u32(0x4004).unwrap(), 0x0807_0605);
    }

    #[test]
    fn reads_crossing_region_end_fail() {
        let mem = MemorySnapshot::new().with_region(MemoryRegion::new(0x4000, 8), vec![0; 8]);
        let err = mem.read_u32(0x4006).unwrap_err();
        assert!(matches!(err, DumperError::UnreadableMemory { addr: 0x4006, len: 4, .. }));
        assert!(mem.read_u32(u64::MAX - 1).is_err());
    }

    #[test]
    fn holes_are_unreadable() {
        let mem = MemorySnapshot::new()
            .with_region(MemoryRegion::new(0, 0x3000), Vec::new())
            .with_hole(0x1000..0x2000);
        assert!(mem.read_u32(0x0ffc).is_ok());
        assert!(mem.read_u32(0x0ffe).is_err());
        assert!(mem.read_u32(0x2000).is_ok());
    }

    #[test]
    fn from_file_maps_contents_at_base() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"dex\n035\0").unwrap();

        let mem = MemorySnapshot::from_file(file.path(), 0x7000_0000).unwrap();
        let regions = mem.readable_regions().unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].base, 0x7000_0000);
        assert_eq!(regions[0].size, 8);
        assert_eq!(mem.read_cstring(0x7000_0000, 4).unwrap(), "dex\n");
    }
}
