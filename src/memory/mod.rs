//! Access to the target's address space
//!
//! The scanner never touches memory directly. Everything goes through
//! [`MemoryAccess`], which is backed by `/proc/<pid>/mem` for live processes and
//! by [`MemorySnapshot`] for raw dump files and tests.

mod guard;
mod process;
mod snapshot;

use std::fmt;
use std::path::{Path, PathBuf};

use crate::dex::BytePattern;
use crate::error::Result;

pub use guard::FrozenProcess;
pub use process::ProcessMemory;
pub use snapshot::MemorySnapshot;

/// Bytes read per window while searching a region for a pattern.
pub const SCAN_CHUNK: usize = 1024 * 1024;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Permissions {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
    pub shared: bool,
}

impl Permissions {
    pub const READ_ONLY: Permissions = Permissions {
        read: true,
        write: false,
        execute: false,
        shared: false,
    };
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |on: bool, c: char| if on { c } else { '-' };
        write!(
            f,
            "{}{}{}{}",
            flag(self.read, 'r'),
            flag(self.write, 'w'),
            flag(self.execute, 'x'),
            if self.shared { 's' } else { 'p' }
        )
    }
}

/// One readable mapping of the target, valid for a single scan pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryRegion {
    pub base: u64,
    pub size: u64,
    pub permissions: Permissions,
    pub path: Option<PathBuf>,
}

impl MemoryRegion {
    pub fn new(base: u64, size: u64) -> Self {
        Self {
            base,
            size,
            permissions: Permissions::READ_ONLY,
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.size)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Short description used in logs and the dump manifest.
    pub fn describe(&self) -> String {
        match &self.path {
            Some(p) => p.display().to_string(),
            None => "[anon]".to_string(),
        }
    }
}

/// Fallible view of another address space.
///
/// Every method may fail with [`DumperError::UnreadableMemory`]; callers decide
/// whether that invalidates a candidate, a region, or the whole operation.
///
/// [`DumperError::UnreadableMemory`]: crate::error::DumperError::UnreadableMemory
pub trait MemoryAccess {
    /// Readable mappings, in the order the backend enumerates them.
    fn readable_regions(&self) -> Result<Vec<MemoryRegion>>;

    /// Fill `buf` from `addr`, or fail without partial results.
    fn read_bytes(&self, addr: u64, buf: &mut [u8]) -> Result<()>;

    fn read_vec(&self, addr: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_bytes(addr, &mut buf)?;
        Ok(buf)
    }

    fn read_u16(&self, addr: u64) -> Result<u16> {
        let mut raw = [0u8; 2];
        self.read_bytes(addr, &mut raw)?;
        Ok(u16::from_le_bytes(raw))
    }

    fn read_u32(&self, addr: u64) -> Result<u32> {
        let mut raw = [0u8; 4];
        self.read_bytes(addr, &mut raw)?;
        Ok(u32::from_le_bytes(raw))
    }

    /// Read up to `max_len` bytes, stopping at the first NUL.
    fn read_cstring(&self, addr: u64, max_len: usize) -> Result<String> {
        let raw = self.read_vec(addr, max_len)?;
        let len = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..len]).into_owned())
    }

    /// Addresses of every match of `pattern` inside `region`, ascending.
    ///
    /// Windows overlap by `pattern.len() - 1` bytes so matches straddling a
    /// window boundary are still found, and each is reported once.
    fn find_pattern(&self, region: &MemoryRegion, pattern: &BytePattern) -> Result<Vec<u64>> {
        let end = region.end();
        let overlap = pattern.len().saturating_sub(1) as u64;
        let mut matches = Vec::new();
        let mut buf = Vec::new();
        let mut pos = region.base;

        while pos < end {
            let step = (end - pos).min(SCAN_CHUNK as u64);
            let window = (step + overlap).min(end - pos) as usize;
            buf.resize(window, 0);
            self.read_bytes(pos, &mut buf)?;

            matches.extend(
                pattern
                    .find_iter(&buf)
                    .filter(|off| (*off as u64) < step)
                    .map(|off| pos + off as u64),
            );
            pos += step;
        }

        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissions_display() {
        assert_eq!(Permissions::READ_ONLY.to_string(), "r--p");
        let rwxs = Permissions {
            read: true,
            write: true,
            execute: true,
            shared: true,
        };
        assert_eq!(rwxs.to_string(), "rwxs");
    }

    #[test]
    fn region_end_saturates() {
        assert_eq!(MemoryRegion::new(0x1000, 0x2000).end(), 0x3000);
        assert_eq!(MemoryRegion::new(u64::MAX - 1, 0x10).end(), u64::MAX);
    }

    #[test]
    fn find_pattern_spans_window_boundary() {
        let base = 0x10_0000u64;
        let mut data = vec![0u8; SCAN_CHUNK + 64];
        let straddle = SCAN_CHUNK - 3;
        data[straddle..straddle + 8].copy_from_slice(b"dex\n035\0");
        data[16..24].copy_from_slice(b"dex\n039\0");
        let mem =
            MemorySnapshot::new().with_region(MemoryRegion::new(base, data.len() as u64), data);
        let region = &mem.readable_regions().unwrap()[0];

        let pattern = BytePattern::parse(crate::dex::DEX_MAGIC_PATTERN).unwrap();
        let hits = mem.find_pattern(region, &pattern).unwrap();
        assert_eq!(hits, vec![base + 16, base + straddle as u64]);
    }

    #[test]
    fn read_cstring_stops_at_nul() {
        let mut data = vec![0u8; 16];
        data[..6].copy_from_slice(b"dex\n03");
        data[2] = 0;
        let mem = MemorySnapshot::new().with_region(MemoryRegion::new(0, 16), data);
        assert_eq!(mem.read_cstring(0, 4).unwrap(), "de");
        assert_eq!(mem.read_u16(0).unwrap(), u16::from_le_bytes(*b"de"));
    }
}
