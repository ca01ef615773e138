//! Region walk and the shallow/deep search strategies

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::config::ScanConfig;
use crate::dex::{
    resolve_real_size, verify, BoundedRegion, BytePattern, DEX_MAGIC_PATTERN,
    STRING_IDS_OFF_OFFSET, STRING_IDS_PATTERN,
};
use crate::error::Result;
use crate::memory::{MemoryAccess, MemoryRegion};

/// An address/size pair believed to delimit one DEX file in memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub address: u64,
    pub size: u64,
}

pub struct DexScanner<'a, M: ?Sized> {
    mem: &'a M,
    config: &'a ScanConfig,
    magic: BytePattern,
    string_ids: BytePattern,
}

impl<'a, M: MemoryAccess + ?Sized> DexScanner<'a, M> {
    pub fn new(mem: &'a M, config: &'a ScanConfig) -> Result<Self> {
        Ok(Self {
            mem,
            config,
            magic: BytePattern::parse(DEX_MAGIC_PATTERN)?,
            string_ids: BytePattern::parse(STRING_IDS_PATTERN)?,
        })
    }

    /// Scan every readable region in enumeration order.
    ///
    /// Fails only when the regions cannot be enumerated. A region that turns
    /// unreadable halfway is abandoned, keeping what it already produced.
    pub fn scan(&self) -> Result<Vec<Candidate>> {
        let regions = self.mem.readable_regions()?;
        let mut found = Vec::new();
        let mut abandoned = 0usize;

        for region in &regions {
            if self.is_excluded(region) {
                debug!(region = %region.describe(), "skipping platform mapping");
                continue;
            }
            if let Err(err) = self.scan_region(region, &mut found) {
                abandoned += 1;
                warn!(
                    base = %format_args!("{:#x}", region.base),
                    region = %region.describe(),
                    "abandoning region: {err}"
                );
            }
        }

        info!(
            regions = regions.len(),
            abandoned,
            candidates = found.len(),
            deep = self.config.deep_search,
            "scan finished"
        );
        Ok(found)
    }

    pub fn is_excluded(&self, region: &MemoryRegion) -> bool {
        let Some(path) = region.path().and_then(|p| p.to_str()) else {
            return false;
        };
        self.config
            .excluded_path_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && path.starts_with(prefix.as_str()))
    }

    /// Run the configured search over one region, appending to `out`.
    pub fn scan_region(&self, region: &MemoryRegion, out: &mut Vec<Candidate>) -> Result<()> {
        let bounded = BoundedRegion::new(self.mem, region);
        let deep = self.config.deep_search;

        for addr in self.mem.find_pattern(region, &self.magic)? {
            if !verify(&bounded, addr, false)? {
                trace!("magic at {addr:#x} failed header check");
                continue;
            }
            let size = resolve_real_size(&bounded, addr)?;
            emit(out, region, addr, size);
            if deep {
                emit_max_size(out, &bounded, addr, size);
            }
        }

        if deep {
            for hit in self.mem.find_pattern(region, &self.string_ids)? {
                let Some(addr) = hit.checked_sub(STRING_IDS_OFF_OFFSET) else {
                    continue;
                };
                if addr < region.base || bounded.has_magic(addr)? {
                    continue;
                }
                if verify(&bounded, addr, true)? {
                    let size = resolve_real_size(&bounded, addr)?;
                    emit(out, region, addr, size);
                    // Anchored on the header, not the match: a fallback starting
                    // at `hit` would run 0x3C bytes past the region end.
                    emit_max_size(out, &bounded, addr, size);
                }
            }
        } else if !bounded.has_magic(region.base)? && verify(&bounded, region.base, true)? {
            let size = resolve_real_size(&bounded, region.base)?;
            emit(out, region, region.base, size);
        }

        Ok(())
    }
}

fn emit(out: &mut Vec<Candidate>, region: &MemoryRegion, address: u64, size: u64) {
    info!(
        region = %region.describe(),
        "dex candidate at {address:#x}, size {size:#x}"
    );
    out.push(Candidate { address, size });
}

/// Hedge against an undershooting size: also offer everything from `address`
/// to the end of the region.
fn emit_max_size<M: MemoryAccess + ?Sized>(
    out: &mut Vec<Candidate>,
    region: &BoundedRegion<'_, M>,
    address: u64,
    size: u64,
) {
    let max_size = region.size() - (address - region.base());
    if max_size != size {
        debug!("max-size fallback at {address:#x}, size {max_size:#x}");
        out.push(Candidate {
            address,
            size: max_size,
        });
    }
}
