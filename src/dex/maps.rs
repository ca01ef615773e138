//! Map table location and the size recovered from it
//!
//! Every DEX file carries a `map_list` at `map_off`: a `u32` count followed by
//! 12-byte items. The item of type `TYPE_MAP_LIST` points back at the table
//! itself, and the table is the last structure in a well-formed file. Its end
//! is therefore a better file size than the header's `file_size`, which a
//! packer can overwrite at will.

use tracing::trace;

use crate::error::Result;
use crate::memory::MemoryAccess;

use super::region::BoundedRegion;
use super::{
    FILE_SIZE_OFFSET, MAP_COUNT_RANGE, MAP_ITEM_SIZE, MAP_LIST_TYPE, MAP_OFF_OFFSET,
};

/// Address of the map table, or `None` when `map_off` is zero or points
/// outside the region.
pub fn locate_map_address<M: MemoryAccess + ?Sized>(
    region: &BoundedRegion<'_, M>,
    candidate: u64,
) -> Result<Option<u64>> {
    let Some(map_off) = read_header_u32(region, candidate, MAP_OFF_OFFSET)? else {
        return Ok(None);
    };
    if map_off == 0 {
        trace!("no map_off in header at {candidate:#x}");
        return Ok(None);
    }
    Ok(region.offset(candidate, map_off as u64))
}

/// End of the map table at `map_addr`, or `None` when the item count is
/// implausible or the table would run past the region.
pub fn locate_map_end<M: MemoryAccess + ?Sized>(
    region: &BoundedRegion<'_, M>,
    map_addr: u64,
) -> Result<Option<u64>> {
    let Some(count) = region.read_u32(map_addr)? else {
        return Ok(None);
    };
    if !MAP_COUNT_RANGE.contains(&count) {
        trace!(count, "map item count at {map_addr:#x} out of range");
        return Ok(None);
    }
    Ok(region.offset(map_addr, 4 + count as u64 * MAP_ITEM_SIZE))
}

/// True iff one `TYPE_MAP_LIST` item in the table at `map_addr` records the
/// same offset the header at `candidate` declares.
pub fn verify_by_map_list<M: MemoryAccess + ?Sized>(
    region: &BoundedRegion<'_, M>,
    candidate: u64,
    map_addr: u64,
) -> Result<bool> {
    let Some(map_off) = read_header_u32(region, candidate, MAP_OFF_OFFSET)? else {
        return Ok(false);
    };
    let Some(count) = region.read_u32(map_addr)? else {
        return Ok(false);
    };
    if !MAP_COUNT_RANGE.contains(&count) {
        return Ok(false);
    }

    for index in 0..count as u64 {
        let item = map_addr + 4 + index * MAP_ITEM_SIZE;
        if region.read_u16(item)? != Some(MAP_LIST_TYPE) {
            continue;
        }
        if region.read_u32(item + 8)? == Some(map_off) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Byte extent of the DEX file at `candidate`: header start through the end of
/// the map table. Falls back to the declared `file_size` when no usable map
/// table is found, or to zero when even that field is out of bounds.
pub fn resolve_real_size<M: MemoryAccess + ?Sized>(
    region: &BoundedRegion<'_, M>,
    candidate: u64,
) -> Result<u64> {
    let declared = read_header_u32(region, candidate, FILE_SIZE_OFFSET)?.unwrap_or(0) as u64;

    let Some(map_addr) = locate_map_address(region, candidate)? else {
        return Ok(declared);
    };
    let Some(map_end) = locate_map_end(region, map_addr)? else {
        return Ok(declared);
    };
    Ok(map_end - candidate)
}

fn read_header_u32<M: MemoryAccess + ?Sized>(
    region: &BoundedRegion<'_, M>,
    candidate: u64,
    field: u64,
) -> Result<Option<u32>> {
    match candidate.checked_add(field) {
        Some(addr) => region.read_u32(addr),
        None => Ok(None),
    }
}
