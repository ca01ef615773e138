//! Header plausibility checks

use crate::error::Result;
use crate::memory::MemoryAccess;

use super::maps::{locate_map_address, locate_map_end, verify_by_map_list};
use super::region::BoundedRegion;
use super::{HEADER_SIZE, STRING_IDS_OFF_OFFSET};

/// Decide whether `candidate` starts a DEX header.
///
/// The cheap check (`strict == false`) only asks that `string_ids_off` equals
/// the header size, which holds for any unmodified header; it is meant for
/// addresses already anchored on the magic. The strict check ignores the
/// magic entirely and requires the map table to declare its own offset.
///
/// Either way a header that would not fit in the region is rejected.
pub fn verify<M: MemoryAccess + ?Sized>(
    region: &BoundedRegion<'_, M>,
    candidate: u64,
    strict: bool,
) -> Result<bool> {
    if !region.fits(candidate, HEADER_SIZE) {
        return Ok(false);
    }

    if !strict {
        let string_ids_off = region.read_u32(candidate + STRING_IDS_OFF_OFFSET)?;
        return Ok(string_ids_off == Some(HEADER_SIZE as u32));
    }

    let Some(map_addr) = locate_map_address(region, candidate)? else {
        return Ok(false);
    };
    if locate_map_end(region, map_addr)?.is_none() {
        return Ok(false);
    }
    verify_by_map_list(region, candidate, map_addr)
}
