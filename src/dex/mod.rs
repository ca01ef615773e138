//! DEX header verification and size recovery
//!
//! This module decides whether bytes in another process look like a DEX file
//! and how long that file really is:
//! - Cheap and strict header verification
//! - Map table location and its self-reference check
//! - Size recovery independent of the header's `file_size`
//! - Byte signatures for the region scan
//! - Dump file output and manifest

mod header;
mod maps;
mod output;
mod pattern;
mod region;
#[cfg(test)]
pub(crate) mod testing;

use std::ops::RangeInclusive;

pub use header::verify;
pub use maps::{locate_map_address, locate_map_end, resolve_real_size, verify_by_map_list};
pub use output::{append_manifest, build_output_path, write_dump, ManifestEntry};
pub use pattern::BytePattern;
pub use region::BoundedRegion;

/// DEX file header size (standard)
pub const HEADER_SIZE: u64 = 0x70;

pub const DEX_MAGIC: &[u8; 8] = b"dex\n035\0";
pub const DEX_MAGIC_PREFIX: &[u8] = b"dex\n";

/// `"dex\n0??\0"`: any format version.
pub const DEX_MAGIC_PATTERN: &str = "64 65 78 0a 30 ?? ?? 00";
/// A bare little-endian `0x70`, the value of `string_ids_off` in an intact header.
pub const STRING_IDS_PATTERN: &str = "70 00 00 00";

pub const FILE_SIZE_OFFSET: u64 = 0x20;
pub const MAP_OFF_OFFSET: u64 = 0x34;
/// `string_ids` directly follow the header, so this field equals `HEADER_SIZE`.
pub const STRING_IDS_OFF_OFFSET: u64 = 0x3C;

pub const MAP_ITEM_SIZE: u64 = 12;
pub const MAP_LIST_TYPE: u16 = 0x1000;
/// Real map tables hold at least the header and map-list items and in
/// practice never more than fifty.
pub const MAP_COUNT_RANGE: RangeInclusive<u32> = 2..=50;
