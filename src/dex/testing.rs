//! Synthetic DEX images for unit tests

use super::{
    DEX_MAGIC, FILE_SIZE_OFFSET, HEADER_SIZE, MAP_ITEM_SIZE, MAP_LIST_TYPE, MAP_OFF_OFFSET,
    STRING_IDS_OFF_OFFSET,
};

const HEADER_SIZE_OFFSET: usize = 0x24;
const ENDIAN_TAG_OFFSET: usize = 0x28;
const ENDIAN_TAG: u32 = 0x1234_5678;

/// Builds a zero-filled buffer whose first 0x70 bytes are a plausible header.
pub(crate) struct DexImage {
    data: Vec<u8>,
    map: Option<(usize, u32)>,
}

impl DexImage {
    pub(crate) fn new(len: usize) -> Self {
        let mut image = Self {
            data: vec![0u8; len.max(HEADER_SIZE as usize)],
            map: None,
        };
        image.data[..8].copy_from_slice(DEX_MAGIC);
        image
            .put(FILE_SIZE_OFFSET as usize, len as u32)
            .put(HEADER_SIZE_OFFSET, HEADER_SIZE as u32)
            .put(ENDIAN_TAG_OFFSET, ENDIAN_TAG)
            .put(STRING_IDS_OFF_OFFSET as usize, HEADER_SIZE as u32);
        image
    }

    fn put(&mut self, offset: usize, value: u32) -> &mut Self {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        self
    }

    pub(crate) fn file_size(mut self, size: u32) -> Self {
        self.put(FILE_SIZE_OFFSET as usize, size);
        self
    }

    pub(crate) fn map_off(mut self, offset: u32) -> Self {
        self.put(MAP_OFF_OFFSET as usize, offset);
        self
    }

    pub(crate) fn string_ids_off(mut self, value: u32) -> Self {
        self.put(STRING_IDS_OFF_OFFSET as usize, value);
        self
    }

    pub(crate) fn raw_u32(mut self, offset: usize, value: u32) -> Self {
        self.put(offset, value);
        self
    }

    /// Writes `map_off` and a `count`-item table at `offset`: a header item,
    /// filler items, and a trailing map-list item pointing back at `offset`.
    pub(crate) fn map_table(mut self, offset: u32, count: u32) -> Self {
        self.put(MAP_OFF_OFFSET as usize, offset);
        let table = offset as usize;
        self.put(table, count);
        for index in 0..count as usize {
            let item = table + 4 + index * MAP_ITEM_SIZE as usize;
            let (kind, item_offset) = if index + 1 == count as usize {
                (MAP_LIST_TYPE, offset)
            } else if index == 0 {
                (0x0000, 0)
            } else {
                (0x2000 + index as u16, 0)
            };
            self.data[item..item + 2].copy_from_slice(&kind.to_le_bytes());
            self.put(item + 4, 1);
            self.put(item + 8, item_offset);
        }
        self.map = Some((table, count));
        self
    }

    /// Overwrite the offset recorded by the map-list item.
    pub(crate) fn map_list_offset(mut self, value: u32) -> Self {
        let (table, count) = self.map.expect("map_table must be called first");
        let item = table + 4 + (count as usize - 1) * MAP_ITEM_SIZE as usize;
        self.put(item + 8, value);
        self
    }

    /// Zero the 8-byte magic, as packers do to hide a decrypted file.
    pub(crate) fn erase_magic(mut self) -> Self {
        self.data[..8].fill(0);
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        self.data
    }
}
