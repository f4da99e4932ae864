//! The fixed header at the start of every page.

use crate::common::PageId;

/// What a page holds. Stored as one byte.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    /// All zeroes: freshly allocated or freed.
    #[default]
    Invalid = 0,
    /// Table heap page.
    Data = 1,
    /// Bootstrap catalog heap page.
    Catalog = 2,
}

/// Unknown tags read back as `Invalid`.
impl From<u8> for PageType {
    fn from(tag: u8) -> Self {
        match tag {
            1 => PageType::Data,
            2 => PageType::Catalog,
            _ => PageType::Invalid,
        }
    }
}

/// Decoded page header.
///
/// ```text
/// bytes 0..4    checksum     CRC32 of the page with these four bytes zeroed
/// byte  4       page_type
/// byte  5       reserved (zero)
/// bytes 6..8    slot_count   slot directory entries, tombstones included
/// bytes 8..10   free_offset  start of the row data region
/// bytes 10..14  next_page    u32::MAX ends the chain
/// ```
///
/// All integers are little-endian.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub checksum: u32,
    pub page_type: PageType,
    pub slot_count: u16,
    pub free_offset: u16,
    /// Next page of the owning table.
    pub next_page: Option<PageId>,
}

const CHECKSUM: std::ops::Range<usize> = 0..4;
const PAGE_TYPE: usize = 4;
const SLOT_COUNT: std::ops::Range<usize> = 6..8;
const FREE_OFFSET: std::ops::Range<usize> = 8..10;
const NEXT_PAGE: std::ops::Range<usize> = 10..14;

fn read_u16(data: &[u8], at: std::ops::Range<usize>) -> u16 {
    let mut bytes = [0u8; 2];
    bytes.copy_from_slice(&data[at]);
    u16::from_le_bytes(bytes)
}

fn read_u32(data: &[u8], at: std::ops::Range<usize>) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[at]);
    u32::from_le_bytes(bytes)
}

impl PageHeader {
    pub const SIZE: usize = 14;

    /// Header of an empty page whose data region starts at `page_size`.
    pub fn new(page_type: PageType, page_size: usize) -> Self {
        Self {
            page_type,
            free_offset: page_size as u16,
            ..Self::default()
        }
    }

    /// `data` must hold at least [`PageHeader::SIZE`] bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self {
            checksum: read_u32(data, CHECKSUM),
            page_type: Self::page_type_of(data),
            slot_count: read_u16(data, SLOT_COUNT),
            free_offset: read_u16(data, FREE_OFFSET),
            next_page: PageId::from_link(read_u32(data, NEXT_PAGE)),
        }
    }

    /// `data` must hold at least [`PageHeader::SIZE`] bytes.
    pub fn write_to(&self, data: &mut [u8]) {
        data[CHECKSUM].copy_from_slice(&self.checksum.to_le_bytes());
        data[PAGE_TYPE] = self.page_type as u8;
        data[PAGE_TYPE + 1] = 0;
        data[SLOT_COUNT].copy_from_slice(&self.slot_count.to_le_bytes());
        data[FREE_OFFSET].copy_from_slice(&self.free_offset.to_le_bytes());
        data[NEXT_PAGE].copy_from_slice(&PageId::to_link(self.next_page).to_le_bytes());
    }

    /// The type tag without decoding the rest of the header.
    #[inline]
    pub fn page_type_of(data: &[u8]) -> PageType {
        PageType::from(data[PAGE_TYPE])
    }

    /// CRC32 over a whole page, reading the checksum field as zero.
    pub fn compute_checksum(page: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&[0u8; 4]);
        hasher.update(&page[CHECKSUM.end..]);
        hasher.finalize()
    }

    /// Compute the checksum of `page` and store it in place.
    pub fn stamp_checksum(page: &mut [u8]) {
        let checksum = Self::compute_checksum(page);
        page[CHECKSUM].copy_from_slice(&checksum.to_le_bytes());
    }

    pub fn verify_checksum(&self, page: &[u8]) -> bool {
        self.checksum == Self::compute_checksum(page)
    }
}
