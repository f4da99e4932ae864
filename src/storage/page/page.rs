//! Page - the fundamental 4KB unit of storage.
//!
//! A [`Page`] is a raw 4KB byte array that serves as the unit of I/O
//! between disk and memory. Table pages use a slotted layout on top of it:
//!
//! ```text
//! ┌────────────┬──────────────────┬─────────────┬──────────────────────┐
//! │ header(14) │ slot directory → │ free space  │ ← row data           │
//! └────────────┴──────────────────┴─────────────┴──────────────────────┘
//!                                               ^ free_offset
//! ```
//!
//! Each slot entry is `offset u16 | len u16 | capacity u16`. The top bit of
//! `len` marks a tombstone. Space is never compacted, so the capacity of a
//! slot never shrinks and a before-image can always be written back in place.

use crate::common::config::PAGE_SIZE;
use crate::common::PageId;

use super::page_header::{PageHeader, PageType};

/// Size of one slot directory entry in bytes.
pub const SLOT_SIZE: usize = 6;

/// Largest row payload that fits into an empty page.
pub const MAX_RECORD_SIZE: usize = PAGE_SIZE - PageHeader::SIZE - SLOT_SIZE;

const TOMBSTONE: u16 = 0x8000;

#[derive(Debug, Clone, Copy)]
struct SlotEntry {
    offset: u16,
    len: u16,
    capacity: u16,
    deleted: bool,
}

/// A page of data (4KB, 4KB-aligned).
///
/// This is the fundamental unit of I/O between disk and memory.
/// The buffer pool manages these in frames.
///
/// Cloning copies the full 4KB. The buffer pool clones a dirty page under
/// the shared latch and writes the copy back; to reuse an existing page,
/// use [`Page::copy_from`].
///
/// # Example
/// ```
/// use kerneldb::storage::page::{Page, PageType};
///
/// let mut page = Page::new();
/// page.init(PageType::Data);
/// let slot = page.insert_record(b"hello").unwrap();
/// assert_eq!(page.record(slot), Some(&b"hello"[..]));
/// ```
#[repr(align(4096))]
pub struct Page {
    data: [u8; PAGE_SIZE],
}

impl Page {
    /// Create a new zeroed page.
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0u8; PAGE_SIZE],
        }
    }

    /// Build a page from a payload of at most `PAGE_SIZE` bytes, zero-padded.
    ///
    /// # Panics
    /// Panics if `bytes` is longer than a page.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        assert!(bytes.len() <= PAGE_SIZE, "payload larger than a page");
        let mut page = Page::new();
        page.data[..bytes.len()].copy_from_slice(bytes);
        page
    }

    /// Get immutable slice of page data.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Get mutable slice of page data.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Overwrite this page with the contents of another.
    pub fn copy_from(&mut self, other: &Page) {
        self.data.copy_from_slice(&other.data);
    }

    /// Zero out the entire page.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    /// Read the page header.
    pub fn header(&self) -> PageHeader {
        PageHeader::from_bytes(&self.data)
    }

    /// Write a page header.
    pub fn set_header(&mut self, header: &PageHeader) {
        header.write_to(&mut self.data);
    }

    /// Compute and store checksum in the header.
    ///
    /// Call this after all modifications to the page are complete.
    pub fn update_checksum(&mut self) {
        PageHeader::stamp_checksum(&mut self.data);
    }

    /// Verify the page checksum is valid.
    pub fn verify_checksum(&self) -> bool {
        self.header().verify_checksum(&self.data)
    }

    // ========================================================================
    // Slotted layout
    // ========================================================================

    /// Format the page as an empty slotted page.
    pub fn init(&mut self, page_type: PageType) {
        self.reset();
        self.set_header(&PageHeader::new(page_type, PAGE_SIZE));
    }

    pub fn page_type(&self) -> PageType {
        PageHeader::page_type_of(&self.data)
    }

    pub fn next_page(&self) -> Option<PageId> {
        self.header().next_page
    }

    pub fn set_next_page(&mut self, next: Option<PageId>) {
        let mut header = self.header();
        header.next_page = next;
        self.set_header(&header);
    }

    pub fn slot_count(&self) -> u16 {
        self.header().slot_count
    }

    /// Bytes available for a new row plus its slot entry.
    pub fn free_space(&self) -> usize {
        let header = self.header();
        let directory_end = PageHeader::SIZE + header.slot_count as usize * SLOT_SIZE;
        (header.free_offset as usize).saturating_sub(directory_end)
    }

    /// Whether a row of `len` bytes fits without allocating a new page.
    pub fn can_insert(&self, len: usize) -> bool {
        self.free_space() >= len + SLOT_SIZE
    }

    /// Append a row, returning its slot number, or `None` if the page is full.
    pub fn insert_record(&mut self, bytes: &[u8]) -> Option<u16> {
        if !self.can_insert(bytes.len()) {
            return None;
        }

        let mut header = self.header();
        let slot = header.slot_count;
        let offset = header.free_offset - bytes.len() as u16;
        self.data[offset as usize..offset as usize + bytes.len()].copy_from_slice(bytes);

        header.slot_count += 1;
        header.free_offset = offset;
        self.set_header(&header);
        self.write_slot(
            slot,
            SlotEntry {
                offset,
                len: bytes.len() as u16,
                capacity: bytes.len() as u16,
                deleted: false,
            },
        );
        Some(slot)
    }

    /// Bytes of a live row; `None` for tombstones and unknown slots.
    pub fn record(&self, slot: u16) -> Option<&[u8]> {
        let entry = self.read_slot(slot)?;
        if entry.deleted {
            return None;
        }
        let start = entry.offset as usize;
        self.data.get(start..start + entry.len as usize)
    }

    /// Whether the slot exists and holds a tombstone.
    pub fn is_deleted(&self, slot: u16) -> bool {
        self.read_slot(slot).is_some_and(|entry| entry.deleted)
    }

    /// Iterate over live rows in slot order.
    pub fn records(&self) -> impl Iterator<Item = (u16, &[u8])> + '_ {
        (0..self.slot_count()).filter_map(move |slot| self.record(slot).map(|bytes| (slot, bytes)))
    }

    /// Tombstone a live row. Returns `false` if there was nothing to delete.
    pub fn delete_record(&mut self, slot: u16) -> bool {
        match self.read_slot(slot) {
            Some(mut entry) if !entry.deleted => {
                entry.deleted = true;
                self.write_slot(slot, entry);
                true
            }
            _ => false,
        }
    }

    /// Overwrite a live row.
    ///
    /// Writes in place when the slot's capacity allows, otherwise moves the row
    /// into this page's free space. Returns `false` when neither is possible;
    /// the caller then relocates the row to another page.
    pub fn update_record(&mut self, slot: u16, bytes: &[u8]) -> bool {
        let Some(mut entry) = self.read_slot(slot) else {
            return false;
        };
        if entry.deleted {
            return false;
        }

        if bytes.len() <= entry.capacity as usize {
            self.write_in_place(slot, entry, bytes);
            return true;
        }

        if self.free_space() < bytes.len() {
            return false;
        }
        let mut header = self.header();
        let offset = header.free_offset - bytes.len() as u16;
        self.data[offset as usize..offset as usize + bytes.len()].copy_from_slice(bytes);
        header.free_offset = offset;
        self.set_header(&header);

        entry.offset = offset;
        entry.len = bytes.len() as u16;
        entry.capacity = bytes.len() as u16;
        self.write_slot(slot, entry);
        true
    }

    /// Bring a slot back to life with the given contents.
    ///
    /// Used by undo: the bytes are a before-image that previously lived in
    /// this slot, so they always fit its capacity. Returns `false` otherwise.
    pub fn restore_record(&mut self, slot: u16, bytes: &[u8]) -> bool {
        match self.read_slot(slot) {
            Some(entry) if bytes.len() <= entry.capacity as usize => {
                self.write_in_place(slot, entry, bytes);
                true
            }
            _ => false,
        }
    }

    /// Check that the header and slot directory describe a sane layout.
    pub fn check_layout(&self) -> Result<(), String> {
        let header = self.header();
        let directory_end = PageHeader::SIZE + header.slot_count as usize * SLOT_SIZE;
        let free_offset = header.free_offset as usize;
        if directory_end > free_offset || free_offset > PAGE_SIZE {
            return Err(format!(
                "slot directory ends at {} but data region starts at {}",
                directory_end, free_offset
            ));
        }
        for slot in 0..header.slot_count {
            if let Some(entry) = self.read_slot(slot) {
                let start = entry.offset as usize;
                let end = start + entry.capacity as usize;
                if start < free_offset || end > PAGE_SIZE || entry.len > entry.capacity {
                    return Err(format!("slot {} points outside the data region", slot));
                }
            }
        }
        Ok(())
    }

    fn write_in_place(&mut self, slot: u16, mut entry: SlotEntry, bytes: &[u8]) {
        let start = entry.offset as usize;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        entry.len = bytes.len() as u16;
        entry.deleted = false;
        self.write_slot(slot, entry);
    }

    fn slot_position(slot: u16) -> usize {
        PageHeader::SIZE + slot as usize * SLOT_SIZE
    }

    fn read_slot(&self, slot: u16) -> Option<SlotEntry> {
        if slot >= self.slot_count() {
            return None;
        }
        let pos = Self::slot_position(slot);
        let word = |at: usize| u16::from_le_bytes([self.data[at], self.data[at + 1]]);
        let raw_len = word(pos + 2);
        Some(SlotEntry {
            offset: word(pos),
            len: raw_len & !TOMBSTONE,
            capacity: word(pos + 4),
            deleted: raw_len & TOMBSTONE != 0,
        })
    }

    fn write_slot(&mut self, slot: u16, entry: SlotEntry) {
        let pos = Self::slot_position(slot);
        let raw_len = if entry.deleted {
            entry.len | TOMBSTONE
        } else {
            entry.len
        };
        self.data[pos..pos + 2].copy_from_slice(&entry.offset.to_le_bytes());
        self.data[pos + 2..pos + 4].copy_from_slice(&raw_len.to_le_bytes());
        self.data[pos + 4..pos + 6].copy_from_slice(&entry.capacity.to_le_bytes());
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Page {
    fn clone(&self) -> Self {
        let mut new_page = Page::new();
        new_page.copy_from(self);
        new_page
    }
}

/// Summarizes the header; the bytes themselves are not printed.
impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let header = self.header();
        f.debug_struct("Page")
            .field("page_type", &header.page_type)
            .field("slot_count", &header.slot_count)
            .field("free_offset", &header.free_offset)
            .field("next_page", &header.next_page)
            .finish()
    }
}
