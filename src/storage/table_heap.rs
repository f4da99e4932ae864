//! Table heap - a table's rows stored in a chain of slotted pages.
//!
//! ```text
//! first_page ──next──▶ page ──next──▶ page ──next──▶ (none)
//! ```
//!
//! Rows are appended to the last page; a new page is allocated and linked
//! when it is full. Deleted rows leave tombstones that keep their slot, so a
//! [`RecordId`] stays valid for undo until the table is dropped.

use std::fmt;

use tracing::trace;

use crate::buffer::{BufferPoolManager, PageReadGuard};
use crate::common::{Error, PageId, Result};
use crate::storage::page::{PageType, MAX_RECORD_SIZE};
use crate::types::Row;

/// Physical address of a row: page plus slot number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: u16,
}

impl RecordId {
    pub fn new(page_id: PageId, slot: u16) -> Self {
        Self { page_id, slot }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, slot {})", self.page_id, self.slot)
    }
}

/// Handle on one table's page chain.
///
/// Holds no pins; every operation fetches pages through the buffer pool and
/// releases them before returning.
#[derive(Debug, Clone)]
pub struct TableHeap {
    first_page: PageId,
    /// Last page seen so far. May lag behind the real tail; inserts walk
    /// forward from here.
    last_page: PageId,
}

impl TableHeap {
    /// Allocate the first page of a new heap.
    pub fn create(bpm: &BufferPoolManager, page_type: PageType) -> Result<Self> {
        let mut guard = bpm.new_page()?;
        guard.init(page_type);
        let first_page = guard.page_id();
        Ok(Self::open(first_page))
    }

    /// Attach to an existing chain.
    pub fn open(first_page: PageId) -> Self {
        Self {
            first_page,
            last_page: first_page,
        }
    }

    pub fn first_page(&self) -> PageId {
        self.first_page
    }

    /// Append a row, extending the chain if the tail page is full.
    ///
    /// # Errors
    /// - `Error::RowTooLarge` if the encoded row cannot fit an empty page
    pub fn insert(&mut self, bpm: &BufferPoolManager, row: &Row) -> Result<RecordId> {
        let bytes = row.encode()?;
        if bytes.len() > MAX_RECORD_SIZE {
            return Err(Error::RowTooLarge {
                size: bytes.len(),
                max: MAX_RECORD_SIZE,
            });
        }
        self.insert_bytes(bpm, &bytes)
    }

    fn insert_bytes(&mut self, bpm: &BufferPoolManager, bytes: &[u8]) -> Result<RecordId> {
        loop {
            let mut guard = bpm.fetch_page_write(self.last_page)?;
            if let Some(next) = guard.next_page() {
                self.last_page = next;
                continue;
            }

            if guard.can_insert(bytes.len()) {
                let slot = guard
                    .insert_record(bytes)
                    .ok_or_else(|| corrupt(self.last_page, "free space accounting is off"))?;
                return Ok(RecordId::new(guard.page_id(), slot));
            }

            let mut fresh = bpm.new_page()?;
            fresh.init(guard.page_type());
            guard.set_next_page(Some(fresh.page_id()));
            trace!(from = %guard.page_id(), to = %fresh.page_id(), "extended table heap");
            self.last_page = fresh.page_id();
        }
    }

    /// Read a live row, `None` if the slot is a tombstone or out of range.
    pub fn get(&self, bpm: &BufferPoolManager, rid: RecordId) -> Result<Option<Row>> {
        let guard = bpm.fetch_page_read(rid.page_id)?;
        guard
            .record(rid.slot)
            .map(|bytes| decode_row(rid.page_id, bytes))
            .transpose()
    }

    /// Replace a live row, returning where it now lives.
    ///
    /// The row stays in its slot when its page has room; otherwise the slot
    /// is tombstoned and the row is appended elsewhere.
    pub fn update(&mut self, bpm: &BufferPoolManager, rid: RecordId, row: &Row) -> Result<RecordId> {
        let bytes = row.encode()?;
        if bytes.len() > MAX_RECORD_SIZE {
            return Err(Error::RowTooLarge {
                size: bytes.len(),
                max: MAX_RECORD_SIZE,
            });
        }

        let old_bytes = {
            let mut guard = bpm.fetch_page_write(rid.page_id)?;
            let Some(old_bytes) = guard.record(rid.slot).map(<[u8]>::to_vec) else {
                return Err(not_found(rid));
            };
            if guard.update_record(rid.slot, &bytes) {
                return Ok(rid);
            }
            guard.delete_record(rid.slot);
            old_bytes
        };

        match self.insert_bytes(bpm, &bytes) {
            Ok(new_rid) => Ok(new_rid),
            Err(e) => {
                // Put the old row back so the failed update leaves no trace.
                let mut guard = bpm.fetch_page_write(rid.page_id)?;
                guard.restore_record(rid.slot, &old_bytes);
                Err(e)
            }
        }
    }

    /// Tombstone a live row and return its contents.
    pub fn delete(&self, bpm: &BufferPoolManager, rid: RecordId) -> Result<Row> {
        let mut guard = bpm.fetch_page_write(rid.page_id)?;
        let row = match guard.record(rid.slot) {
            Some(bytes) => decode_row(rid.page_id, bytes)?,
            None => return Err(not_found(rid)),
        };
        guard.delete_record(rid.slot);
        Ok(row)
    }

    /// Write a row back into a slot it occupied before, reviving tombstones.
    pub fn restore(&self, bpm: &BufferPoolManager, rid: RecordId, row: &Row) -> Result<()> {
        let bytes = row.encode()?;
        let mut guard = bpm.fetch_page_write(rid.page_id)?;
        if guard.restore_record(rid.slot, &bytes) {
            Ok(())
        } else {
            Err(corrupt(
                rid.page_id,
                &format!("slot {} cannot hold its previous contents", rid.slot),
            ))
        }
    }

    /// Page ids of the chain, in order.
    pub fn page_ids(&self, bpm: &BufferPoolManager) -> Result<Vec<PageId>> {
        let mut pages = Vec::new();
        let mut current = Some(self.first_page);
        while let Some(page_id) = current {
            if pages.contains(&page_id) {
                return Err(corrupt(page_id, "page chain loops"));
            }
            pages.push(page_id);
            current = bpm.fetch_page_read(page_id)?.next_page();
        }
        Ok(pages)
    }

    /// Materialize every live row with its id.
    pub fn scan(&self, bpm: &BufferPoolManager) -> Result<Vec<(RecordId, Row)>> {
        self.iter(bpm, false).collect()
    }

    /// Lazily iterate over live rows, holding a pin on one page at a time.
    pub fn iter<'a>(&self, bpm: &'a BufferPoolManager, prefetch: bool) -> TableIterator<'a> {
        TableIterator {
            bpm,
            next_page: Some(self.first_page),
            current: None,
            next_slot: 0,
            prefetch,
            done: false,
        }
    }

    /// Number of live rows.
    pub fn count(&self, bpm: &BufferPoolManager) -> Result<usize> {
        let mut total = 0;
        for page_id in self.page_ids(bpm)? {
            total += bpm.fetch_page_read(page_id)?.records().count();
        }
        Ok(total)
    }

    /// Release every page of the chain, zero-filling them on disk.
    pub fn free(&self, bpm: &BufferPoolManager) -> Result<()> {
        for page_id in self.page_ids(bpm)? {
            bpm.free_page(page_id)?;
        }
        Ok(())
    }
}

/// Pull-style cursor over a table heap.
///
/// Keeps the current page pinned between calls; the pin is released when the
/// cursor moves to the next page, is exhausted, or is dropped.
pub struct TableIterator<'a> {
    bpm: &'a BufferPoolManager,
    next_page: Option<PageId>,
    current: Option<PageReadGuard<'a>>,
    next_slot: u16,
    prefetch: bool,
    done: bool,
}

impl TableIterator<'_> {
    fn advance(&mut self) -> Result<Option<(RecordId, Row)>> {
        loop {
            if let Some(guard) = &self.current {
                while self.next_slot < guard.slot_count() {
                    let slot = self.next_slot;
                    self.next_slot += 1;
                    if let Some(bytes) = guard.record(slot) {
                        let page_id = guard.page_id();
                        let row = decode_row(page_id, bytes)?;
                        return Ok(Some((RecordId::new(page_id, slot), row)));
                    }
                }
                self.next_page = guard.next_page();
                self.current = None;
            }

            let Some(page_id) = self.next_page.take() else {
                return Ok(None);
            };
            let guard = self.bpm.fetch_page_read(page_id)?;
            if self.prefetch {
                if let Some(ahead) = guard.next_page() {
                    self.bpm.prefetch_page(ahead);
                }
            }
            self.current = Some(guard);
            self.next_slot = 0;
        }
    }
}

impl Iterator for TableIterator<'_> {
    type Item = Result<(RecordId, Row)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                self.current = None;
                Some(Err(e))
            }
        }
    }
}

/// Decode a stored row, treating malformed bytes as page corruption.
pub(crate) fn decode_row(page_id: PageId, bytes: &[u8]) -> Result<Row> {
    Row::decode(bytes).map_err(|e| corrupt(page_id, &e.to_string()))
}

fn corrupt(page_id: PageId, reason: &str) -> Error {
    Error::PageCorruption {
        page_id,
        reason: reason.to_string(),
    }
}

fn not_found(rid: RecordId) -> Error {
    Error::RecordNotFound {
        page_id: rid.page_id,
        slot: rid.slot,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DiskManager;
    use crate::types::Value;
    use tempfile::tempdir;

    fn setup(pool_size: usize) -> (BufferPoolManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let dm = DiskManager::create(dir.path().join("heap.db")).unwrap();
        (BufferPoolManager::new(pool_size, dm), dir)
    }

    fn row(id: i64, name: &str) -> Row {
        Row::new(vec![Value::Integer(id), Value::from(name)])
    }

    #[test]
    fn test_insert_get_scan() {
        let (bpm, _dir) = setup(8);
        let mut heap = TableHeap::create(&bpm, PageType::Data).unwrap();

        let a = heap.insert(&bpm, &row(1, "Alice")).unwrap();
        let b = heap.insert(&bpm, &row(2, "Bob")).unwrap();

        assert_eq!(heap.get(&bpm, a).unwrap(), Some(row(1, "Alice")));
        let rows: Vec<Row> = heap.scan(&bpm).unwrap().into_iter().map(|(_, r)| r).collect();
        assert_eq!(rows, vec![row(1, "Alice"), row(2, "Bob")]);
        assert_eq!(b.slot, 1);
    }

    #[test]
    fn test_chain_grows_and_keeps_order() {
        let (bpm, _dir) = setup(3);
        let mut heap = TableHeap::create(&bpm, PageType::Data).unwrap();
        let filler = "x".repeat(500);

        for i in 0..40 {
            heap.insert(&bpm, &row(i, &filler)).unwrap();
        }

        assert!(heap.page_ids(&bpm).unwrap().len() > 4);
        let ids: Vec<i64> = heap
            .iter(&bpm, true)
            .map(|item| item.unwrap().1[0].as_integer().unwrap())
            .collect();
        assert_eq!(ids, (0..40).collect::<Vec<_>>());
        assert_eq!(heap.count(&bpm).unwrap(), 40);
    }

    #[test]
    fn test_reopened_heap_appends_at_tail() {
        let (bpm, _dir) = setup(4);
        let mut heap = TableHeap::create(&bpm, PageType::Data).unwrap();
        let filler = "y".repeat(1000);
        for i in 0..10 {
            heap.insert(&bpm, &row(i, &filler)).unwrap();
        }

        let mut reopened = TableHeap::open(heap.first_page());
        let rid = reopened.insert(&bpm, &row(99, "tail")).unwrap();
        assert_eq!(Some(rid.page_id), heap.page_ids(&bpm).unwrap().last().copied());
    }

    #[test]
    fn test_delete_and_restore() {
        let (bpm, _dir) = setup(4);
        let mut heap = TableHeap::create(&bpm, PageType::Data).unwrap();
        let rid = heap.insert(&bpm, &row(1, "Alice")).unwrap();

        assert_eq!(heap.delete(&bpm, rid).unwrap(), row(1, "Alice"));
        assert_eq!(heap.get(&bpm, rid).unwrap(), None);
        assert!(matches!(heap.delete(&bpm, rid), Err(Error::RecordNotFound { .. })));

        heap.restore(&bpm, rid, &row(1, "Alice")).unwrap();
        assert_eq!(heap.get(&bpm, rid).unwrap(), Some(row(1, "Alice")));
    }

    #[test]
    fn test_update_in_place_and_relocated() {
        let (bpm, _dir) = setup(4);
        let mut heap = TableHeap::create(&bpm, PageType::Data).unwrap();
        let rid = heap.insert(&bpm, &row(1, "Al")).unwrap();

        assert_eq!(heap.update(&bpm, rid, &row(1, "A")).unwrap(), rid);
        assert_eq!(heap.update(&bpm, rid, &row(1, "Alexander")).unwrap(), rid);

        // Fill the first page so the next growth has to move the row.
        let filler = "z".repeat(1300);
        while heap.page_ids(&bpm).unwrap().len() == 1 {
            heap.insert(&bpm, &row(0, &filler)).unwrap();
        }
        let moved = heap.update(&bpm, rid, &row(1, &"w".repeat(2000))).unwrap();
        assert_ne!(moved.page_id, rid.page_id);
        assert_eq!(heap.get(&bpm, rid).unwrap(), None);
        assert_eq!(heap.get(&bpm, moved).unwrap().unwrap()[1], Value::from("w".repeat(2000)));
    }

    #[test]
    fn test_row_too_large() {
        let (bpm, _dir) = setup(4);
        let mut heap = TableHeap::create(&bpm, PageType::Data).unwrap();
        let huge = row(1, &"q".repeat(MAX_RECORD_SIZE));

        assert!(matches!(heap.insert(&bpm, &huge), Err(Error::RowTooLarge { .. })));
        assert_eq!(heap.count(&bpm).unwrap(), 0);
    }

    #[test]
    fn test_abandoned_iterator_releases_pin() {
        let (bpm, _dir) = setup(4);
        let mut heap = TableHeap::create(&bpm, PageType::Data).unwrap();
        heap.insert(&bpm, &row(1, "a")).unwrap();
        heap.insert(&bpm, &row(2, "b")).unwrap();

        let mut iter = heap.iter(&bpm, false);
        assert!(iter.next().is_some());
        assert_eq!(bpm.get_pin_count(heap.first_page()), Some(1));
        drop(iter);
        assert_eq!(bpm.get_pin_count(heap.first_page()), Some(0));
    }

    /// Two rows per page, nothing resident afterwards.
    fn cold_heap(bpm: &BufferPoolManager, rows: i64) -> (TableHeap, Vec<PageId>) {
        let mut heap = TableHeap::create(bpm, PageType::Data).unwrap();
        let filler = "p".repeat(1800);
        for i in 0..rows {
            heap.insert(bpm, &row(i, &filler)).unwrap();
        }
        let pages = heap.page_ids(bpm).unwrap();
        bpm.flush_all_pages().unwrap();
        for &page_id in &pages {
            bpm.delete_page(page_id).unwrap();
        }
        (heap, pages)
    }

    fn scanned_ids(heap: &TableHeap, bpm: &BufferPoolManager) -> Vec<i64> {
        heap.iter(bpm, true)
            .map(|item| item.unwrap().1[0].as_integer().unwrap())
            .collect()
    }

    #[test]
    fn test_prefetch_loads_the_next_page() {
        let (bpm, _dir) = setup(4);
        let (heap, pages) = cold_heap(&bpm, 8);
        assert_eq!(pages.len(), 4);

        let before = bpm.stats().snapshot();
        assert_eq!(scanned_ids(&heap, &bpm), (0..8).collect::<Vec<_>>());
        let delta = bpm.stats().snapshot().since(&before);

        assert_eq!(delta.prefetches, 3);
        assert_eq!(delta.cache_misses, 1);
        assert_eq!(delta.cache_hits, 3);
    }

    #[test]
    fn test_prefetch_without_a_frame_is_skipped() {
        let (bpm, _dir) = setup(2);
        let other = {
            let mut guard = bpm.new_page().unwrap();
            guard.init(PageType::Data);
            guard.page_id()
        };
        let (heap, pages) = cold_heap(&bpm, 6);
        assert_eq!(pages.len(), 3);

        // One frame for the scan, the other pinned here.
        let held = bpm.fetch_page_read(other).unwrap();
        let before = bpm.stats().snapshot();
        assert_eq!(scanned_ids(&heap, &bpm), (0..6).collect::<Vec<_>>());
        let delta = bpm.stats().snapshot().since(&before);

        assert_eq!(delta.prefetches, 0);
        assert_eq!(delta.cache_misses, 3);
        drop(held);
        bpm.check_invariants().unwrap();
    }

    #[test]
    fn test_free_zero_fills_chain() {
        let (bpm, _dir) = setup(4);
        let mut heap = TableHeap::create(&bpm, PageType::Data).unwrap();
        heap.insert(&bpm, &row(1, "a")).unwrap();

        heap.free(&bpm).unwrap();
        let guard = bpm.fetch_page_read(heap.first_page()).unwrap();
        assert_eq!(guard.page_type(), PageType::Invalid);
    }
}
