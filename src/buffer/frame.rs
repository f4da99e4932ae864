//! One slot of the buffer pool.
//!
//! The page bytes sit behind their own latch so that readers of different
//! pages never contend. Residency, pins and the dirty bit share one small
//! mutex: they always change together during load, eviction and release.
//! Replacement bookkeeping lives in the replacer, keyed by
//! [`FrameId`](crate::FrameId).

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::PageId;
use crate::storage::page::{Page, PageType};

#[derive(Debug, Default, Clone, Copy)]
struct FrameMeta {
    resident: Option<PageId>,
    pins: u32,
    dirty: bool,
}

pub struct Frame {
    page: RwLock<Page>,
    meta: Mutex<FrameMeta>,
}

impl Frame {
    pub fn new() -> Self {
        Self {
            page: RwLock::new(Page::new()),
            meta: Mutex::new(FrameMeta::default()),
        }
    }

    /// Shared latch on the page bytes.
    #[inline]
    pub fn page(&self) -> RwLockReadGuard<'_, Page> {
        self.page.read()
    }

    /// Exclusive latch on the page bytes.
    #[inline]
    pub fn page_mut(&self) -> RwLockWriteGuard<'_, Page> {
        self.page.write()
    }

    /// The page held by this frame, if any.
    #[inline]
    pub fn page_id(&self) -> Option<PageId> {
        self.meta.lock().resident
    }

    /// Take ownership of `contents` for `page_id`, unpinned and clean.
    pub fn load(&self, page_id: PageId, contents: &Page) {
        self.page_mut().copy_from(contents);
        *self.meta.lock() = FrameMeta {
            resident: Some(page_id),
            pins: 0,
            dirty: false,
        };
    }

    /// Returns the new pin count.
    #[inline]
    pub fn pin(&self) -> u32 {
        let mut meta = self.meta.lock();
        meta.pins += 1;
        meta.pins
    }

    /// Drop one pin, recording whether the holder changed the page.
    ///
    /// Returns the remaining pin count; releasing an unpinned frame leaves
    /// it at zero.
    pub fn release(&self, modified: bool) -> u32 {
        let mut meta = self.meta.lock();
        debug_assert!(meta.pins > 0, "release of an unpinned frame");
        meta.pins = meta.pins.saturating_sub(1);
        meta.dirty |= modified;
        meta.pins
    }

    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.meta.lock().pins
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    #[inline]
    pub fn mark_dirty(&self) {
        self.meta.lock().dirty = true;
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.meta.lock().dirty
    }

    /// A checksummed copy of the page if it needs writing back.
    ///
    /// Taken under the shared latch so a flush never blocks readers. The
    /// frame stays dirty until [`Frame::mark_clean`] confirms the write.
    pub fn dirty_image(&self) -> Option<Page> {
        if !self.is_dirty() {
            return None;
        }
        let mut image = self.page().clone();
        if image.page_type() != PageType::Invalid {
            image.update_checksum();
        }
        Some(image)
    }

    #[inline]
    pub fn mark_clean(&self) {
        self.meta.lock().dirty = false;
    }

    /// Zero the page and forget its identity so the frame can be reused.
    pub fn reset(&self) {
        self.page_mut().reset();
        *self.meta.lock() = FrameMeta::default();
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}
