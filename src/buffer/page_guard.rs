//! Scoped page access.
//!
//! A guard is a page latch plus a pin. Fields drop in declaration order, so
//! the latch is released before the pin: once a frame becomes evictable
//! nobody is still reading it. Dropping a guard on any path, including an
//! abandoned scan or an error, returns the pin.

use std::fmt;
use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use super::buffer_pool_manager::BufferPoolManager;
use crate::common::{FrameId, PageId};
use crate::storage::page::Page;

/// The pin half of a guard.
struct Pin<'a> {
    bpm: &'a BufferPoolManager,
    frame_id: FrameId,
    page_id: PageId,
    dirtied: bool,
}

impl Drop for Pin<'_> {
    fn drop(&mut self) {
        self.bpm.unpin_page_internal(self.frame_id, self.dirtied);
    }
}

impl fmt::Debug for Pin<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pin")
            .field("page_id", &self.page_id)
            .field("frame_id", &self.frame_id)
            .field("dirtied", &self.dirtied)
            .finish()
    }
}

/// Shared access to a pinned page.
#[derive(Debug)]
pub struct PageReadGuard<'a> {
    latch: RwLockReadGuard<'a, Page>,
    pin: Pin<'a>,
}

impl<'a> PageReadGuard<'a> {
    pub(crate) fn new(
        bpm: &'a BufferPoolManager,
        frame_id: FrameId,
        page_id: PageId,
        latch: RwLockReadGuard<'a, Page>,
    ) -> Self {
        Self {
            latch,
            pin: Pin {
                bpm,
                frame_id,
                page_id,
                dirtied: false,
            },
        }
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.pin.page_id
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.pin.frame_id
    }
}

impl Deref for PageReadGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        &self.latch
    }
}

/// Exclusive access to a pinned page.
///
/// Only a mutable borrow marks the frame dirty, so fetching for write
/// without changing anything costs no write-back.
#[derive(Debug)]
pub struct PageWriteGuard<'a> {
    latch: RwLockWriteGuard<'a, Page>,
    pin: Pin<'a>,
}

impl<'a> PageWriteGuard<'a> {
    pub(crate) fn new(
        bpm: &'a BufferPoolManager,
        frame_id: FrameId,
        page_id: PageId,
        latch: RwLockWriteGuard<'a, Page>,
    ) -> Self {
        Self {
            latch,
            pin: Pin {
                bpm,
                frame_id,
                page_id,
                dirtied: false,
            },
        }
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.pin.page_id
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.pin.frame_id
    }

    /// Whether the page has been borrowed mutably through this guard.
    #[inline]
    pub fn is_modified(&self) -> bool {
        self.pin.dirtied
    }
}

impl Deref for PageWriteGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        &self.latch
    }
}

impl DerefMut for PageWriteGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Page {
        self.pin.dirtied = true;
        &mut self.latch
    }
}
