//! The page cache between table heaps and the disk manager.

use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::buffer::replacer::{EvictionPolicy, Replacer};
use crate::buffer::{BufferPoolStats, Frame, PageReadGuard, PageWriteGuard};
use crate::common::{Error, FrameId, PageId, Result};
use crate::storage::page::{Page, PageType};
use crate::storage::DiskManager;

/// A fixed set of frames caching disk pages.
///
/// A page table maps resident pages to frames; free frames sit on a stack;
/// the replacer picks victims among unpinned frames once the stack is
/// empty. The eviction policy can be swapped while pages stay cached.
///
/// # Invariants
/// - At most one frame holds a given page id.
/// - A pinned frame is never offered to the replacer.
/// - A dirty frame is written back before it is reused.
///
/// # Locking
/// The page table is behind an `RwLock`; the free list, replacer and disk
/// manager each behind a `Mutex`. No two of them are held while waiting on
/// a page latch. A thread must not fetch a page for write while it already
/// holds a guard on that page.
///
/// # Usage
/// ```
/// use kerneldb::buffer::{replacer::EvictionPolicy, BufferPoolManager};
/// use kerneldb::storage::{page::PageType, DiskManager};
///
/// let dir = tempfile::tempdir().unwrap();
/// let dm = DiskManager::create(dir.path().join("doc.db")).unwrap();
/// let bpm = BufferPoolManager::with_policy(4, dm, EvictionPolicy::Clock);
///
/// let page_id = {
///     let mut guard = bpm.new_page().unwrap();
///     guard.init(PageType::Data);
///     guard.insert_record(b"hello").unwrap();
///     guard.page_id()
/// };
///
/// let guard = bpm.fetch_page_read(page_id).unwrap();
/// assert_eq!(guard.record(0), Some(&b"hello"[..]));
/// ```
pub struct BufferPoolManager {
    /// Fixed pool of frames allocated at startup.
    frames: Vec<Frame>,

    /// Maps page IDs to frame IDs.
    page_table: RwLock<HashMap<PageId, FrameId>>,

    /// Stack of free frame IDs.
    free_list: Mutex<Vec<FrameId>>,

    /// Eviction policy for selecting victim frames.
    replacer: Mutex<Box<dyn Replacer>>,

    /// Handles all disk I/O.
    disk_manager: Mutex<DiskManager>,

    stats: BufferPoolStats,

    /// Number of frames in the pool (immutable after construction).
    pool_size: usize,
}

impl BufferPoolManager {
    /// Create a buffer pool using LRU eviction.
    ///
    /// # Panics
    /// Panics if `pool_size` is 0.
    pub fn new(pool_size: usize, disk_manager: DiskManager) -> Self {
        Self::with_policy(pool_size, disk_manager, EvictionPolicy::default())
    }

    /// Create a buffer pool with an explicit eviction policy.
    ///
    /// # Panics
    /// Panics if `pool_size` is 0.
    pub fn with_policy(pool_size: usize, disk_manager: DiskManager, policy: EvictionPolicy) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");

        let frames: Vec<Frame> = (0..pool_size).map(|_| Frame::new()).collect();

        // Reversed so that frame 0 is handed out first.
        let free_list: Vec<FrameId> = (0..pool_size).rev().map(FrameId::new).collect();

        Self {
            frames,
            page_table: RwLock::new(HashMap::new()),
            free_list: Mutex::new(free_list),
            replacer: Mutex::new(policy.build(pool_size)),
            disk_manager: Mutex::new(disk_manager),
            stats: BufferPoolStats::new(),
            pool_size,
        }
    }

    // ========================================================================
    // Public API: Fetch pages
    // ========================================================================

    /// Fetch a page for reading (shared access).
    ///
    /// If the page is already in the buffer pool, returns immediately.
    /// Otherwise, loads the page from disk (possibly evicting another page).
    ///
    /// # Errors
    /// - `Error::PageNotFound` if the page doesn't exist on disk
    /// - `Error::PageCorruption` if the loaded bytes fail verification
    /// - `Error::NoFreeFrames` if all frames are pinned
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<PageReadGuard<'_>> {
        let frame_id = self.fetch_page_internal(page_id)?;
        let lock = self.frames[frame_id.0].page();

        Ok(PageReadGuard::new(self, frame_id, page_id, lock))
    }

    /// Fetch a page for writing (exclusive access).
    ///
    /// Same as `fetch_page_read`, but returns an exclusive guard.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        let frame_id = self.fetch_page_internal(page_id)?;
        let lock = self.frames[frame_id.0].page_mut();

        Ok(PageWriteGuard::new(self, frame_id, page_id, lock))
    }

    /// Load a page without pinning it, ahead of an expected access.
    ///
    /// Never fails: a page that is resident, missing, corrupt or cannot get
    /// a frame is simply skipped. Returns whether a page was loaded.
    pub fn prefetch_page(&self, page_id: PageId) -> bool {
        if self.page_table.read().contains_key(&page_id) {
            return false;
        }

        let frame_id = match self.get_free_frame() {
            Ok(frame_id) => frame_id,
            Err(e) => {
                debug!(%page_id, error = %e, "prefetch skipped");
                return false;
            }
        };

        match self.load_into_frame(page_id, frame_id, false) {
            Ok(loaded) if loaded == frame_id => {
                BufferPoolStats::bump(&self.stats.prefetches);
                debug!(%page_id, "prefetched");
                true
            }
            Ok(_) => false,
            Err(e) => {
                self.free_list.lock().push(frame_id);
                debug!(%page_id, error = %e, "prefetch failed");
                false
            }
        }
    }

    // ========================================================================
    // Public API: Create and delete pages
    // ========================================================================

    /// Allocate a new page on disk and load it into the buffer pool.
    ///
    /// The page is zeroed; callers format it with [`Page::init`].
    ///
    /// # Errors
    /// - `Error::NoFreeFrames` if all frames are pinned
    /// - I/O errors from disk allocation
    pub fn new_page(&self) -> Result<PageWriteGuard<'_>> {
        let frame_id = self.get_free_frame()?;

        let allocated = self.disk_manager.lock().allocate_page();
        let page_id = match allocated {
            Ok(page_id) => page_id,
            Err(e) => {
                self.free_list.lock().push(frame_id);
                return Err(e);
            }
        };

        let frame = &self.frames[frame_id.0];
        frame.load(page_id, &Page::new());
        frame.pin();
        if let Some(existing) = self.install(page_id, frame_id, true) {
            frame.reset();
            self.free_list.lock().push(frame_id);
            return Err(Error::CacheInvariant(format!(
                "new {} already resident in {}",
                page_id, existing
            )));
        }
        debug!(%page_id, %frame_id, "allocated page");

        let lock = frame.page_mut();
        Ok(PageWriteGuard::new(self, frame_id, page_id, lock))
    }

    /// Drop a page from the buffer pool without writing it back.
    ///
    /// The page stays allocated on disk. Dropping a page that is not
    /// resident is a no-op.
    ///
    /// # Errors
    /// - `Error::PagePinned` if the page is in use
    pub fn delete_page(&self, page_id: PageId) -> Result<()> {
        let mut pt = self.page_table.write();

        let frame_id = match pt.get(&page_id) {
            Some(&fid) => fid,
            None => return Ok(()),
        };

        let frame = &self.frames[frame_id.0];
        if frame.is_pinned() {
            return Err(Error::PagePinned(page_id));
        }

        pt.remove(&page_id);
        drop(pt);

        frame.reset();
        self.replacer.lock().remove(frame_id);
        self.free_list.lock().push(frame_id);

        Ok(())
    }

    /// Remove a page from the pool and zero-fill it on disk.
    ///
    /// Used when a table is dropped. The page id is not reused.
    pub fn free_page(&self, page_id: PageId) -> Result<()> {
        self.delete_page(page_id)?;
        self.disk_manager.lock().free_page(page_id)?;
        debug!(%page_id, "freed page");
        Ok(())
    }

    /// Mark a resident page as modified.
    ///
    /// # Errors
    /// - `Error::PageNotFound` if the page is not in the pool
    pub fn mark_dirty(&self, page_id: PageId) -> Result<()> {
        let frame_id = self.lookup(page_id).ok_or(Error::PageNotFound(page_id))?;
        self.frames[frame_id.0].mark_dirty();
        Ok(())
    }

    // ========================================================================
    // Public API: Flush pages
    // ========================================================================

    /// Flush a specific page to disk if it's dirty.
    pub fn flush_page(&self, page_id: PageId) -> Result<()> {
        match self.lookup(page_id) {
            Some(frame_id) => self.flush_frame(frame_id, page_id),
            None => Ok(()),
        }
    }

    /// Flush all dirty pages to disk.
    ///
    /// A second call with no intervening writes performs no I/O.
    pub fn flush_all_pages(&self) -> Result<()> {
        let mut pages: Vec<(PageId, FrameId)> = {
            let pt = self.page_table.read();
            pt.iter().map(|(&pid, &fid)| (pid, fid)).collect()
        };
        pages.sort();

        for (page_id, frame_id) in pages {
            self.flush_frame(frame_id, page_id)?;
        }

        Ok(())
    }

    // ========================================================================
    // Public API: Policy, stats and info
    // ========================================================================

    /// The active eviction policy.
    pub fn policy(&self) -> EvictionPolicy {
        self.replacer.lock().policy()
    }

    /// Swap the eviction policy.
    ///
    /// The new replacer starts from the resident frames in frame order, with
    /// the current pin state; access history of the old policy is discarded.
    pub fn set_policy(&self, policy: EvictionPolicy) {
        let mut resident: Vec<(FrameId, bool)> = {
            let pt = self.page_table.read();
            pt.values()
                .map(|&fid| (fid, self.frames[fid.0].is_pinned()))
                .collect()
        };
        resident.sort();

        let mut replacer = policy.build(self.pool_size);
        for (frame_id, pinned) in resident {
            replacer.record_access(frame_id);
            replacer.set_evictable(frame_id, !pinned);
        }
        *self.replacer.lock() = replacer;
        debug!(%policy, "eviction policy changed");
    }

    pub fn stats(&self) -> &BufferPoolStats {
        &self.stats
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.free_list.lock().len()
    }

    /// Number of pages currently held in frames.
    pub fn resident_page_count(&self) -> usize {
        self.page_table.read().len()
    }

    /// Whether the page currently occupies a frame.
    pub fn is_resident(&self, page_id: PageId) -> bool {
        self.page_table.read().contains_key(&page_id)
    }

    /// Pin count of a resident page, `None` if it is not in the pool.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        self.lookup(page_id)
            .map(|frame_id| self.frames[frame_id.0].pin_count())
    }

    /// Number of pages allocated in the backing file.
    pub fn disk_page_count(&self) -> u32 {
        self.disk_manager.lock().page_count()
    }

    /// Cross-check the page table against frame metadata.
    ///
    /// # Errors
    /// - `Error::CacheInvariant` describing the first inconsistency found
    pub fn check_invariants(&self) -> Result<()> {
        let pt = self.page_table.read();
        if pt.len() + self.free_frame_count() > self.pool_size {
            return Err(Error::CacheInvariant(format!(
                "{} resident pages and {} free frames exceed pool size {}",
                pt.len(),
                self.free_frame_count(),
                self.pool_size
            )));
        }
        for (&page_id, &frame_id) in pt.iter() {
            let held = self.frames[frame_id.0].page_id();
            if held != Some(page_id) {
                return Err(Error::CacheInvariant(format!(
                    "page table maps {} to {} which holds {:?}",
                    page_id, frame_id, held
                )));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Internal: Called by PageGuard on drop
    // ========================================================================

    /// Unpin a page. Called by PageReadGuard/PageWriteGuard on drop.
    pub(crate) fn unpin_page_internal(&self, frame_id: FrameId, is_dirty: bool) {
        if self.frames[frame_id.0].release(is_dirty) == 0 {
            self.replacer.lock().set_evictable(frame_id, true);
        }
    }

    // ========================================================================
    // Internal: Core fetch logic
    // ========================================================================

    fn lookup(&self, page_id: PageId) -> Option<FrameId> {
        self.page_table.read().get(&page_id).copied()
    }

    /// Fetch a page into the buffer pool and pin it, returning its frame ID.
    fn fetch_page_internal(&self, page_id: PageId) -> Result<FrameId> {
        {
            let pt = self.page_table.read();
            if let Some(&frame_id) = pt.get(&page_id) {
                self.handle_cache_hit(frame_id);
                trace!(%page_id, %frame_id, "cache hit");
                return Ok(frame_id);
            }
        }

        self.handle_cache_miss(page_id)
    }

    fn handle_cache_hit(&self, frame_id: FrameId) {
        self.frames[frame_id.0].pin();
        {
            let mut replacer = self.replacer.lock();
            replacer.record_access(frame_id);
            replacer.set_evictable(frame_id, false);
        }
        BufferPoolStats::bump(&self.stats.cache_hits);
    }

    fn handle_cache_miss(&self, page_id: PageId) -> Result<FrameId> {
        BufferPoolStats::bump(&self.stats.cache_misses);
        trace!(%page_id, "cache miss");

        let frame_id = self.get_free_frame()?;
        match self.load_into_frame(page_id, frame_id, true) {
            Ok(loaded) => Ok(loaded),
            Err(e) => {
                self.free_list.lock().push(frame_id);
                Err(e)
            }
        }
    }

    /// Read a page from disk into an empty frame and register it.
    ///
    /// Returns the frame that holds the page afterwards. When another thread
    /// loaded the same page first, that frame is returned (pinned if
    /// `pinned`) and `frame_id` goes back to the free list.
    fn load_into_frame(&self, page_id: PageId, frame_id: FrameId, pinned: bool) -> Result<FrameId> {
        let page = {
            let mut dm = self.disk_manager.lock();
            dm.read_page(page_id)?
        };
        BufferPoolStats::bump(&self.stats.pages_read);
        verify_loaded(page_id, &page)?;

        let frame = &self.frames[frame_id.0];
        frame.load(page_id, &page);
        if pinned {
            frame.pin();
        }
        match self.install(page_id, frame_id, pinned) {
            None => Ok(frame_id),
            Some(existing) => {
                frame.reset();
                self.free_list.lock().push(frame_id);
                trace!(%page_id, %existing, "page loaded concurrently");
                Ok(existing)
            }
        }
    }

    /// Publish a loaded frame in the page table and the replacer.
    ///
    /// If the page is already resident nothing is published and the
    /// resident frame is returned instead, pinned when `pinned` is set.
    fn install(&self, page_id: PageId, frame_id: FrameId, pinned: bool) -> Option<FrameId> {
        let mut pt = self.page_table.write();
        if let Some(&existing) = pt.get(&page_id) {
            if pinned {
                self.frames[existing.0].pin();
                let mut replacer = self.replacer.lock();
                replacer.record_access(existing);
                replacer.set_evictable(existing, false);
            }
            return Some(existing);
        }
        pt.insert(page_id, frame_id);

        let mut replacer = self.replacer.lock();
        replacer.record_access(frame_id);
        replacer.set_evictable(frame_id, !pinned);
        None
    }

    // ========================================================================
    // Internal: Frame allocation and eviction
    // ========================================================================

    /// Get a free frame, evicting if necessary.
    fn get_free_frame(&self) -> Result<FrameId> {
        if let Some(frame_id) = self.free_list.lock().pop() {
            return Ok(frame_id);
        }

        self.evict_page()
    }

    /// Evict a page and return its now empty frame.
    ///
    /// The victim is written back before its page table entry goes away. A
    /// hit can pin or dirty the victim in between; it is then left resident
    /// and another victim is chosen.
    fn evict_page(&self) -> Result<FrameId> {
        loop {
            let frame_id = self.replacer.lock().evict().ok_or(Error::NoFreeFrames)?;
            let frame = &self.frames[frame_id.0];

            if let Some(page_id) = frame.page_id() {
                if let Err(e) = self.flush_frame(frame_id, page_id) {
                    // Keep the page resident; it is still the only copy.
                    let _pt = self.page_table.write();
                    let mut replacer = self.replacer.lock();
                    replacer.record_access(frame_id);
                    replacer.set_evictable(frame_id, !frame.is_pinned());
                    return Err(e);
                }

                let mut pt = self.page_table.write();
                if frame.is_pinned() || frame.is_dirty() {
                    // Hits hold the page table read lock while they pin and
                    // re-admit the frame, so the replacer already tracks it.
                    trace!(%page_id, %frame_id, "eviction lost to a concurrent hit");
                    continue;
                }
                pt.remove(&page_id);
                self.replacer.lock().remove(frame_id);
                debug!(%page_id, %frame_id, "evicted page");
            }

            frame.reset();
            BufferPoolStats::bump(&self.stats.evictions);
            return Ok(frame_id);
        }
    }

    /// Write a frame back to disk if dirty.
    fn flush_frame(&self, frame_id: FrameId, page_id: PageId) -> Result<()> {
        let frame = &self.frames[frame_id.0];
        let Some(image) = frame.dirty_image() else {
            return Ok(());
        };
        self.disk_manager.lock().write_page(page_id, &image)?;

        frame.mark_clean();
        BufferPoolStats::bump(&self.stats.pages_written);
        debug!(%page_id, "wrote back dirty page");
        Ok(())
    }
}

/// Reject pages whose checksum or slot directory do not hold up.
///
/// Zeroed pages (freshly allocated or freed) carry no checksum.
fn verify_loaded(page_id: PageId, page: &Page) -> Result<()> {
    if page.page_type() == PageType::Invalid {
        return Ok(());
    }
    if !page.verify_checksum() {
        return Err(Error::PageCorruption {
            page_id,
            reason: "checksum mismatch".to_string(),
        });
    }
    page.check_layout()
        .map_err(|reason| Error::PageCorruption { page_id, reason })
}
