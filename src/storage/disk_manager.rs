//! Page-granular access to the database file.
//!
//! The file is a flat array of `PAGE_SIZE` pages; page `n` starts at byte
//! `n * PAGE_SIZE`. Page 0 holds the catalog. The [`DiskManager`] never
//! interprets page contents and never reuses an id: freeing a page
//! zero-fills it in place.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{trace, warn};

use crate::common::config::{MAX_PAGES, PAGE_SIZE};
use crate::common::{Error, PageId, Result};
use crate::storage::page::Page;

/// Owner of the backing file. Every write is a whole page followed by
/// `fsync`, so a crash never leaves half a page behind on disk.
pub struct DiskManager {
    file: File,
    /// Pages allocated so far; ids `0..pages` are valid.
    pages: u32,
    /// Allocation stops at this many pages.
    limit: u64,
}

impl DiskManager {
    /// Create a new, empty database file.
    ///
    /// # Errors
    /// Fails if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        Ok(Self {
            file,
            pages: 0,
            limit: MAX_PAGES,
        })
    }

    /// Open an existing database file.
    ///
    /// A trailing fragment shorter than a page (an interrupted allocation)
    /// is ignored and overwritten by the next allocation.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let len = file.metadata()?.len();
        let page_size = PAGE_SIZE as u64;
        if len % page_size != 0 {
            warn!(
                path = %path.as_ref().display(),
                trailing_bytes = len % page_size,
                "ignoring partial page at end of file"
            );
        }
        let pages = len / page_size;
        if pages > MAX_PAGES {
            return Err(Error::StorageFull { limit: MAX_PAGES });
        }
        Ok(Self {
            file,
            pages: pages as u32,
            limit: MAX_PAGES,
        })
    }

    /// Cap the file at `limit` pages, below the addressable maximum.
    pub fn with_page_limit(mut self, limit: u32) -> Self {
        self.limit = u64::from(limit).min(MAX_PAGES);
        self
    }

    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// # Errors
    /// `Error::PageNotFound` if `page_id` was never allocated.
    pub fn read_page(&mut self, page_id: PageId) -> Result<Page> {
        self.seek_to(page_id)?;
        let mut page = Page::new();
        self.file.read_exact(page.as_mut_slice())?;
        trace!(%page_id, "read page");
        Ok(page)
    }

    /// # Errors
    /// `Error::PageNotFound` if `page_id` was never allocated.
    pub fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        self.seek_to(page_id)?;
        self.put(page.as_slice())?;
        trace!(%page_id, "wrote page");
        Ok(())
    }

    /// Extend the file by one zeroed page and return its id.
    pub fn allocate_page(&mut self) -> Result<PageId> {
        if u64::from(self.pages) >= self.limit {
            return Err(Error::StorageFull { limit: self.limit });
        }
        let page_id = PageId::new(self.pages);
        self.file.seek(SeekFrom::Start(Self::offset(page_id)))?;
        self.put(&[0u8; PAGE_SIZE])?;
        self.pages += 1;
        trace!(%page_id, "allocated page");
        Ok(page_id)
    }

    /// Zero-fill a page. The id is not handed out again.
    pub fn free_page(&mut self, page_id: PageId) -> Result<()> {
        self.seek_to(page_id)?;
        self.put(&[0u8; PAGE_SIZE])
    }

    #[inline]
    pub fn page_count(&self) -> u32 {
        self.pages
    }

    /// Bytes covered by allocated pages.
    #[inline]
    pub fn file_size(&self) -> u64 {
        u64::from(self.pages) * PAGE_SIZE as u64
    }

    fn offset(page_id: PageId) -> u64 {
        u64::from(page_id.0) * PAGE_SIZE as u64
    }

    fn seek_to(&mut self, page_id: PageId) -> Result<()> {
        if page_id.0 >= self.pages {
            return Err(Error::PageNotFound(page_id));
        }
        self.file.seek(SeekFrom::Start(Self::offset(page_id)))?;
        Ok(())
    }

    fn put(&mut self, bytes: &[u8]) -> Result<()> {
        self.file.write_all(bytes)?;
        self.file.sync_data()?;
        Ok(())
    }
}
