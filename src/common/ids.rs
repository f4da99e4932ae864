//! Page and frame identifiers.

use std::fmt;

/// Position of a page in the database file.
///
/// The same `u32` encoding is stored in a page's `next_page` link, where
/// [`PageId::INVALID`] ends the chain.
///
/// ```
/// use kerneldb::PageId;
///
/// assert_eq!(PageId::from_link(3), Some(PageId::new(3)));
/// assert_eq!(PageId::from_link(u32::MAX), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl PageId {
    /// Never allocated; marks a missing link.
    pub const INVALID: PageId = PageId(u32::MAX);

    #[inline]
    pub const fn new(id: u32) -> Self {
        PageId(id)
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn from_link(raw: u32) -> Option<PageId> {
        Some(PageId(raw)).filter(|id| id.is_valid())
    }

    #[inline]
    pub fn to_link(page: Option<PageId>) -> u32 {
        page.map_or(u32::MAX, |id| id.0)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "page {}", self.0)
        } else {
            f.write_str("page <none>")
        }
    }
}

/// Index of a slot in the buffer pool's frame array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub usize);

impl FrameId {
    #[inline]
    pub const fn new(index: usize) -> Self {
        FrameId(index)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame {}", self.0)
    }
}
