//! Page identifier type.

use std::fmt;

/// Identifies a page within one paged file.
///
/// Page ids are 0-based; page `p` occupies the byte range
/// `p * page_size .. (p + 1) * page_size` of the backing file. Being
/// unsigned, a negative page id cannot be expressed.
///
/// # Example
/// ```
/// use graphpage::PageId;
///
/// let page_id = PageId::new(42);
/// assert!(page_id.is_valid());
/// assert_eq!(page_id.0, 42);
/// assert_eq!(page_id.next(), PageId::new(43));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u64);

impl PageId {
    /// Invalid/sentinel page ID.
    ///
    /// Used by cursors that are not bound to any page.
    pub const INVALID: PageId = PageId(u64::MAX);

    /// Create a new PageId.
    #[inline]
    pub fn new(id: u64) -> Self {
        PageId(id)
    }

    /// Check if this page ID is valid (not the sentinel value).
    #[inline]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// The page following this one.
    ///
    /// The successor of [`PageId::INVALID`] is page 0, which is how an
    /// unbound cursor advances onto the first page of a file.
    #[inline]
    pub fn next(&self) -> PageId {
        PageId(self.0.wrapping_add(1))
    }

    /// Byte offset of this page in a file with the given page size.
    ///
    /// Returns `None` if the offset does not fit in a `u64`.
    #[inline]
    pub fn file_offset(&self, page_size: usize) -> Option<u64> {
        self.0.checked_mul(page_size as u64)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "Page(INVALID)")
        } else {
            write!(f, "Page({})", self.0)
        }
    }
}
