//! PageBuffer - the byte region a page lives in while it is in memory.
//!
//! A [`PageBuffer`] is a zero-initialized, fixed-length byte region. Its
//! length is chosen when it is allocated (the page size of the file it
//! belongs to) and never changes afterwards.

use std::fmt;

/// A fixed-size, heap-allocated page buffer.
///
/// This is the unit of I/O between the swapper and memory. Frames in a
/// paged file and standalone cursors each own one.
///
/// # Clone Implementation
/// Copying a page is an explicit operation ([`PageBuffer::copy_from`]) in
/// production code. A `#[cfg(test)]` Clone is provided for tests.
///
/// # Example
/// ```
/// use graphpage::storage::page::PageBuffer;
///
/// let mut page = PageBuffer::new(8192);
/// page.as_mut_slice()[0] = 0xFF;
/// assert_eq!(page.as_slice()[0], 0xFF);
/// assert_eq!(page.len(), 8192);
/// ```
pub struct PageBuffer {
    data: Box<[u8]>,
}

impl PageBuffer {
    /// Allocate a new zeroed buffer of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size].into_boxed_slice(),
        }
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

    /// Length of the buffer in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Zero out the entire buffer.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    /// Overwrite this buffer with the contents of `other`.
    ///
    /// # Panics
    /// Panics if the two buffers differ in length.
    pub fn copy_from(&mut self, other: &PageBuffer) {
        self.data.copy_from_slice(&other.data);
    }
}

impl From<Vec<u8>> for PageBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self {
            data: data.into_boxed_slice(),
        }
    }
}

impl fmt::Debug for PageBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageBuffer")
            .field("len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
impl Clone for PageBuffer {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
        }
    }
}
