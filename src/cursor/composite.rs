//! Composite page cursor - two page cursors seen as one address space.
//!
//! A record that straddles a page boundary is read through a
//! [`CompositePageCursor`] built from a cursor positioned at the record's
//! start on the first page and a cursor positioned at the continuation on
//! the second page:
//!
//! ```text
//!            logical offset
//!   0                 len1                   len1+len2
//!   ├──────────────────┼──────────────────────┤
//!   │ first            │ second               │
//!   │ @ base1 + o      │ @ base2 + (o - len1) │
//!   └──────────────────┴──────────────────────┘
//! ```
//!
//! `base1` and `base2` are the offsets the two cursors had when the
//! composite was built. Values crossing `len1` are stitched together from
//! the tail of `first` and the head of `second`.

use std::mem;

use crate::common::{Error, PageId, Result};
use crate::cursor::PageCursor;

/// Presents `(first, len1, second, len2)` as one cursor of `len1 + len2`
/// bytes.
///
/// Gets and puts address the underlying cursors by absolute offset and
/// leave their own offsets alone. Declared lengths are never checked
/// against the underlying pages; overruns surface through the underlying
/// cursors' bounds flags when the bytes are actually touched.
///
/// # Example
/// ```
/// use graphpage::cursor::{CompositePageCursor, PageCursor, StandalonePageCursor};
/// use graphpage::PageId;
///
/// let mut first = StandalonePageCursor::new(PageId::new(0), 8);
/// let mut second = StandalonePageCursor::new(PageId::new(1), 8);
/// first.put_bytes_at(6, &[0x01, 0x02]);
/// second.put_bytes_at(0, &[0x03, 0x04]);
/// first.set_offset(6);
///
/// let mut cursor = CompositePageCursor::compose(first, 2, second, 2);
/// assert_eq!(cursor.get_int(), 0x0102_0304);
/// assert!(!cursor.check_and_clear_bounds_flag());
/// ```
pub struct CompositePageCursor<A, B> {
    first: A,
    first_base: i32,
    first_len: i32,
    second: B,
    second_base: i32,
    second_len: i32,
    offset: i32,
    mark: i32,
    out_of_bounds: bool,
}

impl<A: PageCursor, B: PageCursor> CompositePageCursor<A, B> {
    /// Join `first_len` bytes of `first` and `second_len` bytes of
    /// `second`, each starting at the cursor's current offset.
    pub fn compose(first: A, first_len: i32, second: B, second_len: i32) -> Self {
        let first_base = first.offset();
        let second_base = second.offset();
        Self {
            first,
            first_base,
            first_len,
            second,
            second_base,
            second_len,
            offset: 0,
            mark: 0,
            out_of_bounds: false,
        }
    }

    pub fn first(&self) -> &A {
        &self.first
    }

    pub fn first_mut(&mut self) -> &mut A {
        &mut self.first
    }

    pub fn second(&self) -> &B {
        &self.second
    }

    pub fn second_mut(&mut self) -> &mut B {
        &mut self.second
    }

    /// Take the underlying cursors back.
    pub fn into_parts(self) -> (A, B) {
        (self.first, self.second)
    }

    fn view_len(&self) -> i64 {
        i64::from(self.first_len) + i64::from(self.second_len)
    }

    /// Split an access of `width` bytes at logical `offset` into the number
    /// of bytes served by `first`, raising the composite's own flag if the
    /// range leaves the view.
    fn split(&mut self, offset: i32, width: usize) -> Option<usize> {
        let end = i64::from(offset) + width as i64;
        if offset < 0 || end > self.view_len() {
            self.out_of_bounds = true;
            return None;
        }
        let from_first = (i64::from(self.first_len) - i64::from(offset)).clamp(0, width as i64);
        Some(from_first as usize)
    }

    /// Offset on `second` for logical offset `offset >= first_len`.
    fn second_offset(&self, offset: i32) -> i32 {
        self.second_base
            .saturating_add(offset.saturating_sub(self.first_len))
    }

    fn reposition(&mut self) {
        let into_first = self.offset.min(self.first_len);
        let into_second = self.offset.saturating_sub(self.first_len).max(0);
        self.first
            .set_offset(self.first_base.saturating_add(into_first));
        self.second
            .set_offset(self.second_base.saturating_add(into_second));
    }
}

impl<A: PageCursor, B: PageCursor> PageCursor for CompositePageCursor<A, B> {
    fn get_bytes_at(&mut self, offset: i32, dst: &mut [u8]) {
        let Some(from_first) = self.split(offset, dst.len()) else {
            dst.fill(0);
            return;
        };
        let (head, tail) = dst.split_at_mut(from_first);
        if !head.is_empty() {
            let at = self.first_base.saturating_add(offset);
            self.first.get_bytes_at(at, head);
        }
        if !tail.is_empty() {
            let at = self.second_offset(offset.saturating_add(from_first as i32));
            self.second.get_bytes_at(at, tail);
        }
    }

    fn put_bytes_at(&mut self, offset: i32, src: &[u8]) {
        let Some(from_first) = self.split(offset, src.len()) else {
            return;
        };
        let (head, tail) = src.split_at(from_first);
        if !head.is_empty() {
            let at = self.first_base.saturating_add(offset);
            self.first.put_bytes_at(at, head);
        }
        if !tail.is_empty() {
            let at = self.second_offset(offset.saturating_add(from_first as i32));
            self.second.put_bytes_at(at, tail);
        }
    }

    fn offset(&self) -> i32 {
        self.offset
    }

    /// Move the logical offset and position `first` and `second` to match
    /// it: `first` at `base1 + min(o, len1)`, `second` at
    /// `base2 + max(0, o - len1)`.
    fn set_offset(&mut self, offset: i32) {
        if offset < 0 || i64::from(offset) > self.view_len() {
            self.out_of_bounds = true;
            self.offset = 0;
        } else {
            self.offset = offset;
        }
        self.reposition();
    }

    fn skip(&mut self, n: i32) {
        self.offset = self.offset.saturating_add(n);
    }

    fn mark(&mut self) {
        self.mark = self.offset;
        self.first.mark();
        self.second.mark();
    }

    fn set_offset_to_mark(&mut self) {
        self.offset = self.mark;
        self.first.set_offset_to_mark();
        self.second.set_offset_to_mark();
    }

    /// Checks the composite's own flag, then `first`'s, then `second`'s,
    /// clearing only the first one found set.
    fn check_and_clear_bounds_flag(&mut self) -> bool {
        if mem::take(&mut self.out_of_bounds) {
            return true;
        }
        if self.first.check_and_clear_bounds_flag() {
            return true;
        }
        self.second.check_and_clear_bounds_flag()
    }

    fn raise_out_of_bounds(&mut self) {
        self.out_of_bounds = true;
    }

    /// Routed to the cursor owning the current offset.
    fn set_cursor_exception(&mut self, message: String) {
        if self.offset < self.first_len {
            self.first.set_cursor_exception(message);
        } else {
            self.second.set_cursor_exception(message);
        }
    }

    /// Surfaces `first`'s fault if it has one; `second` is only consulted
    /// when `first` is clean.
    fn check_and_clear_cursor_exception(&mut self) -> Result<()> {
        self.first.check_and_clear_cursor_exception()?;
        self.second.check_and_clear_cursor_exception()
    }

    fn clear_cursor_exception(&mut self) {
        self.first.clear_cursor_exception();
        self.second.clear_cursor_exception();
    }

    fn should_retry(&mut self) -> Result<bool> {
        let first = self.first.should_retry()?;
        let second = self.second.should_retry()?;
        if !(first || second) {
            return Ok(false);
        }
        self.offset = 0;
        self.reposition();
        self.out_of_bounds = false;
        self.first.check_and_clear_bounds_flag();
        self.second.check_and_clear_bounds_flag();
        Ok(true)
    }

    fn is_write_locked(&self) -> bool {
        self.first.is_write_locked() && self.second.is_write_locked()
    }

    fn current_page_id(&self) -> PageId {
        if self.offset < self.first_len {
            self.first.current_page_id()
        } else {
            self.second.current_page_id()
        }
    }

    fn current_page_size(&self) -> Result<usize> {
        Err(Error::Unsupported(
            "a composite cursor spans two pages and has no single page size",
        ))
    }

    fn next(&mut self) -> Result<bool> {
        Err(Error::Unsupported("a composite cursor cannot move to another page"))
    }

    fn next_page(&mut self, _page_id: PageId) -> Result<bool> {
        Err(Error::Unsupported("a composite cursor cannot move to another page"))
    }

    fn copy_to(
        &mut self,
        _source_offset: i32,
        _target: &mut dyn PageCursor,
        _target_offset: i32,
        _length: i32,
    ) -> Result<usize> {
        Err(Error::Unsupported("a composite cursor cannot copy pages"))
    }

    fn close(&mut self) {
        self.first.close();
        self.second.close();
    }

    /// Back to logical offset 0; the underlying cursors keep their offsets.
    fn rewind(&mut self) {
        self.offset = 0;
    }
}
