//! Page cursors - bounds-checked, retry-capable page accessors.
//!
//! A [`PageCursor`] reads and writes big-endian integers and byte runs at
//! offsets within one page (or a composed view of two pages). Instead of
//! failing on the hot path, cursors record problems in two side channels:
//!
//! ```text
//!   get/put out of range ──▶ sticky bounds flag ──▶ check_and_clear_bounds_flag()
//!   corrupt data noticed ──▶ cursor exception   ──▶ check_and_clear_cursor_exception()?
//! ```
//!
//! A reader runs its whole speculative read sequence, then asks
//! [`PageCursor::should_retry`]; if the page changed underneath it, the
//! cursor is reset to its initial offset and the sequence is redone.
//!
//! # Components
//! - [`PageCursor`] - the cursor contract
//! - [`CompositePageCursor`] - two cursors presented as one address space
//! - [`StandalonePageCursor`] - a cursor over a privately owned page

mod composite;
mod standalone;

use std::ops::Range;

use crate::common::{Error, PageId, Result};

pub use composite::CompositePageCursor;
pub use standalone::StandalonePageCursor;

/// Accessor for the bytes of one page.
///
/// # Offsets
/// Offsets are `i32` byte positions. Relative accessors (`get_int`,
/// `put_bytes`, ...) use the current offset and advance it by the width of
/// the value even when the access was out of bounds, so the offset may
/// transiently point past the end of the page.
///
/// # Bounds
/// An access whose range `offset..offset + width` is not inside
/// `[0, page_len)` sets a sticky flag, reads zero and writes nothing. The
/// flag stays set until [`PageCursor::check_and_clear_bounds_flag`].
///
/// # Byte order
/// All multi-byte values are big-endian.
///
/// # Example
/// ```
/// use graphpage::cursor::{PageCursor, StandalonePageCursor};
/// use graphpage::PageId;
///
/// let mut cursor = StandalonePageCursor::new(PageId::new(0), 16);
/// cursor.put_int(0x0102_0304);
/// cursor.put_short(-2);
/// cursor.rewind();
/// assert_eq!(cursor.get_int(), 0x0102_0304);
/// assert_eq!(cursor.get_short(), -2);
/// assert!(!cursor.check_and_clear_bounds_flag());
///
/// cursor.get_long_at(12); // 12..20 is past the 16 byte page
/// assert!(cursor.check_and_clear_bounds_flag());
/// ```
pub trait PageCursor {
    // ------------------------------------------------------------------------
    // Required: raw access
    // ------------------------------------------------------------------------

    /// Fill `dst` with the bytes at `offset..offset + dst.len()`.
    ///
    /// Out of bounds: raises the bounds flag and zero-fills `dst`.
    fn get_bytes_at(&mut self, offset: i32, dst: &mut [u8]);

    /// Store `src` at `offset..offset + src.len()`.
    ///
    /// Out of bounds: raises the bounds flag and writes nothing.
    fn put_bytes_at(&mut self, offset: i32, src: &[u8]);

    /// Current offset.
    fn offset(&self) -> i32;

    /// Move to `offset`.
    ///
    /// An offset outside `[0, page_len]` raises the bounds flag and moves
    /// to 0 instead.
    fn set_offset(&mut self, offset: i32);

    /// Advance the current offset by `n` without any bounds check.
    fn skip(&mut self, n: i32);

    /// Remember the current offset.
    fn mark(&mut self);

    /// Return to the offset saved by [`PageCursor::mark`]. The bounds flag
    /// is unaffected.
    fn set_offset_to_mark(&mut self);

    // ------------------------------------------------------------------------
    // Required: fault channels
    // ------------------------------------------------------------------------

    /// Report whether an out-of-bounds access happened since the last call,
    /// and clear the flag.
    fn check_and_clear_bounds_flag(&mut self) -> bool;

    /// Set the bounds flag explicitly.
    fn raise_out_of_bounds(&mut self);

    /// Record a deferred fault. Overwrites any fault already pending.
    fn set_cursor_exception(&mut self, message: String);

    /// Surface a pending fault as `Error::Cursor` and clear it.
    fn check_and_clear_cursor_exception(&mut self) -> Result<()>;

    /// Drop any pending fault without surfacing it.
    fn clear_cursor_exception(&mut self);

    // ------------------------------------------------------------------------
    // Required: binding
    // ------------------------------------------------------------------------

    /// True if the page may have changed since it was bound or last
    /// retried. When true the offset is back at its initial position and
    /// the bounds flag is clear; the caller must redo its reads.
    fn should_retry(&mut self) -> Result<bool>;

    /// True if this binding grants exclusive mutation rights.
    fn is_write_locked(&self) -> bool;

    /// Id of the bound page, or [`PageId::INVALID`].
    fn current_page_id(&self) -> PageId;

    /// Size of the bound page in bytes.
    fn current_page_size(&self) -> Result<usize>;

    /// Bind the following page of the same file.
    ///
    /// Returns `Ok(false)` if there is no such page to bind.
    fn next(&mut self) -> Result<bool>;

    /// Bind page `page_id` of the same file.
    fn next_page(&mut self, page_id: PageId) -> Result<bool>;

    /// Copy up to `length` bytes from `source_offset` of this page to
    /// `target_offset` of `target`'s page.
    ///
    /// The count is clamped to what fits in both pages. Offsets outside
    /// either page, or a negative length, raise this cursor's bounds flag
    /// and copy nothing.
    ///
    /// # Errors
    /// - `Error::InvalidArgument` if `target` is not write-locked
    fn copy_to(
        &mut self,
        source_offset: i32,
        target: &mut dyn PageCursor,
        target_offset: i32,
        length: i32,
    ) -> Result<usize>;

    /// Release the binding. Idempotent.
    fn close(&mut self);

    // ------------------------------------------------------------------------
    // Provided: typed absolute access
    // ------------------------------------------------------------------------

    fn get_byte_at(&mut self, offset: i32) -> u8 {
        let mut buf = [0u8; 1];
        self.get_bytes_at(offset, &mut buf);
        buf[0]
    }

    fn get_short_at(&mut self, offset: i32) -> i16 {
        let mut buf = [0u8; 2];
        self.get_bytes_at(offset, &mut buf);
        i16::from_be_bytes(buf)
    }

    fn get_int_at(&mut self, offset: i32) -> i32 {
        let mut buf = [0u8; 4];
        self.get_bytes_at(offset, &mut buf);
        i32::from_be_bytes(buf)
    }

    fn get_long_at(&mut self, offset: i32) -> i64 {
        let mut buf = [0u8; 8];
        self.get_bytes_at(offset, &mut buf);
        i64::from_be_bytes(buf)
    }

    fn put_byte_at(&mut self, offset: i32, value: u8) {
        self.put_bytes_at(offset, &[value]);
    }

    fn put_short_at(&mut self, offset: i32, value: i16) {
        self.put_bytes_at(offset, &value.to_be_bytes());
    }

    fn put_int_at(&mut self, offset: i32, value: i32) {
        self.put_bytes_at(offset, &value.to_be_bytes());
    }

    fn put_long_at(&mut self, offset: i32, value: i64) {
        self.put_bytes_at(offset, &value.to_be_bytes());
    }

    // ------------------------------------------------------------------------
    // Provided: typed relative access
    // ------------------------------------------------------------------------

    fn get_byte(&mut self) -> u8 {
        let value = self.get_byte_at(self.offset());
        self.skip(1);
        value
    }

    fn get_short(&mut self) -> i16 {
        let value = self.get_short_at(self.offset());
        self.skip(2);
        value
    }

    fn get_int(&mut self) -> i32 {
        let value = self.get_int_at(self.offset());
        self.skip(4);
        value
    }

    fn get_long(&mut self) -> i64 {
        let value = self.get_long_at(self.offset());
        self.skip(8);
        value
    }

    fn get_bytes(&mut self, dst: &mut [u8]) {
        self.get_bytes_at(self.offset(), dst);
        self.skip(clamp_len(dst.len()));
    }

    fn put_byte(&mut self, value: u8) {
        self.put_byte_at(self.offset(), value);
        self.skip(1);
    }

    fn put_short(&mut self, value: i16) {
        self.put_short_at(self.offset(), value);
        self.skip(2);
    }

    fn put_int(&mut self, value: i32) {
        self.put_int_at(self.offset(), value);
        self.skip(4);
    }

    fn put_long(&mut self, value: i64) {
        self.put_long_at(self.offset(), value);
        self.skip(8);
    }

    fn put_bytes(&mut self, src: &[u8]) {
        self.put_bytes_at(self.offset(), src);
        self.skip(clamp_len(src.len()));
    }

    /// Move back to the start of this cursor's own view.
    fn rewind(&mut self) {
        self.set_offset(0);
    }
}

fn clamp_len(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}

// ============================================================================
// Shared single-page cursor state
// ============================================================================

/// Offset, mark and fault channels of a cursor over one page.
#[derive(Debug, Default)]
pub(crate) struct CursorState {
    pub offset: i32,
    pub mark: i32,
    pub out_of_bounds: bool,
    pub cursor_exception: Option<String>,
}

impl CursorState {
    /// Translate an access of `width` bytes at `offset` into a slice range
    /// of a page of `page_len` bytes, raising the bounds flag if it does
    /// not fit.
    pub fn range(&mut self, offset: i32, width: usize, page_len: usize) -> Option<Range<usize>> {
        let start = match usize::try_from(offset) {
            Ok(start) => start,
            Err(_) => {
                self.out_of_bounds = true;
                return None;
            }
        };
        match start.checked_add(width) {
            Some(end) if end <= page_len => Some(start..end),
            _ => {
                self.out_of_bounds = true;
                None
            }
        }
    }

    pub fn set_offset(&mut self, offset: i32, page_len: usize) {
        if offset < 0 || offset as usize > page_len {
            self.out_of_bounds = true;
            self.offset = 0;
        } else {
            self.offset = offset;
        }
    }

    pub fn skip(&mut self, n: i32) {
        self.offset = self.offset.saturating_add(n);
    }

    pub fn check_and_clear_bounds_flag(&mut self) -> bool {
        std::mem::take(&mut self.out_of_bounds)
    }

    pub fn check_and_clear_cursor_exception(&mut self) -> Result<()> {
        match self.cursor_exception.take() {
            Some(message) => Err(Error::Cursor(message)),
            None => Ok(()),
        }
    }

    /// Start over after a retry or a new binding.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.mark = 0;
        self.out_of_bounds = false;
    }
}

/// Copy bytes of `source` (a page of the calling cursor) into `target`.
///
/// Shared by the single-page cursors' [`PageCursor::copy_to`].
pub(crate) fn copy_page_bytes(
    source: &[u8],
    state: &mut CursorState,
    source_offset: i32,
    target: &mut dyn PageCursor,
    target_offset: i32,
    length: i32,
) -> Result<usize> {
    if !target.is_write_locked() {
        return Err(Error::InvalidArgument(
            "target cursor must be write-locked".to_string(),
        ));
    }
    let target_len = target.current_page_size()?;
    let (Ok(src_at), Ok(dst_at), Ok(length)) = (
        usize::try_from(source_offset),
        usize::try_from(target_offset),
        usize::try_from(length),
    ) else {
        state.out_of_bounds = true;
        return Ok(0);
    };
    if src_at >= source.len() || dst_at >= target_len {
        state.out_of_bounds = true;
        return Ok(0);
    }
    let count = length.min(source.len() - src_at).min(target_len - dst_at);
    target.put_bytes_at(target_offset, &source[src_at..src_at + count]);
    Ok(count)
}

// ============================================================================
// Forwarding impls
// ============================================================================

macro_rules! forward_page_cursor {
    ($($ty:ty),*) => {$(
        impl<C: PageCursor + ?Sized> PageCursor for $ty {
            fn get_bytes_at(&mut self, offset: i32, dst: &mut [u8]) {
                (**self).get_bytes_at(offset, dst)
            }
            fn put_bytes_at(&mut self, offset: i32, src: &[u8]) {
                (**self).put_bytes_at(offset, src)
            }
            fn offset(&self) -> i32 {
                (**self).offset()
            }
            fn set_offset(&mut self, offset: i32) {
                (**self).set_offset(offset)
            }
            fn skip(&mut self, n: i32) {
                (**self).skip(n)
            }
            fn mark(&mut self) {
                (**self).mark()
            }
            fn set_offset_to_mark(&mut self) {
                (**self).set_offset_to_mark()
            }
            fn check_and_clear_bounds_flag(&mut self) -> bool {
                (**self).check_and_clear_bounds_flag()
            }
            fn raise_out_of_bounds(&mut self) {
                (**self).raise_out_of_bounds()
            }
            fn set_cursor_exception(&mut self, message: String) {
                (**self).set_cursor_exception(message)
            }
            fn check_and_clear_cursor_exception(&mut self) -> Result<()> {
                (**self).check_and_clear_cursor_exception()
            }
            fn clear_cursor_exception(&mut self) {
                (**self).clear_cursor_exception()
            }
            fn should_retry(&mut self) -> Result<bool> {
                (**self).should_retry()
            }
            fn is_write_locked(&self) -> bool {
                (**self).is_write_locked()
            }
            fn current_page_id(&self) -> PageId {
                (**self).current_page_id()
            }
            fn current_page_size(&self) -> Result<usize> {
                (**self).current_page_size()
            }
            fn next(&mut self) -> Result<bool> {
                (**self).next()
            }
            fn next_page(&mut self, page_id: PageId) -> Result<bool> {
                (**self).next_page(page_id)
            }
            fn copy_to(
                &mut self,
                source_offset: i32,
                target: &mut dyn PageCursor,
                target_offset: i32,
                length: i32,
            ) -> Result<usize> {
                (**self).copy_to(source_offset, target, target_offset, length)
            }
            fn close(&mut self) {
                (**self).close()
            }
            fn rewind(&mut self) {
                (**self).rewind()
            }
        }
    )*};
}

forward_page_cursor!(&mut C, Box<C>);
