//! A page cursor over a privately owned page buffer.

use crate::common::{PageId, Result};
use crate::cursor::{copy_page_bytes, CursorState, PageCursor};
use crate::storage::page::PageBuffer;

/// A [`PageCursor`] that owns its page instead of binding one from a file.
///
/// Useful for assembling a record before copying it into a paged file, and
/// as a stand-in for a file-bound cursor in tests. Every aspect the file
/// would normally control (page id, write lock, concurrent modification)
/// can be set directly.
///
/// [`PageCursor::next`] moves to the following page id and presents a
/// fresh, zeroed page.
pub struct StandalonePageCursor {
    page: PageBuffer,
    state: CursorState,
    page_id: PageId,
    write_locked: bool,
    needs_retry: bool,
    closed: bool,
}

impl StandalonePageCursor {
    /// A write-locked cursor on a zeroed page of `page_size` bytes.
    pub fn new(page_id: PageId, page_size: usize) -> Self {
        Self::with_page(page_id, PageBuffer::new(page_size))
    }

    /// A write-locked cursor over existing page contents.
    pub fn with_page(page_id: PageId, page: PageBuffer) -> Self {
        Self {
            page,
            state: CursorState::default(),
            page_id,
            write_locked: true,
            needs_retry: false,
            closed: false,
        }
    }

    pub fn page(&self) -> &PageBuffer {
        &self.page
    }

    pub fn page_mut(&mut self) -> &mut PageBuffer {
        &mut self.page
    }

    pub fn set_current_page_id(&mut self, page_id: PageId) {
        self.page_id = page_id;
    }

    /// Switch between a writable and a read-only binding. While read-only,
    /// puts leave the page untouched and record a cursor exception.
    pub fn set_write_locked(&mut self, write_locked: bool) {
        self.write_locked = write_locked;
    }

    /// Make the next [`PageCursor::should_retry`] report a concurrent
    /// modification.
    pub fn set_needs_retry(&mut self, needs_retry: bool) {
        self.needs_retry = needs_retry;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl PageCursor for StandalonePageCursor {
    fn get_bytes_at(&mut self, offset: i32, dst: &mut [u8]) {
        match self.state.range(offset, dst.len(), self.page.len()) {
            Some(range) => dst.copy_from_slice(&self.page.as_slice()[range]),
            None => dst.fill(0),
        }
    }

    fn put_bytes_at(&mut self, offset: i32, src: &[u8]) {
        if !self.write_locked {
            self.state.cursor_exception = Some(format!(
                "cannot write to {} through a read-only cursor",
                self.page_id
            ));
            return;
        }
        if let Some(range) = self.state.range(offset, src.len(), self.page.len()) {
            self.page.as_mut_slice()[range].copy_from_slice(src);
        }
    }

    fn offset(&self) -> i32 {
        self.state.offset
    }

    fn set_offset(&mut self, offset: i32) {
        self.state.set_offset(offset, self.page.len());
    }

    fn skip(&mut self, n: i32) {
        self.state.skip(n);
    }

    fn mark(&mut self) {
        self.state.mark = self.state.offset;
    }

    fn set_offset_to_mark(&mut self) {
        self.state.offset = self.state.mark;
    }

    fn check_and_clear_bounds_flag(&mut self) -> bool {
        self.state.check_and_clear_bounds_flag()
    }

    fn raise_out_of_bounds(&mut self) {
        self.state.out_of_bounds = true;
    }

    fn set_cursor_exception(&mut self, message: String) {
        self.state.cursor_exception = Some(message);
    }

    fn check_and_clear_cursor_exception(&mut self) -> Result<()> {
        self.state.check_and_clear_cursor_exception()
    }

    fn clear_cursor_exception(&mut self) {
        self.state.cursor_exception = None;
    }

    fn should_retry(&mut self) -> Result<bool> {
        if !std::mem::take(&mut self.needs_retry) {
            return Ok(false);
        }
        self.state.reset();
        Ok(true)
    }

    fn is_write_locked(&self) -> bool {
        self.write_locked
    }

    fn current_page_id(&self) -> PageId {
        self.page_id
    }

    fn current_page_size(&self) -> Result<usize> {
        Ok(self.page.len())
    }

    fn next(&mut self) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }
        self.page_id = self.page_id.next();
        self.page.reset();
        self.state.offset = 0;
        Ok(true)
    }

    fn next_page(&mut self, page_id: PageId) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }
        self.page_id = page_id;
        self.page.reset();
        self.state.offset = 0;
        Ok(true)
    }

    fn copy_to(
        &mut self,
        source_offset: i32,
        target: &mut dyn PageCursor,
        target_offset: i32,
        length: i32,
    ) -> Result<usize> {
        copy_page_bytes(
            self.page.as_slice(),
            &mut self.state,
            source_offset,
            target,
            target_offset,
            length,
        )
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
