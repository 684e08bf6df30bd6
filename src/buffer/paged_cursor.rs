//! Cursors bound to pages of a [`PagedFile`].

use parking_lot::MutexGuard;

use crate::buffer::{CursorMode, PagedFile};
use crate::common::{FrameId, PageId, Result};
use crate::cursor::{copy_page_bytes, CursorState, PageCursor};
use crate::storage::page::PageBuffer;

/// A [`PageCursor`] walking the pages of a [`PagedFile`].
///
/// The cursor starts unbound; the first [`PageCursor::next`] binds the page
/// given to [`PagedFile::io`], each later call the page after the current
/// one.
///
/// # Read cursors
/// Binding copies the frame's bytes and remembers the frame's version.
/// Gets read the copy, so a reader never blocks a writer;
/// [`PageCursor::should_retry`] compares versions, and on a mismatch takes
/// a fresh copy and starts the caller over. Puts are rejected with a
/// cursor exception. `next` returns `false` past the last page of the file.
///
/// # Write cursors
/// Binding takes the frame's writer lock, so at most one write cursor works
/// on a page at a time. Puts go to a private copy that is published (and the
/// frame marked dirty) when the cursor moves on or closes. `next` grows the
/// file. Holding two write cursors on the same page in one thread deadlocks.
pub struct PagedFileCursor<'a> {
    file: &'a PagedFile,
    mode: CursorMode,
    page: PageBuffer,
    state: CursorState,
    page_id: PageId,
    next_page_id: PageId,
    frame: Option<FrameId>,
    version: u64,
    writer: Option<MutexGuard<'a, ()>>,
    modified: bool,
    closed: bool,
}

impl<'a> PagedFileCursor<'a> {
    pub(crate) fn new(file: &'a PagedFile, page_id: PageId, mode: CursorMode) -> Self {
        Self {
            file,
            mode,
            page: PageBuffer::new(file.page_size()),
            state: CursorState::default(),
            page_id: PageId::INVALID,
            next_page_id: page_id,
            frame: None,
            version: 0,
            writer: None,
            modified: false,
            closed: false,
        }
    }

    pub fn mode(&self) -> CursorMode {
        self.mode
    }

    /// Bytes addressable through the cursor: the page size while bound,
    /// nothing otherwise.
    fn page_len(&self) -> usize {
        if self.frame.is_some() {
            self.page.len()
        } else {
            0
        }
    }

    /// Publish pending writes, drop the writer lock and unpin.
    fn release(&mut self) {
        let Some(frame_id) = self.frame.take() else {
            return;
        };
        let file = self.file;
        if self.modified {
            file.frame(frame_id).publish(&self.page);
            self.modified = false;
        }
        self.writer = None;
        file.unpin(frame_id);
        self.page_id = PageId::INVALID;
    }

    fn bind(&mut self, page_id: PageId) -> Result<bool> {
        self.release();
        if self.closed {
            return Ok(false);
        }
        let file = self.file;
        if self.mode == CursorMode::Read && !matches!(file.last_page_id(), Some(last) if page_id <= last)
        {
            return Ok(false);
        }

        let frame_id = file.pin(page_id)?;
        if self.mode == CursorMode::Write {
            file.grow_to(page_id);
        }
        let frame = file.frame(frame_id);
        if self.mode == CursorMode::Write {
            self.writer = Some(frame.lock_writer());
        }
        self.version = frame.snapshot_into(&mut self.page);

        self.frame = Some(frame_id);
        self.page_id = page_id;
        self.next_page_id = page_id.next();
        self.state.offset = 0;
        Ok(true)
    }
}

impl PageCursor for PagedFileCursor<'_> {
    fn get_bytes_at(&mut self, offset: i32, dst: &mut [u8]) {
        let page_len = self.page_len();
        match self.state.range(offset, dst.len(), page_len) {
            Some(range) => dst.copy_from_slice(&self.page.as_slice()[range]),
            None => dst.fill(0),
        }
    }

    fn put_bytes_at(&mut self, offset: i32, src: &[u8]) {
        if self.mode == CursorMode::Read {
            self.state.cursor_exception = Some(format!(
                "cannot write to {} through a read cursor",
                self.page_id
            ));
            return;
        }
        let page_len = self.page_len();
        if let Some(range) = self.state.range(offset, src.len(), page_len) {
            self.page.as_mut_slice()[range].copy_from_slice(src);
            self.modified = true;
        }
    }

    fn offset(&self) -> i32 {
        self.state.offset
    }

    fn set_offset(&mut self, offset: i32) {
        let page_len = self.page_len();
        self.state.set_offset(offset, page_len);
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
        if self.mode == CursorMode::Write {
            return Ok(false);
        }
        let Some(frame_id) = self.frame else {
            return Ok(false);
        };
        let frame = self.file.frame(frame_id);
        if frame.version() == self.version {
            return Ok(false);
        }
        self.version = frame.snapshot_into(&mut self.page);
        self.state.reset();
        Ok(true)
    }

    fn is_write_locked(&self) -> bool {
        self.mode == CursorMode::Write && self.frame.is_some()
    }

    fn current_page_id(&self) -> PageId {
        self.page_id
    }

    fn current_page_size(&self) -> Result<usize> {
        Ok(self.file.page_size())
    }

    fn next(&mut self) -> Result<bool> {
        let target = self.next_page_id;
        self.bind(target)
    }

    fn next_page(&mut self, page_id: PageId) -> Result<bool> {
        self.bind(page_id)
    }

    fn copy_to(
        &mut self,
        source_offset: i32,
        target: &mut dyn PageCursor,
        target_offset: i32,
        length: i32,
    ) -> Result<usize> {
        let page_len = self.page_len();
        copy_page_bytes(
            &self.page.as_slice()[..page_len],
            &mut self.state,
            source_offset,
            target,
            target_offset,
            length,
        )
    }

    fn close(&mut self) {
        self.release();
        self.closed = true;
    }
}

impl Drop for PagedFileCursor<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::SwapperConfig;
    use crate::common::Error;
    use crate::cursor::StandalonePageCursor;
    use crate::storage::fs::{EphemeralFileSystem, FileSystem};
    use crate::storage::SingleFilePageSwapper;
    use std::sync::Arc;

    const PAGE: usize = 32;

    fn paged_file() -> PagedFile {
        let fs: Arc<dyn FileSystem> = Arc::new(EphemeralFileSystem::new());
        let swapper = SingleFilePageSwapper::open(
            fs,
            "/test/cursor",
            PAGE,
            SwapperConfig::default().with_create(true),
        )
        .unwrap();
        PagedFile::new(Arc::new(swapper), 4).unwrap()
    }

    #[test]
    fn test_unbound_cursor_is_out_of_bounds() {
        let file = paged_file();
        let mut cursor = file.io(PageId::new(0), CursorMode::Write).unwrap();
        assert_eq!(cursor.current_page_id(), PageId::INVALID);
        assert_eq!(cursor.get_byte(), 0);
        assert!(cursor.check_and_clear_bounds_flag());
        assert!(!cursor.is_write_locked());
    }

    #[test]
    fn test_read_cursor_stops_at_end_of_file() {
        let file = paged_file();
        let mut reader = file.io(PageId::new(0), CursorMode::Read).unwrap();
        assert!(!reader.next().unwrap());

        let mut writer = file.io(PageId::new(0), CursorMode::Write).unwrap();
        assert!(writer.next().unwrap());
        assert!(writer.next().unwrap());
        assert_eq!(writer.current_page_id(), PageId::new(1));
        writer.close();

        let mut reader = file.io(PageId::new(0), CursorMode::Read).unwrap();
        assert!(reader.next().unwrap());
        assert!(reader.next().unwrap());
        assert!(!reader.next().unwrap());
    }

    #[test]
    fn test_read_cursor_rejects_puts() {
        let file = paged_file();
        {
            let mut writer = file.io(PageId::new(0), CursorMode::Write).unwrap();
            assert!(writer.next().unwrap());
            writer.put_int(5);
        }

        let mut reader = file.io(PageId::new(0), CursorMode::Read).unwrap();
        assert!(reader.next().unwrap());
        reader.put_int_at(0, 99);
        assert!(matches!(
            reader.check_and_clear_cursor_exception(),
            Err(Error::Cursor(_))
        ));
        assert_eq!(reader.get_int_at(0), 5);
    }

    #[test]
    fn test_should_retry_after_concurrent_publish() {
        let file = paged_file();
        {
            let mut writer = file.io(PageId::new(0), CursorMode::Write).unwrap();
            assert!(writer.next().unwrap());
            writer.put_long(1);
        }

        let mut reader = file.io(PageId::new(0), CursorMode::Read).unwrap();
        assert!(reader.next().unwrap());
        assert_eq!(reader.get_long(), 1);
        reader.get_long_at(PAGE as i32);

        {
            let mut writer = file.io(PageId::new(0), CursorMode::Write).unwrap();
            assert!(writer.next().unwrap());
            writer.put_long(2);
        }

        assert!(reader.should_retry().unwrap());
        assert_eq!(reader.offset(), 0);
        assert!(!reader.check_and_clear_bounds_flag());
        assert_eq!(reader.get_long(), 2);
        assert!(!reader.should_retry().unwrap());
    }

    #[test]
    fn test_copy_to_standalone() {
        let file = paged_file();
        let mut writer = file.io(PageId::new(0), CursorMode::Write).unwrap();
        assert!(writer.next().unwrap());
        writer.put_bytes(b"graph");

        let mut target = StandalonePageCursor::new(PageId::new(0), 8);
        assert_eq!(writer.copy_to(0, &mut target, 3, 5).unwrap(), 5);
        assert_eq!(&target.page().as_slice()[3..], b"graph");
    }

    #[test]
    fn test_next_page_jumps() {
        let file = paged_file();
        let mut writer = file.io(PageId::new(0), CursorMode::Write).unwrap();
        assert!(writer.next_page(PageId::new(5)).unwrap());
        assert_eq!(writer.current_page_id(), PageId::new(5));
        writer.close();
        assert_eq!(file.last_page_id(), Some(PageId::new(5)));
        assert_eq!(writer.current_page_id(), PageId::INVALID);
        assert!(!writer.next().unwrap());
    }
}
