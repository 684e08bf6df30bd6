//! Paged file - a pool of page frames over one swapper.
//!
//! The [`PagedFile`] provides:
//! - Page caching between the swapper's file and memory
//! - Pin-based reference counting for bound cursors
//! - Write-back of dirty pages on eviction and flush
//! - Per-frame versions backing the optimistic read protocol

use std::collections::HashMap;
use std::sync::atomic::{fence, AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use crate::buffer::replacer::FifoReplacer;
use crate::buffer::{Frame, PagedFileCursor, PagedFileStats};
use crate::common::{Error, FrameId, PageId, Result};
use crate::storage::PageSwapper;

/// What a cursor is allowed to do with the pages it binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMode {
    /// Optimistic, lock-free reads validated by `should_retry`.
    Read,
    /// Exclusive writes; one write cursor per page at a time.
    Write,
}

/// Caches pages of one file in a fixed pool of frames.
///
/// # Architecture
/// ```text
/// ┌─────────────────────────────────────────────────────────────┐
/// │                         PagedFile                           │
/// │  ┌──────────────┐  ┌───────────────────────────────────┐   │
/// │  │ page_table   │  │        frames: Vec<Frame>         │   │
/// │  │PageId → Fid  │─▶│  [Frame0] [Frame1] [Frame2] ...   │   │
/// │  └──────────────┘  └───────────────────────────────────┘   │
/// │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐      │
/// │  │  free_list   │  │   replacer   │  │   swapper    │      │
/// │  │ Vec<FrameId> │  │ FifoReplacer │  │ PageSwapper  │      │
/// │  └──────────────┘  └──────────────┘  └──────────────┘      │
/// └─────────────────────────────────────────────────────────────┘
/// ```
///
/// # Thread Safety
/// - `page_table`: `RwLock`, hits pin under the read lock so eviction
///   (which removes under the write lock) never takes a frame being pinned
/// - `load_lock`: `Mutex` serializing page faults, the evictions they cause
///   and flushes
/// - `free_list`, `replacer`: `Mutex`
/// - `frames`: no lock, each Frame has internal locks
/// - `stats`: no lock, all atomic counters
///
/// # Usage
/// ```
/// use std::sync::Arc;
/// use graphpage::buffer::{CursorMode, PagedFile};
/// use graphpage::common::config::SwapperConfig;
/// use graphpage::cursor::PageCursor;
/// use graphpage::storage::fs::{EphemeralFileSystem, FileSystem};
/// use graphpage::storage::SingleFilePageSwapper;
/// use graphpage::PageId;
///
/// let fs: Arc<dyn FileSystem> = Arc::new(EphemeralFileSystem::new());
/// let swapper = SingleFilePageSwapper::open(
///     fs, "/store/nodes", 64, SwapperConfig::default().with_create(true),
/// )?;
/// let file = PagedFile::new(Arc::new(swapper), 4)?;
///
/// let mut writer = file.io(PageId::new(0), CursorMode::Write)?;
/// assert!(writer.next()?);
/// writer.put_long(42);
/// writer.close();
///
/// let mut reader = file.io(PageId::new(0), CursorMode::Read)?;
/// assert!(reader.next()?);
/// let value = loop {
///     let value = reader.get_long();
///     if !reader.should_retry()? {
///         break value;
///     }
/// };
/// assert_eq!(value, 42);
/// # Ok::<(), graphpage::Error>(())
/// ```
pub struct PagedFile {
    swapper: Arc<dyn PageSwapper>,
    page_size: usize,
    frames: Vec<Frame>,
    page_table: RwLock<HashMap<PageId, FrameId>>,
    free_list: Mutex<Vec<FrameId>>,
    replacer: Mutex<FifoReplacer>,
    load_lock: Mutex<()>,
    last_page_id: Mutex<Option<PageId>>,
    stats: PagedFileStats,
    closed: AtomicBool,
}

impl PagedFile {
    /// Create a paged file with `pool_size` frames over `swapper`.
    ///
    /// # Errors
    /// - `Error::InvalidArgument` if `pool_size` is 0
    /// - I/O errors from reading the file size
    pub fn new(swapper: Arc<dyn PageSwapper>, pool_size: usize) -> Result<Self> {
        if pool_size == 0 {
            return Err(Error::InvalidArgument("pool_size must be > 0".to_string()));
        }
        let page_size = swapper.page_size();
        let last_page_id = swapper.last_page_id()?;

        let frames: Vec<Frame> = (0..pool_size).map(|_| Frame::new(page_size)).collect();
        let free_list: Vec<FrameId> = (0..pool_size).rev().map(FrameId::new).collect();

        debug!(
            path = %swapper.path().display(),
            page_size,
            pool_size,
            "paged_file.open"
        );

        Ok(Self {
            swapper,
            page_size,
            frames,
            page_table: RwLock::new(HashMap::new()),
            free_list: Mutex::new(free_list),
            replacer: Mutex::new(FifoReplacer::new()),
            load_lock: Mutex::new(()),
            last_page_id: Mutex::new(last_page_id),
            stats: PagedFileStats::new(),
            closed: AtomicBool::new(false),
        })
    }

    // ========================================================================
    // Public API: cursors
    // ========================================================================

    /// Create a cursor that binds `page_id` on its first
    /// [`next`](crate::cursor::PageCursor::next) and the following pages
    /// after that.
    ///
    /// # Errors
    /// - `Error::ClosedChannel` if the paged file has been closed
    pub fn io(&self, page_id: PageId, mode: CursorMode) -> Result<PagedFileCursor<'_>> {
        if self.is_closed() {
            return Err(Error::ClosedChannel);
        }
        Ok(PagedFileCursor::new(self, page_id, mode))
    }

    // ========================================================================
    // Public API: flushing and lifecycle
    // ========================================================================

    /// Write every dirty page back and force the file.
    pub fn flush_and_force(&self) -> Result<()> {
        // Frames change pages only under `load_lock`, so the snapshot stays
        // valid until every frame is flushed.
        let _loading = self.load_lock.lock();
        let pages: Vec<(PageId, FrameId)> = {
            let pt = self.page_table.read();
            pt.iter().map(|(&pid, &fid)| (pid, fid)).collect()
        };

        for (page_id, frame_id) in pages {
            self.flush_frame(frame_id, page_id)?;
        }
        self.swapper.force()
    }

    /// Flush, force and close the swapper. Idempotent.
    ///
    /// # Errors
    /// - `Error::FileInUse` if a cursor still has a page bound; the file
    ///   stays open
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // Pairs with the fence in `pin`: either the pinning thread sees the
        // file closed, or this thread sees its pin.
        fence(Ordering::SeqCst);
        let pinned = self.frames.iter().filter(|f| f.is_pinned()).count();
        if pinned > 0 {
            self.closed.store(false, Ordering::SeqCst);
            warn!(path = %self.swapper.path().display(), pinned, "paged_file.close.in_use");
            return Err(Error::FileInUse { pinned });
        }

        let flushed = self.flush_and_force();
        let closed = self.swapper.close();
        debug!(path = %self.swapper.path().display(), "paged_file.close");
        flushed.and(closed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Public API: stats and info
    // ========================================================================

    /// Id of the last page of the file, counting pages grown by write
    /// cursors but not yet flushed.
    pub fn last_page_id(&self) -> Option<PageId> {
        *self.last_page_id.lock()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn pool_size(&self) -> usize {
        self.frames.len()
    }

    pub fn stats(&self) -> &PagedFileStats {
        &self.stats
    }

    pub fn swapper(&self) -> &Arc<dyn PageSwapper> {
        &self.swapper
    }

    /// Number of pages currently held in frames.
    pub fn cached_pages(&self) -> usize {
        self.page_table.read().len()
    }

    // ========================================================================
    // Internal: called by PagedFileCursor
    // ========================================================================

    pub(crate) fn frame(&self, frame_id: FrameId) -> &Frame {
        &self.frames[frame_id.0]
    }

    /// Record that a write cursor bound `page_id`, growing the file.
    pub(crate) fn grow_to(&self, page_id: PageId) {
        let mut last = self.last_page_id.lock();
        if !matches!(*last, Some(last) if last >= page_id) {
            *last = Some(page_id);
        }
    }

    /// Pin the frame holding `page_id`, faulting it in if needed.
    pub(crate) fn pin(&self, page_id: PageId) -> Result<FrameId> {
        if self.is_closed() {
            return Err(Error::ClosedChannel);
        }
        let frame_id = self.pin_or_fault(page_id)?;

        // A close that raced with this pin may already have flushed.
        fence(Ordering::SeqCst);
        if self.is_closed() {
            self.unpin(frame_id);
            return Err(Error::ClosedChannel);
        }
        Ok(frame_id)
    }

    fn pin_or_fault(&self, page_id: PageId) -> Result<FrameId> {
        if let Some(frame_id) = self.pin_cached(page_id) {
            PagedFileStats::record(&self.stats.hits);
            return Ok(frame_id);
        }

        let _loading = self.load_lock.lock();
        // Another thread may have faulted it in while we waited.
        if let Some(frame_id) = self.pin_cached(page_id) {
            PagedFileStats::record(&self.stats.hits);
            return Ok(frame_id);
        }
        self.fault(page_id)
    }

    /// Release a pin taken by [`PagedFile::pin`].
    pub(crate) fn unpin(&self, frame_id: FrameId) {
        let frame = &self.frames[frame_id.0];
        if frame.unpin() == 0 {
            let mut replacer = self.replacer.lock();
            replacer.record_access(frame_id);
            replacer.set_evictable(frame_id, true);
        }
    }

    // ========================================================================
    // Internal: fault and eviction
    // ========================================================================

    fn pin_cached(&self, page_id: PageId) -> Option<FrameId> {
        let pt = self.page_table.read();
        let frame_id = *pt.get(&page_id)?;
        self.frames[frame_id.0].pin();

        let mut replacer = self.replacer.lock();
        replacer.record_access(frame_id);
        replacer.set_evictable(frame_id, false);
        Some(frame_id)
    }

    /// Load `page_id` into a free frame. Caller holds `load_lock`.
    fn fault(&self, page_id: PageId) -> Result<FrameId> {
        let frame_id = self.get_free_frame()?;
        let frame = &self.frames[frame_id.0];

        let loaded = {
            let mut page = frame.page_mut();
            self.swapper.read(page_id, page.as_mut_slice())
        };
        if let Err(err) = loaded {
            self.free_list.lock().push(frame_id);
            return Err(err);
        }
        PagedFileStats::record(&self.stats.faults);
        trace!(page = page_id.0, frame = frame_id.0, "paged_file.fault");

        frame.set_page_id(Some(page_id));
        frame.pin();

        let mut pt = self.page_table.write();
        pt.insert(page_id, frame_id);
        let mut replacer = self.replacer.lock();
        replacer.record_access(frame_id);
        replacer.set_evictable(frame_id, false);

        Ok(frame_id)
    }

    fn get_free_frame(&self) -> Result<FrameId> {
        if let Some(frame_id) = self.free_list.lock().pop() {
            return Ok(frame_id);
        }
        self.evict_page()
    }

    /// Evict an unpinned page and return its frame. Caller holds `load_lock`.
    fn evict_page(&self) -> Result<FrameId> {
        loop {
            let frame_id = self.replacer.lock().evict().ok_or(Error::NoFreeFrames)?;
            let frame = &self.frames[frame_id.0];

            let page_id = {
                let mut pt = self.page_table.write();
                if frame.is_pinned() {
                    // Pinned by a hit after the replacer picked it.
                    let mut replacer = self.replacer.lock();
                    replacer.record_access(frame_id);
                    replacer.set_evictable(frame_id, false);
                    continue;
                }
                let page_id = frame.page_id();
                if let Some(pid) = page_id {
                    pt.remove(&pid);
                }
                page_id
            };

            if let Some(pid) = page_id {
                if let Err(err) = self.flush_frame(frame_id, pid) {
                    self.page_table.write().insert(pid, frame_id);
                    let mut replacer = self.replacer.lock();
                    replacer.record_access(frame_id);
                    replacer.set_evictable(frame_id, true);
                    return Err(err);
                }
                self.swapper.evicted(pid);
                trace!(page = pid.0, frame = frame_id.0, "paged_file.evict");
            }
            PagedFileStats::record(&self.stats.evictions);

            frame.reset();
            return Ok(frame_id);
        }
    }

    /// Write the frame back as `page_id`. Caller holds `load_lock`.
    fn flush_frame(&self, frame_id: FrameId, page_id: PageId) -> Result<()> {
        let frame = &self.frames[frame_id.0];
        // Hold the page read lock while writing so no publish slips in
        // between the write and clearing the dirty flag.
        let page = frame.page();
        if !frame.is_dirty() || frame.page_id() != Some(page_id) {
            return Ok(());
        }
        self.swapper.write(page_id, page.as_slice())?;
        frame.clear_dirty();
        drop(page);

        PagedFileStats::record(&self.stats.flushes);
        Ok(())
    }
}

impl Drop for PagedFile {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
