//! Frame - a slot in a paged file's pool.
//!
//! A [`Frame`] holds one [`PageBuffer`] plus the metadata the paged file
//! needs to manage it:
//! - Which page is loaded (if any)
//! - Pin count for reference counting
//! - Dirty flag for write-back tracking
//! - Version counter for optimistic reads
//! - Writer lock admitting one write cursor at a time

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::PageId;
use crate::storage::page::PageBuffer;

/// A frame in a paged file.
///
/// # Thread Safety
/// All fields use interior mutability for safe concurrent access:
/// - `page`: `RwLock`, held only while copying bytes in or out
/// - `page_id`: `Mutex` for safe updates
/// - `pin_count`: `AtomicU32` for lock-free reference counting
/// - `is_dirty`: `AtomicBool` for lock-free dirty tracking
/// - `version`: `AtomicU64`, bumped under the page write lock on every publish
/// - `writer`: `Mutex<()>` held by the write cursor bound to this frame
pub struct Frame {
    page: RwLock<PageBuffer>,
    page_id: Mutex<Option<PageId>>,
    pin_count: AtomicU32,
    is_dirty: AtomicBool,
    version: AtomicU64,
    writer: Mutex<()>,
}

impl Frame {
    /// Create a new empty frame holding a zeroed page of `page_size` bytes.
    pub fn new(page_size: usize) -> Self {
        Self {
            page: RwLock::new(PageBuffer::new(page_size)),
            page_id: Mutex::new(None),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            version: AtomicU64::new(0),
            writer: Mutex::new(()),
        }
    }

    // ========================================================================
    // Page access (RwLock)
    // ========================================================================

    #[inline]
    pub fn page(&self) -> RwLockReadGuard<'_, PageBuffer> {
        self.page.read()
    }

    #[inline]
    pub fn page_mut(&self) -> RwLockWriteGuard<'_, PageBuffer> {
        self.page.write()
    }

    /// Copy the page into `dst` and return the version it was copied at.
    pub fn snapshot_into(&self, dst: &mut PageBuffer) -> u64 {
        let page = self.page.read();
        dst.copy_from(&page);
        self.version.load(Ordering::Acquire)
    }

    /// Replace the page with `src`, bump the version and mark it dirty.
    pub fn publish(&self, src: &PageBuffer) {
        let mut page = self.page.write();
        page.copy_from(src);
        self.version.fetch_add(1, Ordering::AcqRel);
        self.is_dirty.store(true, Ordering::Release);
    }

    #[inline]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Take the single-writer lock, blocking while another write cursor
    /// holds it.
    #[inline]
    pub fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock()
    }

    // ========================================================================
    // Page ID management (Mutex for interior mutability)
    // ========================================================================

    #[inline]
    pub fn page_id(&self) -> Option<PageId> {
        *self.page_id.lock()
    }

    #[inline]
    pub fn set_page_id(&self, page_id: Option<PageId>) {
        *self.page_id.lock() = page_id;
    }

    // ========================================================================
    // Pin count operations (Atomic)
    // ========================================================================

    /// Increment the pin count. Returns the new pin count.
    #[inline]
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrement the pin count. Returns the new pin count.
    ///
    /// # Panics
    /// Panics if pin count is already 0.
    #[inline]
    pub fn unpin(&self) -> u32 {
        let old = self.pin_count.fetch_sub(1, Ordering::AcqRel);
        assert!(old > 0, "pin count underflow");
        old - 1
    }

    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    // ========================================================================
    // Dirty flag operations (Atomic)
    // ========================================================================

    #[inline]
    pub fn mark_dirty(&self) {
        self.is_dirty.store(true, Ordering::Release);
    }

    #[inline]
    pub fn clear_dirty(&self) {
        self.is_dirty.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    // ========================================================================
    // Frame state queries
    // ========================================================================

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.page_id().is_none()
    }

    /// Reset the frame to empty state.
    ///
    /// Called after eviction to prepare for reuse. The version keeps
    /// counting so a reader of the evicted page can never mistake the new
    /// contents for the ones it copied.
    pub fn reset(&self) {
        self.page_mut().reset();
        self.version.fetch_add(1, Ordering::AcqRel);
        self.set_page_id(None);
        self.is_dirty.store(false, Ordering::Release);
    }
}
