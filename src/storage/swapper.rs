//! Page swapper - maps one file onto page-sized units.
//!
//! A [`PageSwapper`] turns page ids into byte ranges of a single backing
//! file and moves whole pages between memory and that file. The
//! [`SingleFilePageSwapper`] implementation adds:
//! - an exclusive advisory lock held for the swapper's whole lifetime
//! - optional striping over several channels to the same file
//! - absorption of short transfers and transient faults
//! - transparent reopening of channels closed underneath it

use std::io::{self, IoSlice, IoSliceMut};
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::common::config::{EvictionCallback, SwapperConfig, MAX_IO_RETRIES};
use crate::common::{Error, PageId, Result};
use crate::storage::fs::{
    is_channel_closed, is_transient, ChannelOptions, FileSystem, StoreChannel,
};

/// The stripe whose channel carries the advisory file lock.
const LOCK_STRIPE: usize = 0;

/// Moves pages between memory and one backing file.
///
/// Page `p` occupies bytes `p * page_size .. (p + 1) * page_size`. All
/// methods take `&self`; implementations are shared between threads.
pub trait PageSwapper: Send + Sync {
    /// Size in bytes of every page of the file.
    fn page_size(&self) -> usize;

    /// Path of the backing file.
    fn path(&self) -> &Path;

    /// Read page `page_id` into `dst`.
    ///
    /// The part of the page lying beyond the end of the file is
    /// zero-filled. Returns the number of bytes placed in `dst`, which is
    /// always the full page size.
    ///
    /// # Errors
    /// - `Error::InvalidArgument` if `dst` is not exactly one page long
    /// - `Error::ClosedChannel` after [`PageSwapper::close`]
    fn read(&self, page_id: PageId, dst: &mut [u8]) -> Result<usize>;

    /// Write `src` as page `page_id`. Bytes outside the page are untouched.
    fn write(&self, page_id: PageId, src: &[u8]) -> Result<usize>;

    /// Read `dsts.len()` contiguous pages starting at `start`.
    ///
    /// Byte-identical to calling [`PageSwapper::read`] once per page.
    fn read_vectored(&self, start: PageId, dsts: &mut [&mut [u8]]) -> Result<usize>;

    /// Write `srcs.len()` contiguous pages starting at `start`.
    fn write_vectored(&self, start: PageId, srcs: &[&[u8]]) -> Result<usize>;

    /// Flush written pages to stable storage.
    fn force(&self) -> Result<()>;

    /// Truncate the file to zero length.
    fn truncate(&self) -> Result<()>;

    /// Id of the last page the file extends into, or `None` if it is empty.
    fn last_page_id(&self) -> Result<Option<PageId>>;

    /// Current length of the backing file.
    fn file_size(&self) -> Result<u64>;

    /// Notify the swapper that `page_id` left memory.
    fn evicted(&self, page_id: PageId);

    /// Release the lock and close every channel. Idempotent.
    fn close(&self) -> Result<()>;

    /// Close, then delete the backing file.
    fn close_and_delete(&self) -> Result<()>;
}

/// A [`PageSwapper`] over one file, opened through a [`FileSystem`].
///
/// # Lifecycle
/// ```text
///  open() ──lock acquired──▶ Locked-Open ──close()──▶ Closed
///    │                                                  ▲
///    └──────lock held elsewhere / I/O error─────────────┘
///           (channels opened so far are closed)
/// ```
///
/// # Thread Safety
/// - `channels`: one `RwLock` per stripe; I/O holds a clone of the channel
///   `Arc`, the write lock is only taken to swap in a reopened channel
/// - `closed`: `AtomicBool`, checked before every operation and again
///   before reopening a channel
pub struct SingleFilePageSwapper {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
    page_size: usize,
    channels: Vec<RwLock<Arc<dyn StoreChannel>>>,
    closed: AtomicBool,
    eviction_callback: Option<EvictionCallback>,
}

/// Closes every channel it still owns when dropped.
///
/// Used while a swapper is being opened so that every failure path
/// releases what was opened so far.
struct PendingChannels(Vec<Arc<dyn StoreChannel>>);

impl PendingChannels {
    fn into_inner(mut self) -> Vec<Arc<dyn StoreChannel>> {
        mem::take(&mut self.0)
    }
}

impl Drop for PendingChannels {
    fn drop(&mut self) {
        for channel in self.0.drain(..) {
            let _ = channel.unlock();
            let _ = channel.close();
        }
    }
}

impl SingleFilePageSwapper {
    /// Open `path` for paging with pages of `page_size` bytes.
    ///
    /// # Errors
    /// - `Error::Io` with `NotFound` if the file is missing and
    ///   `config.create` is false
    /// - `Error::FileLock` if another swapper holds the file's lock
    /// - `Error::InvalidArgument` if `page_size` is 0
    pub fn open(
        fs: Arc<dyn FileSystem>,
        path: impl AsRef<Path>,
        page_size: usize,
        config: SwapperConfig,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if page_size == 0 {
            return Err(Error::InvalidArgument("page size must be > 0".to_string()));
        }
        let stripes = config.channel_stripes.max(1);

        let mut pending = PendingChannels(Vec::with_capacity(stripes));
        for stripe in 0..stripes {
            let options = ChannelOptions::create(config.create && stripe == 0);
            pending.0.push(fs.open(&path, options)?);
        }

        if !pending.0[LOCK_STRIPE].try_lock()? {
            warn!(path = %path.display(), "swapper.open.lock_unavailable");
            return Err(Error::FileLock { path });
        }

        let channels = pending
            .into_inner()
            .into_iter()
            .map(RwLock::new)
            .collect();

        debug!(
            path = %path.display(),
            page_size,
            stripes,
            "swapper.open"
        );

        Ok(Self {
            fs,
            path,
            page_size,
            channels,
            closed: AtomicBool::new(false),
            eviction_callback: config.eviction_callback,
        })
    }

    /// Number of channels this swapper stripes I/O over.
    pub fn stripes(&self) -> usize {
        self.channels.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    // ========================================================================
    // Internal: channel management
    // ========================================================================

    fn stripe_of(&self, page_id: PageId) -> usize {
        (page_id.0 % self.channels.len() as u64) as usize
    }

    fn channel(&self, stripe: usize) -> Result<Arc<dyn StoreChannel>> {
        if self.is_closed() {
            return Err(Error::ClosedChannel);
        }
        Ok(Arc::clone(&self.channels[stripe].read()))
    }

    /// Replace a channel that was closed underneath us.
    ///
    /// If another thread already replaced `stale`, this is a no-op. The
    /// lock stripe takes the file lock again on its new channel.
    fn reopen(&self, stripe: usize, stale: &Arc<dyn StoreChannel>) -> Result<()> {
        let mut slot = self.channels[stripe].write();
        if self.is_closed() {
            return Err(Error::ClosedChannel);
        }
        if !Arc::ptr_eq(&*slot, stale) {
            return Ok(());
        }

        let channel = self.fs.open(&self.path, ChannelOptions::default())?;
        if stripe == LOCK_STRIPE && !channel.try_lock()? {
            let _ = channel.close();
            warn!(path = %self.path.display(), "swapper.reopen.lock_lost");
            return Err(Error::FileLock {
                path: self.path.clone(),
            });
        }
        let _ = stale.close();
        *slot = channel;

        debug!(path = %self.path.display(), stripe, "swapper.reopen");
        Ok(())
    }

    /// Decide what to do about a failed channel operation.
    ///
    /// Returns `Ok(())` if the operation should be retried.
    fn absorb(
        &self,
        stripe: usize,
        channel: &Arc<dyn StoreChannel>,
        err: io::Error,
        failures: &mut u32,
    ) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ClosedChannel);
        }
        *failures += 1;
        if *failures > MAX_IO_RETRIES {
            return Err(Error::Io(err));
        }
        if is_channel_closed(&err) {
            return self.reopen(stripe, channel);
        }
        if is_transient(&err) {
            trace!(path = %self.path.display(), stripe, error = %err, "swapper.io.retry");
            return Ok(());
        }
        Err(Error::Io(err))
    }

    /// Run a non-transferring channel operation with retry and reopen.
    fn with_retry<T>(
        &self,
        stripe: usize,
        mut op: impl FnMut(&dyn StoreChannel) -> io::Result<T>,
    ) -> Result<T> {
        let mut failures = 0;
        loop {
            let channel = self.channel(stripe)?;
            match op(channel.as_ref()) {
                Ok(value) => return Ok(value),
                Err(err) => self.absorb(stripe, &channel, err, &mut failures)?,
            }
        }
    }

    // ========================================================================
    // Internal: transfer loops
    // ========================================================================

    fn page_offset(&self, page_id: PageId) -> Result<u64> {
        page_id
            .file_offset(self.page_size)
            .ok_or(Error::InvalidPageId(page_id.0))
    }

    fn check_page_len(&self, len: usize) -> Result<()> {
        if len != self.page_size {
            return Err(Error::InvalidArgument(format!(
                "buffer of {} bytes does not match page size {}",
                len, self.page_size
            )));
        }
        Ok(())
    }

    /// Fill `dst` from `offset`, zero-filling whatever lies past EOF.
    fn read_fully(&self, stripe: usize, mut offset: u64, mut dst: &mut [u8]) -> Result<()> {
        let mut failures = 0;
        while !dst.is_empty() {
            let channel = self.channel(stripe)?;
            match channel.read_at(dst, offset) {
                Ok(0) => {
                    dst.fill(0);
                    break;
                }
                Ok(n) => {
                    dst = &mut mem::take(&mut dst)[n..];
                    offset += n as u64;
                    failures = 0;
                }
                Err(err) => self.absorb(stripe, &channel, err, &mut failures)?,
            }
        }
        Ok(())
    }

    fn write_fully(&self, stripe: usize, mut offset: u64, mut src: &[u8]) -> Result<()> {
        let mut failures = 0;
        while !src.is_empty() {
            let channel = self.channel(stripe)?;
            match channel.write_at(src, offset) {
                Ok(0) => {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "channel wrote zero bytes",
                    )))
                }
                Ok(n) => {
                    src = &src[n..];
                    offset += n as u64;
                    failures = 0;
                }
                Err(err) => self.absorb(stripe, &channel, err, &mut failures)?,
            }
        }
        Ok(())
    }

    /// Scatter-read whole pages; `done` counts bytes already in place.
    fn read_vectored_fully(
        &self,
        stripe: usize,
        offset: u64,
        dsts: &mut [&mut [u8]],
    ) -> Result<()> {
        let total = dsts.len() * self.page_size;
        let mut done = 0usize;
        let mut failures = 0;
        while done < total {
            let (page, within) = (done / self.page_size, done % self.page_size);
            let channel = self.channel(stripe)?;
            let result = {
                let (head, tail) = match dsts[page..].split_first_mut() {
                    Some(split) => split,
                    None => break,
                };
                let mut slices: Vec<IoSliceMut<'_>> = Vec::with_capacity(tail.len() + 1);
                slices.push(IoSliceMut::new(&mut head[within..]));
                slices.extend(tail.iter_mut().map(|buf| IoSliceMut::new(buf)));
                channel.read_vectored_at(&mut slices, offset + done as u64)
            };
            match result {
                Ok(0) => {
                    dsts[page][within..].fill(0);
                    for buf in dsts[page + 1..].iter_mut() {
                        buf.fill(0);
                    }
                    break;
                }
                Ok(n) => {
                    done += n;
                    failures = 0;
                }
                Err(err) => self.absorb(stripe, &channel, err, &mut failures)?,
            }
        }
        Ok(())
    }

    fn write_vectored_fully(&self, stripe: usize, offset: u64, srcs: &[&[u8]]) -> Result<()> {
        let total = srcs.len() * self.page_size;
        let mut done = 0usize;
        let mut failures = 0;
        while done < total {
            let (page, within) = (done / self.page_size, done % self.page_size);
            let channel = self.channel(stripe)?;
            let mut slices: Vec<IoSlice<'_>> = Vec::with_capacity(srcs.len() - page);
            slices.push(IoSlice::new(&srcs[page][within..]));
            slices.extend(srcs[page + 1..].iter().map(|buf| IoSlice::new(buf)));
            match channel.write_vectored_at(&slices, offset + done as u64) {
                Ok(0) => {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "channel wrote zero bytes",
                    )))
                }
                Ok(n) => {
                    done += n;
                    failures = 0;
                }
                Err(err) => self.absorb(stripe, &channel, err, &mut failures)?,
            }
        }
        Ok(())
    }
}

impl PageSwapper for SingleFilePageSwapper {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self, page_id: PageId, dst: &mut [u8]) -> Result<usize> {
        self.check_page_len(dst.len())?;
        let offset = self.page_offset(page_id)?;
        self.read_fully(self.stripe_of(page_id), offset, dst)?;
        Ok(dst.len())
    }

    fn write(&self, page_id: PageId, src: &[u8]) -> Result<usize> {
        self.check_page_len(src.len())?;
        let offset = self.page_offset(page_id)?;
        self.write_fully(self.stripe_of(page_id), offset, src)?;
        Ok(src.len())
    }

    fn read_vectored(&self, start: PageId, dsts: &mut [&mut [u8]]) -> Result<usize> {
        if self.is_closed() {
            return Err(Error::ClosedChannel);
        }
        if dsts.is_empty() {
            return Ok(0);
        }
        for dst in dsts.iter() {
            self.check_page_len(dst.len())?;
        }
        let offset = self.page_offset(start)?;
        self.read_vectored_fully(self.stripe_of(start), offset, dsts)?;
        Ok(dsts.len() * self.page_size)
    }

    fn write_vectored(&self, start: PageId, srcs: &[&[u8]]) -> Result<usize> {
        if self.is_closed() {
            return Err(Error::ClosedChannel);
        }
        if srcs.is_empty() {
            return Ok(0);
        }
        for src in srcs {
            self.check_page_len(src.len())?;
        }
        let offset = self.page_offset(start)?;
        self.write_vectored_fully(self.stripe_of(start), offset, srcs)?;
        Ok(srcs.len() * self.page_size)
    }

    fn force(&self) -> Result<()> {
        for stripe in 0..self.channels.len() {
            self.with_retry(stripe, |channel| channel.sync())?;
        }
        Ok(())
    }

    fn truncate(&self) -> Result<()> {
        self.with_retry(LOCK_STRIPE, |channel| channel.set_len(0))
    }

    fn last_page_id(&self) -> Result<Option<PageId>> {
        let len = self.file_size()?;
        if len == 0 {
            return Ok(None);
        }
        Ok(Some(PageId::new((len - 1) / self.page_size as u64)))
    }

    fn file_size(&self) -> Result<u64> {
        self.with_retry(LOCK_STRIPE, |channel| channel.len())
    }

    fn evicted(&self, page_id: PageId) {
        if self.is_closed() {
            return;
        }
        if let Some(callback) = &self.eviction_callback {
            callback(page_id);
        }
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut first_err = None;
        for (stripe, slot) in self.channels.iter().enumerate() {
            let channel = slot.write();
            if stripe == LOCK_STRIPE {
                if let Err(err) = channel.unlock() {
                    first_err.get_or_insert(err);
                }
            }
            if let Err(err) = channel.close() {
                first_err.get_or_insert(err);
            }
        }
        debug!(path = %self.path.display(), "swapper.close");
        match first_err {
            Some(err) => Err(Error::Io(err)),
            None => Ok(()),
        }
    }

    fn close_and_delete(&self) -> Result<()> {
        self.close()?;
        self.fs.delete(&self.path)?;
        debug!(path = %self.path.display(), "swapper.delete");
        Ok(())
    }
}

impl Drop for SingleFilePageSwapper {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fs::EphemeralFileSystem;

    const PAGE: usize = 32;

    fn open_ephemeral(fs: &Arc<EphemeralFileSystem>, stripes: usize) -> SingleFilePageSwapper {
        SingleFilePageSwapper::open(
            Arc::clone(fs) as Arc<dyn FileSystem>,
            "/store/nodes",
            PAGE,
            SwapperConfig::default()
                .with_create(true)
                .with_channel_stripes(stripes),
        )
        .unwrap()
    }

    #[test]
    fn test_write_then_read() {
        let fs = Arc::new(EphemeralFileSystem::new());
        let swapper = open_ephemeral(&fs, 1);

        let page: Vec<u8> = (0..PAGE as u8).collect();
        assert_eq!(swapper.write(PageId::new(2), &page).unwrap(), PAGE);

        let mut buf = vec![0u8; PAGE];
        assert_eq!(swapper.read(PageId::new(2), &mut buf).unwrap(), PAGE);
        assert_eq!(buf, page);
        assert_eq!(swapper.last_page_id().unwrap(), Some(PageId::new(2)));
    }

    #[test]
    fn test_read_past_eof_zero_fills() {
        let fs = Arc::new(EphemeralFileSystem::new());
        let swapper = open_ephemeral(&fs, 1);

        let mut buf = vec![0xFFu8; PAGE];
        assert_eq!(swapper.read(PageId::new(9), &mut buf).unwrap(), PAGE);
        assert!(buf.iter().all(|&b| b == 0));
        assert_eq!(swapper.last_page_id().unwrap(), None);
    }

    #[test]
    fn test_wrong_buffer_size_rejected() {
        let fs = Arc::new(EphemeralFileSystem::new());
        let swapper = open_ephemeral(&fs, 1);
        let mut small = [0u8; PAGE - 1];
        assert!(matches!(
            swapper.read(PageId::new(0), &mut small),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_page_offset_overflow() {
        let fs = Arc::new(EphemeralFileSystem::new());
        let swapper = open_ephemeral(&fs, 1);
        let page = [0u8; PAGE];
        assert!(matches!(
            swapper.write(PageId::new(u64::MAX - 1), &page),
            Err(Error::InvalidPageId(_))
        ));
    }

    #[test]
    fn test_striping_spreads_pages() {
        let fs = Arc::new(EphemeralFileSystem::new());
        let swapper = open_ephemeral(&fs, 4);
        assert_eq!(swapper.stripes(), 4);
        assert_eq!(swapper.stripe_of(PageId::new(0)), 0);
        assert_eq!(swapper.stripe_of(PageId::new(5)), 1);

        for id in 0..8u64 {
            swapper.write(PageId::new(id), &[id as u8; PAGE]).unwrap();
        }
        for id in 0..8u64 {
            let mut buf = [0u8; PAGE];
            swapper.read(PageId::new(id), &mut buf).unwrap();
            assert_eq!(buf, [id as u8; PAGE]);
        }
    }

    #[test]
    fn test_second_swapper_fails_to_lock() {
        let fs = Arc::new(EphemeralFileSystem::new());
        let _first = open_ephemeral(&fs, 1);

        let err = SingleFilePageSwapper::open(
            Arc::clone(&fs) as Arc<dyn FileSystem>,
            "/store/nodes",
            PAGE,
            SwapperConfig::default(),
        )
        .err()
        .unwrap();
        assert!(err.is_file_lock());
    }

    #[test]
    fn test_close_is_idempotent_and_final() {
        let fs = Arc::new(EphemeralFileSystem::new());
        let swapper = open_ephemeral(&fs, 2);

        swapper.close().unwrap();
        swapper.close().unwrap();
        assert!(swapper.is_closed());

        let mut buf = [0u8; PAGE];
        assert!(matches!(
            swapper.read(PageId::new(0), &mut buf),
            Err(Error::ClosedChannel)
        ));
        assert!(matches!(swapper.force(), Err(Error::ClosedChannel)));

        // Lock released: a new swapper can open the file.
        let _reopened = open_ephemeral(&fs, 1);
    }

    #[test]
    fn test_vectored_empty_is_noop() {
        let fs = Arc::new(EphemeralFileSystem::new());
        let swapper = open_ephemeral(&fs, 1);
        assert_eq!(swapper.write_vectored(PageId::new(0), &[]).unwrap(), 0);
        assert_eq!(swapper.read_vectored(PageId::new(0), &mut []).unwrap(), 0);
        assert_eq!(swapper.file_size().unwrap(), 0);
    }

    #[test]
    fn test_truncate() {
        let fs = Arc::new(EphemeralFileSystem::new());
        let swapper = open_ephemeral(&fs, 1);
        swapper.write(PageId::new(3), &[1u8; PAGE]).unwrap();
        assert_eq!(swapper.file_size().unwrap(), 4 * PAGE as u64);

        swapper.truncate().unwrap();
        assert_eq!(swapper.last_page_id().unwrap(), None);

        let mut buf = [9u8; PAGE];
        swapper.read(PageId::new(3), &mut buf).unwrap();
        assert_eq!(buf, [0u8; PAGE]);
    }
}
