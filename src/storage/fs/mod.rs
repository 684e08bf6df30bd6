//! File-system abstraction the page swapper is written against.
//!
//! The swapper never touches `std::fs` directly. It opens
//! [`StoreChannel`]s through a [`FileSystem`], which lets tests substitute
//! an in-memory ([`EphemeralFileSystem`]) or fault-injecting
//! ([`AdversarialFileSystem`]) implementation.
//!
//! # Components
//! - [`StoreChannel`] - positioned read/write/lock/close on one open file
//! - [`FileSystem`] - opens channels, deletes and inspects files
//! - [`DefaultFileSystem`] - real files, BSD `flock` advisory locks
//! - [`EphemeralFileSystem`] - in-memory files shared by path
//! - [`AdversarialFileSystem`] / [`RandomAdversary`] - random short
//!   transfers and transient failures

mod adversarial;
mod default;
mod ephemeral;
mod lock;

use std::fmt;
use std::io::{self, IoSlice, IoSliceMut};
use std::path::Path;
use std::sync::Arc;

pub use adversarial::{AdversarialFileSystem, RandomAdversary};
pub use default::{DefaultFileSystem, FileChannel};
pub use ephemeral::EphemeralFileSystem;

/// How a channel should be opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelOptions {
    /// Create the file if it does not exist.
    pub create: bool,
}

impl ChannelOptions {
    pub fn create(create: bool) -> Self {
        Self { create }
    }
}

/// One open handle on a file, supporting positioned I/O.
///
/// Reads and writes may transfer fewer bytes than requested; callers loop.
/// A read returning `Ok(0)` for a non-empty buffer means end of file.
///
/// Once a channel is closed every I/O method fails with an error for which
/// [`is_channel_closed`] returns true. A channel can be closed by its owner
/// or asynchronously by someone else holding the same `Arc`.
pub trait StoreChannel: Send + Sync {
    /// Read into `buf` starting at byte `offset`.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Write `buf` starting at byte `offset`.
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize>;

    /// Scatter-read into `bufs` starting at `offset`.
    ///
    /// The default reads into the first non-empty buffer only, like
    /// [`std::io::Read::read_vectored`].
    fn read_vectored_at(&self, bufs: &mut [IoSliceMut<'_>], offset: u64) -> io::Result<usize> {
        match bufs.iter_mut().find(|b| !b.is_empty()) {
            Some(buf) => self.read_at(buf, offset),
            None => Ok(0),
        }
    }

    /// Gather-write `bufs` starting at `offset`.
    ///
    /// The default writes the first non-empty buffer only.
    fn write_vectored_at(&self, bufs: &[IoSlice<'_>], offset: u64) -> io::Result<usize> {
        match bufs.iter().find(|b| !b.is_empty()) {
            Some(buf) => self.write_at(buf, offset),
            None => Ok(0),
        }
    }

    /// Flush file data and metadata to stable storage.
    fn sync(&self) -> io::Result<()>;

    /// Current length of the file in bytes.
    fn len(&self) -> io::Result<u64>;

    fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Truncate or extend the file.
    fn set_len(&self, len: u64) -> io::Result<()>;

    /// Try to take an exclusive advisory lock on the file without blocking.
    ///
    /// Returns `Ok(false)` if another channel (in this or another process)
    /// holds it.
    fn try_lock(&self) -> io::Result<bool>;

    /// Release the lock taken by [`StoreChannel::try_lock`], if any.
    fn unlock(&self) -> io::Result<()>;

    /// Close the channel. Idempotent. Releases any lock it holds.
    fn close(&self) -> io::Result<()>;

    fn is_open(&self) -> bool;
}

/// Source of [`StoreChannel`]s.
pub trait FileSystem: Send + Sync {
    /// Open a new, independent channel on `path`.
    ///
    /// Without [`ChannelOptions::create`], a missing file is an
    /// `ErrorKind::NotFound` error.
    fn open(&self, path: &Path, options: ChannelOptions) -> io::Result<Arc<dyn StoreChannel>>;

    fn exists(&self, path: &Path) -> bool;

    fn delete(&self, path: &Path) -> io::Result<()>;

    fn file_size(&self, path: &Path) -> io::Result<u64>;
}

/// Marker payload for errors raised by closed channels.
#[derive(Debug)]
struct ChannelClosed;

impl fmt::Display for ChannelClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel is closed")
    }
}

impl std::error::Error for ChannelClosed {}

/// The error every I/O method of a closed channel returns.
pub fn channel_closed_error() -> io::Error {
    io::Error::other(ChannelClosed)
}

/// True if `err` came from I/O on a closed channel.
pub fn is_channel_closed(err: &io::Error) -> bool {
    err.get_ref()
        .is_some_and(|inner| inner.is::<ChannelClosed>())
}

/// True for errors worth retrying without any other corrective action.
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
