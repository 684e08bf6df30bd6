//! Channels over real files.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::lock;
use super::{channel_closed_error, ChannelOptions, FileSystem, StoreChannel};

/// The file system of the host OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFileSystem;

impl DefaultFileSystem {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for DefaultFileSystem {
    fn open(&self, path: &Path, options: ChannelOptions) -> io::Result<Arc<dyn StoreChannel>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(options.create)
            .truncate(false)
            .open(path)?;
        Ok(Arc::new(FileChannel::new(file)))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }
}

/// A [`StoreChannel`] over one open [`File`].
///
/// Closing drops the file handle, which also releases any `flock` held
/// through it.
pub struct FileChannel {
    file: RwLock<Option<File>>,
    locked: AtomicBool,
}

impl FileChannel {
    pub fn new(file: File) -> Self {
        Self {
            file: RwLock::new(Some(file)),
            locked: AtomicBool::new(false),
        }
    }

    fn with_file<T>(&self, op: impl FnOnce(&File) -> io::Result<T>) -> io::Result<T> {
        let guard = self.file.read();
        match guard.as_ref() {
            Some(file) => op(file),
            None => Err(channel_closed_error()),
        }
    }
}

impl StoreChannel for FileChannel {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.with_file(|file| positioned::read_at(file, buf, offset))
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        self.with_file(|file| positioned::write_at(file, buf, offset))
    }

    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    fn read_vectored_at(&self, bufs: &mut [io::IoSliceMut<'_>], offset: u64) -> io::Result<usize> {
        self.with_file(|file| positioned::read_vectored_at(file, bufs, offset))
    }

    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    fn write_vectored_at(&self, bufs: &[io::IoSlice<'_>], offset: u64) -> io::Result<usize> {
        self.with_file(|file| positioned::write_vectored_at(file, bufs, offset))
    }

    fn sync(&self) -> io::Result<()> {
        self.with_file(File::sync_all)
    }

    fn len(&self) -> io::Result<u64> {
        self.with_file(|file| Ok(file.metadata()?.len()))
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        self.with_file(|file| file.set_len(len))
    }

    fn try_lock(&self) -> io::Result<bool> {
        let acquired = self.with_file(lock::try_lock_exclusive)?;
        if acquired {
            self.locked.store(true, Ordering::Release);
        }
        Ok(acquired)
    }

    fn unlock(&self) -> io::Result<()> {
        if self.locked.swap(false, Ordering::AcqRel) {
            self.with_file(lock::unlock)?;
        }
        Ok(())
    }

    fn close(&self) -> io::Result<()> {
        let file = self.file.write().take();
        self.locked.store(false, Ordering::Release);
        drop(file);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.file.read().is_some()
    }
}

#[cfg(unix)]
mod positioned {
    use std::fs::File;
    use std::io;
    use std::os::unix::fs::FileExt;

    pub fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        file.read_at(buf, offset)
    }

    pub fn write_at(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
        file.write_at(buf, offset)
    }

    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    pub use self::vectored::{read_vectored_at, write_vectored_at};

    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    mod vectored {
        use std::fs::File;
        use std::io::{self, IoSlice, IoSliceMut};
        use std::os::unix::io::AsRawFd;

        /// Iovec count accepted by one `preadv`/`pwritev` on every target here.
        const MAX_IOVECS: usize = 1024;

        fn file_offset(offset: u64) -> io::Result<libc::off_t> {
            libc::off_t::try_from(offset).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidInput, "file offset overflows off_t")
            })
        }

        fn transferred(res: libc::ssize_t) -> io::Result<usize> {
            if res < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(res as usize)
            }
        }

        /// Scatter-read with a single `preadv`. May transfer less than asked.
        pub fn read_vectored_at(
            file: &File,
            bufs: &mut [IoSliceMut<'_>],
            offset: u64,
        ) -> io::Result<usize> {
            let offset = file_offset(offset)?;
            let count = bufs.len().min(MAX_IOVECS) as libc::c_int;
            // IoSliceMut is ABI compatible with iovec on unix.
            let res = unsafe {
                libc::preadv(
                    file.as_raw_fd(),
                    bufs.as_ptr().cast::<libc::iovec>(),
                    count,
                    offset,
                )
            };
            transferred(res)
        }

        /// Gather-write with a single `pwritev`. May transfer less than asked.
        pub fn write_vectored_at(file: &File, bufs: &[IoSlice<'_>], offset: u64) -> io::Result<usize> {
            let offset = file_offset(offset)?;
            let count = bufs.len().min(MAX_IOVECS) as libc::c_int;
            let res = unsafe {
                libc::pwritev(
                    file.as_raw_fd(),
                    bufs.as_ptr().cast::<libc::iovec>(),
                    count,
                    offset,
                )
            };
            transferred(res)
        }
    }
}

#[cfg(windows)]
mod positioned {
    use std::fs::File;
    use std::io;
    use std::os::windows::fs::FileExt;

    pub fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        file.seek_read(buf, offset)
    }

    pub fn write_at(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
        file.seek_write(buf, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fs::is_channel_closed;
    use tempfile::tempdir;

    #[test]
    fn test_open_missing_without_create() {
        let dir = tempdir().unwrap();
        let fs = DefaultFileSystem::new();
        let err = match fs.open(&dir.path().join("missing"), ChannelOptions::default()) {
            Ok(_) => panic!("opening a missing file must fail"),
            Err(e) => e,
        };
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_positioned_read_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("channel");
        let fs = DefaultFileSystem::new();
        let channel = fs.open(&path, ChannelOptions::create(true)).unwrap();

        assert_eq!(channel.write_at(b"hello", 10).unwrap(), 5);
        assert_eq!(channel.len().unwrap(), 15);

        let mut buf = [0u8; 5];
        assert_eq!(channel.read_at(&mut buf, 10).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(fs.file_size(&path).unwrap(), 15);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_vectored_transfer_in_one_call() {
        use std::io::{IoSlice, IoSliceMut};

        let dir = tempdir().unwrap();
        let fs = DefaultFileSystem::new();
        let channel = fs
            .open(&dir.path().join("vectored"), ChannelOptions::create(true))
            .unwrap();

        let written = channel
            .write_vectored_at(&[IoSlice::new(b"node"), IoSlice::new(b"rels!")], 3)
            .unwrap();
        assert_eq!(written, 9);
        assert_eq!(channel.len().unwrap(), 12);

        let mut head = [0u8; 5];
        let mut tail = [0u8; 7];
        let read = channel
            .read_vectored_at(&mut [IoSliceMut::new(&mut head), IoSliceMut::new(&mut tail)], 1)
            .unwrap();
        assert_eq!(read, 11);
        assert_eq!(&head, b"\0\0nod");
        assert_eq!(&tail[..6], b"erels!");
    }

    #[test]
    fn test_closed_channel_rejects_io() {
        let dir = tempdir().unwrap();
        let fs = DefaultFileSystem::new();
        let channel = fs
            .open(&dir.path().join("closed"), ChannelOptions::create(true))
            .unwrap();

        channel.close().unwrap();
        channel.close().unwrap();
        assert!(!channel.is_open());

        let err = channel.write_at(b"x", 0).unwrap_err();
        assert!(is_channel_closed(&err));
    }

    #[cfg(unix)]
    #[test]
    fn test_lock_excludes_second_channel() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("locked");
        let fs = DefaultFileSystem::new();
        let a = fs.open(&path, ChannelOptions::create(true)).unwrap();
        let b = fs.open(&path, ChannelOptions::default()).unwrap();

        assert!(a.try_lock().unwrap());
        assert!(!b.try_lock().unwrap());

        a.close().unwrap();
        assert!(b.try_lock().unwrap());
    }

    #[test]
    fn test_delete() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone");
        let fs = DefaultFileSystem::new();
        fs.open(&path, ChannelOptions::create(true)).unwrap().close().unwrap();
        assert!(fs.exists(&path));
        fs.delete(&path).unwrap();
        assert!(!fs.exists(&path));
    }
}
