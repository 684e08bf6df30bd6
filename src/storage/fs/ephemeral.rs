//! In-memory file system.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::{channel_closed_error, ChannelOptions, FileSystem, StoreChannel};

/// A file system whose files live in memory.
///
/// Channels opened on the same path share contents and lock state, so it
/// behaves like the real one for everything the swapper relies on.
#[derive(Default)]
pub struct EphemeralFileSystem {
    files: Mutex<HashMap<PathBuf, Arc<EphemeralFile>>>,
    next_channel_id: AtomicU64,
}

#[derive(Default)]
struct EphemeralFile {
    data: RwLock<Vec<u8>>,
    /// Id of the channel holding the exclusive lock.
    lock_holder: Mutex<Option<u64>>,
}

impl EphemeralFileSystem {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FileSystem for EphemeralFileSystem {
    fn open(&self, path: &Path, options: ChannelOptions) -> io::Result<Arc<dyn StoreChannel>> {
        let file = {
            let mut files = self.files.lock();
            match files.get(path) {
                Some(file) => Arc::clone(file),
                None if options.create => {
                    let file = Arc::new(EphemeralFile::default());
                    files.insert(path.to_path_buf(), Arc::clone(&file));
                    file
                }
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("{} does not exist", path.display()),
                    ))
                }
            }
        };
        let id = self.next_channel_id.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(EphemeralChannel {
            file,
            id,
            open: AtomicBool::new(true),
        }))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path)
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        match self.files.lock().remove(path) {
            Some(_) => Ok(()),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )),
        }
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        match self.files.lock().get(path) {
            Some(file) => Ok(file.data.read().len() as u64),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )),
        }
    }
}

struct EphemeralChannel {
    file: Arc<EphemeralFile>,
    id: u64,
    open: AtomicBool,
}

impl EphemeralChannel {
    fn ensure_open(&self) -> io::Result<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(channel_closed_error())
        }
    }
}

impl StoreChannel for EphemeralChannel {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.ensure_open()?;
        let data = self.file.data.read();
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        self.ensure_open()?;
        let start = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset too large"))?;
        let end = start + buf.len();
        let mut data = self.file.data.write();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn sync(&self) -> io::Result<()> {
        self.ensure_open()
    }

    fn len(&self) -> io::Result<u64> {
        self.ensure_open()?;
        Ok(self.file.data.read().len() as u64)
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        self.ensure_open()?;
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length too large"))?;
        self.file.data.write().resize(len, 0);
        Ok(())
    }

    fn try_lock(&self) -> io::Result<bool> {
        self.ensure_open()?;
        let mut holder = self.file.lock_holder.lock();
        match *holder {
            Some(id) if id != self.id => Ok(false),
            _ => {
                *holder = Some(self.id);
                Ok(true)
            }
        }
    }

    fn unlock(&self) -> io::Result<()> {
        let mut holder = self.file.lock_holder.lock();
        if *holder == Some(self.id) {
            *holder = None;
        }
        Ok(())
    }

    fn close(&self) -> io::Result<()> {
        if self.open.swap(false, Ordering::AcqRel) {
            self.unlock()?;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}
