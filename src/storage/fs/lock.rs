//! Advisory whole-file locks.
//!
//! `flock` locks belong to the open file description, so a second `open` of
//! the same path in the same process conflicts just like another process
//! would. `fcntl` record locks are per process and would not.

use std::fs::File;
use std::io;

/// Try to take an exclusive lock on `file` without blocking.
///
/// Returns `Ok(false)` if the lock is held through another open file
/// description.
#[cfg(unix)]
pub fn try_lock_exclusive(file: &File) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();
    loop {
        let res = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
        if res == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) => continue,
            Some(code) if code == libc::EWOULDBLOCK || code == libc::EAGAIN => return Ok(false),
            _ => return Err(err),
        }
    }
}

#[cfg(unix)]
pub fn unlock(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let res = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
    if res == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
pub fn try_lock_exclusive(_file: &File) -> io::Result<bool> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "advisory file locks are only implemented on unix",
    ))
}

#[cfg(not(unix))]
pub fn unlock(_file: &File) -> io::Result<()> {
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use tempfile::tempdir;

    fn open(path: &std::path::Path) -> File {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .unwrap()
    }

    #[test]
    fn test_second_description_cannot_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("locked");
        let a = open(&path);
        let b = open(&path);

        assert!(try_lock_exclusive(&a).unwrap());
        assert!(!try_lock_exclusive(&b).unwrap());

        unlock(&a).unwrap();
        assert!(try_lock_exclusive(&b).unwrap());
    }

    #[test]
    fn test_relock_same_description() {
        let dir = tempdir().unwrap();
        let a = open(&dir.path().join("relock"));
        assert!(try_lock_exclusive(&a).unwrap());
        assert!(try_lock_exclusive(&a).unwrap());
    }

    #[test]
    fn test_close_releases_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dropped");
        let a = open(&path);
        assert!(try_lock_exclusive(&a).unwrap());
        drop(a);

        let b = open(&path);
        assert!(try_lock_exclusive(&b).unwrap());
    }
}
