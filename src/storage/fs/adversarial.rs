//! Fault injection for file systems.
//!
//! An [`AdversarialFileSystem`] wraps another [`FileSystem`] and consults a
//! [`RandomAdversary`] before every channel operation. The adversary may:
//! - let the operation through untouched
//! - commit mischief: transfer only a random non-empty prefix
//! - fail with a transient `Interrupted` error, possibly after scribbling
//!   over the read buffer or writing part of the data

use std::io::{self, IoSlice, IoSliceMut};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{ChannelOptions, FileSystem, StoreChannel};

/// What the adversary decided to do to one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Pass,
    Mischief,
    Fail,
}

/// Randomly decides which operations misbehave.
///
/// # Example
/// ```
/// use graphpage::storage::fs::RandomAdversary;
///
/// let adversary = RandomAdversary::new(0.5, 0.1).with_seed(42);
/// adversary.set_enabled(false);
/// assert!(!adversary.is_enabled());
/// ```
pub struct RandomAdversary {
    mischief_rate: f64,
    failure_rate: f64,
    enabled: AtomicBool,
    rng: Mutex<StdRng>,
    injected: AtomicU64,
}

impl RandomAdversary {
    /// Create an adversary that commits mischief with probability
    /// `mischief_rate` and fails with probability `failure_rate`.
    pub fn new(mischief_rate: f64, failure_rate: f64) -> Self {
        Self {
            mischief_rate: mischief_rate.clamp(0.0, 1.0),
            failure_rate: failure_rate.clamp(0.0, 1.0),
            enabled: AtomicBool::new(true),
            rng: Mutex::new(StdRng::from_entropy()),
            injected: AtomicU64::new(0),
        }
    }

    /// Use a fixed seed so a failing run can be replayed.
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock() = StdRng::seed_from_u64(seed);
        self
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Number of operations the adversary has interfered with so far.
    pub fn injected(&self) -> u64 {
        self.injected.load(Ordering::Relaxed)
    }

    fn verdict(&self) -> Verdict {
        if !self.is_enabled() {
            return Verdict::Pass;
        }
        let roll: f64 = self.rng.lock().gen();
        let verdict = if roll < self.failure_rate {
            Verdict::Fail
        } else if roll < self.failure_rate + self.mischief_rate {
            Verdict::Mischief
        } else {
            Verdict::Pass
        };
        if verdict != Verdict::Pass {
            self.injected.fetch_add(1, Ordering::Relaxed);
        }
        verdict
    }

    /// A random length in `1..=len`, or `len` if it is 0.
    fn short_len(&self, len: usize) -> usize {
        if len <= 1 {
            len
        } else {
            self.rng.lock().gen_range(1..=len)
        }
    }

    fn scribble(&self, buf: &mut [u8]) {
        self.rng.lock().fill(buf);
    }

    fn failure() -> io::Error {
        io::Error::new(io::ErrorKind::Interrupted, "injected failure")
    }
}

/// A [`FileSystem`] whose channels are sabotaged by a [`RandomAdversary`].
pub struct AdversarialFileSystem {
    inner: Arc<dyn FileSystem>,
    adversary: Arc<RandomAdversary>,
}

impl AdversarialFileSystem {
    pub fn new(inner: Arc<dyn FileSystem>, adversary: Arc<RandomAdversary>) -> Self {
        Self { inner, adversary }
    }

    pub fn adversary(&self) -> &Arc<RandomAdversary> {
        &self.adversary
    }
}

impl FileSystem for AdversarialFileSystem {
    fn open(&self, path: &Path, options: ChannelOptions) -> io::Result<Arc<dyn StoreChannel>> {
        let inner = self.inner.open(path, options)?;
        Ok(Arc::new(AdversarialChannel {
            inner,
            adversary: Arc::clone(&self.adversary),
        }))
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        self.inner.delete(path)
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        self.inner.file_size(path)
    }
}

struct AdversarialChannel {
    inner: Arc<dyn StoreChannel>,
    adversary: Arc<RandomAdversary>,
}

impl StoreChannel for AdversarialChannel {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        match self.adversary.verdict() {
            Verdict::Pass => self.inner.read_at(buf, offset),
            Verdict::Mischief => {
                let len = self.adversary.short_len(buf.len());
                self.inner.read_at(&mut buf[..len], offset)
            }
            Verdict::Fail => {
                self.adversary.scribble(buf);
                Err(RandomAdversary::failure())
            }
        }
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        match self.adversary.verdict() {
            Verdict::Pass => self.inner.write_at(buf, offset),
            Verdict::Mischief => {
                let len = self.adversary.short_len(buf.len());
                self.inner.write_at(&buf[..len], offset)
            }
            Verdict::Fail => {
                let len = self.adversary.short_len(buf.len());
                // A torn write: some prefix may land before the failure.
                self.inner.write_at(&buf[..len / 2], offset)?;
                Err(RandomAdversary::failure())
            }
        }
    }

    fn read_vectored_at(&self, bufs: &mut [IoSliceMut<'_>], offset: u64) -> io::Result<usize> {
        match self.adversary.verdict() {
            Verdict::Pass => self.inner.read_vectored_at(bufs, offset),
            Verdict::Mischief => match bufs.iter_mut().find(|b| !b.is_empty()) {
                Some(buf) => {
                    let len = self.adversary.short_len(buf.len());
                    self.inner.read_at(&mut buf[..len], offset)
                }
                None => Ok(0),
            },
            Verdict::Fail => {
                if let Some(buf) = bufs.iter_mut().find(|b| !b.is_empty()) {
                    self.adversary.scribble(buf);
                }
                Err(RandomAdversary::failure())
            }
        }
    }

    fn write_vectored_at(&self, bufs: &[IoSlice<'_>], offset: u64) -> io::Result<usize> {
        match self.adversary.verdict() {
            Verdict::Pass => self.inner.write_vectored_at(bufs, offset),
            Verdict::Mischief => match bufs.iter().find(|b| !b.is_empty()) {
                Some(buf) => {
                    let len = self.adversary.short_len(buf.len());
                    self.inner.write_at(&buf[..len], offset)
                }
                None => Ok(0),
            },
            Verdict::Fail => Err(RandomAdversary::failure()),
        }
    }

    fn sync(&self) -> io::Result<()> {
        match self.adversary.verdict() {
            Verdict::Fail => Err(RandomAdversary::failure()),
            _ => self.inner.sync(),
        }
    }

    fn len(&self) -> io::Result<u64> {
        self.inner.len()
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        match self.adversary.verdict() {
            Verdict::Fail => Err(RandomAdversary::failure()),
            _ => self.inner.set_len(len),
        }
    }

    fn try_lock(&self) -> io::Result<bool> {
        self.inner.try_lock()
    }

    fn unlock(&self) -> io::Result<()> {
        self.inner.unlock()
    }

    fn close(&self) -> io::Result<()> {
        self.inner.close()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fs::EphemeralFileSystem;

    fn adversarial(mischief: f64, failure: f64) -> AdversarialFileSystem {
        AdversarialFileSystem::new(
            Arc::new(EphemeralFileSystem::new()),
            Arc::new(RandomAdversary::new(mischief, failure).with_seed(7)),
        )
    }

    #[test]
    fn test_disabled_adversary_passes_everything() {
        let fs = adversarial(1.0, 0.0);
        fs.adversary().set_enabled(false);
        let channel = fs.open(Path::new("/adv/a"), ChannelOptions::create(true)).unwrap();

        for _ in 0..100 {
            assert_eq!(channel.write_at(&[7u8; 64], 0).unwrap(), 64);
        }
        assert_eq!(fs.adversary().injected(), 0);
    }

    #[test]
    fn test_mischief_transfers_non_empty_prefix() {
        let fs = adversarial(1.0, 0.0);
        let channel = fs.open(Path::new("/adv/b"), ChannelOptions::create(true)).unwrap();

        for _ in 0..100 {
            let n = channel.write_at(&[1u8; 32], 0).unwrap();
            assert!((1..=32).contains(&n));
        }
        assert_eq!(fs.adversary().injected(), 100);
    }

    #[test]
    fn test_failures_are_interrupted() {
        let fs = adversarial(0.0, 1.0);
        let channel = fs.open(Path::new("/adv/c"), ChannelOptions::create(true)).unwrap();

        let err = channel.write_at(&[1u8; 8], 0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
        let mut buf = [0u8; 8];
        let err = channel.read_at(&mut buf, 0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
    }
}
