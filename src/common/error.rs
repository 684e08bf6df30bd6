//! Error types for graphpage.

use std::path::PathBuf;

use thiserror::Error;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
/// This is a common Rust pattern (see `std::io::Result`).
pub type Result<T> = std::result::Result<T, Error>;

/// All errors raised by the paging core.
///
/// Out-of-bounds cursor accesses are not errors: they are recorded
/// in the cursor's sticky bounds flag and never surface as an `Error`.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying file or channel.
    ///
    /// Raised only after the swapper's own retry loop gave up.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A deferred cursor exception, surfaced by
    /// [`PageCursor::check_and_clear_cursor_exception`](crate::cursor::PageCursor::check_and_clear_cursor_exception).
    #[error("cursor exception: {0}")]
    Cursor(String),

    /// Another swapper, in this process or another one, holds the file lock.
    #[error("file is already locked by another page swapper: {}", path.display())]
    FileLock { path: PathBuf },

    /// I/O attempted on a swapper (or channel) that has been closed.
    #[error("channel has been closed")]
    ClosedChannel,

    /// The operation is not meaningful for this kind of cursor.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// A caller-supplied argument is invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The page id cannot be mapped to a file position.
    #[error("invalid page id: {0}")]
    InvalidPageId(u64),

    /// The paged file has no free frames and cannot evict any page.
    ///
    /// This happens when every frame is pinned by an open cursor.
    #[error("no free frames available in paged file")]
    NoFreeFrames,

    /// The paged file cannot be closed while cursors have pages bound.
    #[error("paged file is still in use: {pinned} page(s) bound by open cursors")]
    FileInUse { pinned: usize },
}

impl Error {
    /// True if this error is the distinct lock fault raised when a second
    /// swapper tries to open an already-locked file.
    pub fn is_file_lock(&self) -> bool {
        matches!(self, Error::FileLock { .. })
    }
}
