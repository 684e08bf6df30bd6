//! Paged file management.
//!
//! A paged file is the in-memory cache layer between page cursors and a
//! page swapper. It manages a fixed pool of frames, each holding one page.
//!
//! # Components
//! - [`PagedFile`] - the page cache for one file
//! - [`PagedFileCursor`] - read or write cursors bound to its pages
//! - [`Frame`] - a slot holding a page + metadata
//! - [`PagedFileStats`] - performance statistics
//! - [`replacer`] - eviction policy implementations

mod frame;
mod paged_cursor;
mod paged_file;
pub mod replacer;
mod stats;

pub use frame::Frame;
pub use paged_cursor::PagedFileCursor;
pub use paged_file::{CursorMode, PagedFile};
pub use stats::{PagedFileStats, StatsSnapshot};
