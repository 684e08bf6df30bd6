//! graphpage - the page-level I/O core of a graph store.
//!
//! Every on-disk record of the store is read and written through this
//! crate. It gives the stores above it byte-addressable, bounds-safe,
//! concurrently-readable access to fixed-size pages of files, and absorbs
//! partial failures of the underlying storage.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              node / relationship / property stores              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                  Cursors (cursor/)                       │   │
//! │  │   PageCursor  ·  CompositePageCursor  ·  Standalone      │   │
//! │  │   sticky bounds flag · cursor exception · should_retry   │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                Paged File (buffer/)                      │   │
//! │  │      frames + page table + FIFO replacer + stats         │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                 Storage (storage/)                       │   │
//! │  │   SingleFilePageSwapper: lock · striping · resilience    │   │
//! │  │   FileSystem: Default · Ephemeral · Adversarial          │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, FrameId, Error, config)
//! - [`cursor`] - The page cursor contract and composite cursor
//! - [`buffer`] - Paged file: frame pool and file-bound cursors
//! - [`storage`] - File systems, page buffers and the page swapper
//!
//! # Quick Start
//! ```no_run
//! use std::sync::Arc;
//! use graphpage::common::config::{SwapperConfig, DEFAULT_PAGE_SIZE};
//! use graphpage::storage::fs::DefaultFileSystem;
//! use graphpage::storage::{PageSwapper, SingleFilePageSwapper};
//! use graphpage::PageId;
//!
//! let swapper = SingleFilePageSwapper::open(
//!     Arc::new(DefaultFileSystem::new()),
//!     "nodes.db",
//!     DEFAULT_PAGE_SIZE,
//!     SwapperConfig::default().with_create(true),
//! )?;
//!
//! let page = vec![7u8; DEFAULT_PAGE_SIZE];
//! swapper.write(PageId::new(0), &page)?;
//! swapper.close()?;
//! # Ok::<(), graphpage::Error>(())
//! ```

// Core modules
pub mod buffer;
pub mod common;
pub mod cursor;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::DEFAULT_PAGE_SIZE;
pub use common::{Error, FrameId, PageId, Result};

pub use buffer::{CursorMode, PagedFile, PagedFileCursor, PagedFileStats, StatsSnapshot};
pub use cursor::{CompositePageCursor, PageCursor, StandalonePageCursor};
pub use storage::page::PageBuffer;
pub use storage::{PageSwapper, SingleFilePageSwapper};
