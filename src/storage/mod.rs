//! Storage layer - files, channels and the page swapper.
//!
//! # Components
//! - [`fs`] - file-system and channel abstractions (real, in-memory, adversarial)
//! - [`page`] - in-memory page buffers
//! - [`PageSwapper`] / [`SingleFilePageSwapper`] - page-granular file I/O

pub mod fs;
pub mod page;
mod swapper;

pub use swapper::{PageSwapper, SingleFilePageSwapper};
