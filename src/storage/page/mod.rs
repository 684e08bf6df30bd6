//! In-memory page representation.

mod page;

pub use page::PageBuffer;
