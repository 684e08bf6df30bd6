//! Eviction policy implementations (replacers).

mod fifo;

pub use fifo::FifoReplacer;
