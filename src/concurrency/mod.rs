//! Concurrency primitives shared by the BPE applier, the BPE learner, and
//! the WordPiece encoder.

mod thread_pool;

pub use thread_pool::{map_ordered, ThreadPool};
