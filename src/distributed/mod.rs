//! Partitioned building and fragment merging
//!
//! # Architecture
//!
//! - `WorkerPool`: bounded scoped threads fed by a crossbeam channel
//! - `Partitioner`: splits the corpus, reserves id blocks, builds partitions
//! - `MergeCoordinator`: single-writer owner of the global index
//! - `IndexMerger`: loads fragments from files or memory and merges them

mod merge;
mod partitioner;
mod pool;

pub use merge::*;
pub use partitioner::*;
pub use pool::*;
