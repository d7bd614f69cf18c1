pub mod codec;
pub mod config;
pub mod distributed;
pub mod error;
pub mod index;
pub mod sharding;
pub mod store;
pub mod testing;
pub mod tokenizer;

pub use codec::{CompressedIndex, CompressedPostings};
pub use config::{IdStrategy, IndexerConfig, MergeConfig, PartitionConfig, StoreFormat};
pub use distributed::{
    BuiltPartition, CancellationToken, IndexMerger, MemoryFragment, MergeCoordinator,
    MergeOutcome, Partitioner, WorkerPool,
};
pub use error::{FragdexError, Result};
pub use index::{DocumentId, IndexBuilder, InvertedIndex, Posting, PostingsList};
pub use sharding::{ShardRouter, ShardedIndex};
pub use store::IndexStore;
pub use tokenizer::Tokenizer;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
