use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{FragdexError, Result};

/// Default number of term shards
pub const DEFAULT_SHARD_COUNT: usize = 5;

/// How document ids are reserved for each partition before building
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdStrategy {
    /// Each partition gets a block starting at the global ordinal of its first
    /// document and sized to its document count. Ids match a sequential build.
    #[default]
    Contiguous,
    /// Partition `p` gets the block `[p * capacity, (p + 1) * capacity)`.
    FixedBlock { capacity: u64 },
}

/// On-disk representation used when saving an index
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreFormat {
    /// One `term:Doc <id> -> [...]` line per term
    #[default]
    Text,
    /// Delta + varbyte compressed fragment with a trailing checksum
    Compressed,
}

impl std::str::FromStr for StoreFormat {
    type Err = FragdexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(StoreFormat::Text),
            "compressed" | "fdxc" => Ok(StoreFormat::Compressed),
            other => Err(FragdexError::InvalidConfig(format!(
                "unknown store format '{}'",
                other
            ))),
        }
    }
}

/// Settings for partitioned index construction
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// Number of contiguous partitions the corpus is split into
    pub partitions: usize,
    /// Upper bound on concurrently building partitions
    pub max_concurrency: usize,
    /// Document id reservation scheme
    pub id_strategy: IdStrategy,
    /// First document id handed out (for appending to an existing index)
    pub first_doc_id: u64,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            partitions: 4,
            max_concurrency: num_cpus::get(),
            id_strategy: IdStrategy::Contiguous,
            first_doc_id: 0,
        }
    }
}

impl PartitionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.partitions == 0 {
            return Err(FragdexError::InvalidConfig(
                "partition count must be at least 1".to_string(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(FragdexError::InvalidConfig(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if let IdStrategy::FixedBlock { capacity: 0 } = self.id_strategy {
            return Err(FragdexError::InvalidConfig(
                "fixed id block capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of workers actually spawned for a build
    pub fn worker_count(&self) -> usize {
        self.partitions.min(self.max_concurrency).max(1)
    }
}

/// Settings for cross-fragment merges
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Upper bound on concurrently loading fragments
    pub max_concurrency: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_concurrency: num_cpus::get(),
        }
    }
}

impl MergeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(FragdexError::InvalidConfig(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Top-level configuration for an indexing node
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexerConfig {
    pub data_dir: PathBuf,
    pub partitions: usize,
    pub max_concurrency: usize,
    pub id_strategy: IdStrategy,
    pub shard_count: usize,
    pub store_format: StoreFormat,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            partitions: 4,
            max_concurrency: num_cpus::get(),
            id_strategy: IdStrategy::Contiguous,
            shard_count: DEFAULT_SHARD_COUNT,
            store_format: StoreFormat::Text,
        }
    }
}

impl IndexerConfig {
    /// Create a configuration rooted at `data_dir`
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_id_strategy(mut self, id_strategy: IdStrategy) -> Self {
        self.id_strategy = id_strategy;
        self
    }

    pub fn with_shard_count(mut self, shard_count: usize) -> Self {
        self.shard_count = shard_count;
        self
    }

    pub fn with_store_format(mut self, store_format: StoreFormat) -> Self {
        self.store_format = store_format;
        self
    }

    /// Reject settings no build could run with
    pub fn validate(&self) -> Result<()> {
        if self.shard_count == 0 {
            return Err(FragdexError::InvalidConfig(
                "shard_count must be at least 1".to_string(),
            ));
        }
        self.partition_config().validate()?;
        self.merge_config().validate()
    }

    pub fn partition_config(&self) -> PartitionConfig {
        PartitionConfig {
            partitions: self.partitions,
            max_concurrency: self.max_concurrency,
            id_strategy: self.id_strategy,
            first_doc_id: 0,
        }
    }

    pub fn merge_config(&self) -> MergeConfig {
        MergeConfig {
            max_concurrency: self.max_concurrency,
        }
    }

    /// Directory holding persisted indexes
    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("indexes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configs() {
        let config = IndexerConfig::default();
        assert_eq!(config.shard_count, DEFAULT_SHARD_COUNT);
        assert_eq!(config.id_strategy, IdStrategy::Contiguous);
        assert_eq!(config.store_format, StoreFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = IndexerConfig::new(PathBuf::from("/tmp/fdx"))
            .with_partitions(3)
            .with_max_concurrency(2)
            .with_id_strategy(IdStrategy::FixedBlock { capacity: 1000 })
            .with_store_format(StoreFormat::Compressed);

        assert_eq!(config.index_dir(), PathBuf::from("/tmp/fdx/indexes"));
        let partition = config.partition_config();
        assert_eq!(partition.partitions, 3);
        assert_eq!(partition.worker_count(), 2);
        assert_eq!(config.merge_config().max_concurrency, 2);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        assert!(IndexerConfig::default().with_partitions(0).validate().is_err());
        assert!(IndexerConfig::default().with_shard_count(0).validate().is_err());
        assert!(IndexerConfig::default()
            .with_id_strategy(IdStrategy::FixedBlock { capacity: 0 })
            .validate()
            .is_err());
        assert!(IndexerConfig::default()
            .with_max_concurrency(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_store_format_parse() {
        assert_eq!("text".parse::<StoreFormat>().unwrap(), StoreFormat::Text);
        assert_eq!(
            "Compressed".parse::<StoreFormat>().unwrap(),
            StoreFormat::Compressed
        );
        assert!("gzip".parse::<StoreFormat>().is_err());
    }

    #[test]
    fn test_config_serializes() {
        let config = IndexerConfig::default().with_id_strategy(IdStrategy::FixedBlock { capacity: 8 });
        let json = serde_json::to_string(&config).unwrap();
        let back: IndexerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id_strategy, IdStrategy::FixedBlock { capacity: 8 });
    }
}
