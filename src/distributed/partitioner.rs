//! Partitioned index construction
//!
//! The corpus is cut into contiguous, balanced slices. Each slice gets an id
//! block reserved up front, is built into a local index on the worker pool,
//! and comes back as a `BuiltPartition`, the only form the merge coordinator
//! accepts.

use std::ops::Range;

use tracing::{debug, info, warn};

use super::merge::MergeCoordinator;
use super::pool::{CancellationToken, WorkerPool};
use crate::config::{IdStrategy, PartitionConfig};
use crate::error::{FragdexError, Result};
use crate::index::{IdBlock, IndexBuilder, InvertedIndex};

/// Where one partition sits in the corpus and which ids it may hand out
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionPlan {
    pub partition_id: usize,
    /// Slice of the input document list
    pub range: Range<usize>,
    pub id_block: IdBlock,
}

impl PartitionPlan {
    pub fn doc_count(&self) -> usize {
        self.range.len()
    }
}

/// A planned partition paired with its documents, not yet built
#[derive(Debug)]
pub struct Partition<'a, S> {
    plan: PartitionPlan,
    docs: &'a [S],
}

impl<'a, S: AsRef<str>> Partition<'a, S> {
    pub fn plan(&self) -> &PartitionPlan {
        &self.plan
    }

    pub fn docs(&self) -> &'a [S] {
        self.docs
    }

    /// Index every document of the slice, in order
    pub fn build(self, cancel: &CancellationToken) -> Result<BuiltPartition> {
        cancel.check()?;
        let mut builder =
            IndexBuilder::for_partition(self.plan.partition_id, self.plan.id_block);
        for doc in self.docs {
            builder.add_document(doc.as_ref())?;
        }
        debug!(
            "Built partition {} ({} documents, {} terms)",
            self.plan.partition_id,
            builder.document_count(),
            builder.index().term_count()
        );
        Ok(BuiltPartition {
            plan: self.plan,
            doc_count: builder.document_count(),
            index: builder.into_index(),
        })
    }
}

/// A partition whose local index is complete
#[derive(Clone, Debug)]
pub struct BuiltPartition {
    plan: PartitionPlan,
    index: InvertedIndex,
    doc_count: u64,
}

impl BuiltPartition {
    pub fn partition_id(&self) -> usize {
        self.plan.partition_id
    }

    pub fn plan(&self) -> &PartitionPlan {
        &self.plan
    }

    pub fn id_block(&self) -> IdBlock {
        self.plan.id_block
    }

    pub fn doc_count(&self) -> u64 {
        self.doc_count
    }

    pub fn index(&self) -> &InvertedIndex {
        &self.index
    }

    pub fn into_index(self) -> InvertedIndex {
        self.index
    }

    /// Name used for this partition in logs and errors
    pub fn name(&self) -> String {
        format!("partition-{}", self.plan.partition_id)
    }
}

/// Splits a corpus and builds the partitions concurrently
#[derive(Debug)]
pub struct Partitioner {
    config: PartitionConfig,
    pool: WorkerPool,
    cancel: CancellationToken,
}

impl Partitioner {
    pub fn new(config: PartitionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pool: WorkerPool::new(config.worker_count())?,
            config,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    /// Split `doc_count` documents into balanced contiguous ranges and reserve
    /// an id block for each.
    ///
    /// Sizes differ by at most one; the first `doc_count % partitions`
    /// partitions take the extra document.
    pub fn plan(&self, doc_count: usize) -> Result<Vec<PartitionPlan>> {
        let n = self.config.partitions;
        let base_size = doc_count / n;
        let extra = doc_count % n;

        let mut plans = Vec::with_capacity(n);
        let mut start = 0;
        for partition_id in 0..n {
            let len = base_size + usize::from(partition_id < extra);
            let range = start..start + len;
            start += len;

            let id_block = self.id_block_for(partition_id, &range)?;
            plans.push(PartitionPlan {
                partition_id,
                range,
                id_block,
            });
        }
        Ok(plans)
    }

    fn id_block_for(&self, partition_id: usize, range: &Range<usize>) -> Result<IdBlock> {
        let overflow = || {
            FragdexError::InvalidConfig(format!(
                "id block of partition {} overflows the document id space",
                partition_id
            ))
        };
        let first = self.config.first_doc_id;

        match self.config.id_strategy {
            IdStrategy::Contiguous => {
                let base = first.checked_add(range.start as u64).ok_or_else(overflow)?;
                let capacity = range.len() as u64;
                if capacity > 0 {
                    base.checked_add(capacity - 1).ok_or_else(overflow)?;
                }
                Ok(IdBlock::new(base, capacity))
            }
            IdStrategy::FixedBlock { capacity } => {
                if range.len() as u64 > capacity {
                    return Err(FragdexError::PartitionCapacityExceeded {
                        partition_id,
                        capacity,
                    });
                }
                let base = (partition_id as u64)
                    .checked_mul(capacity)
                    .and_then(|offset| first.checked_add(offset))
                    .ok_or_else(overflow)?;
                base.checked_add(capacity - 1).ok_or_else(overflow)?;
                Ok(IdBlock::new(base, capacity))
            }
        }
    }

    /// Pair every plan with its slice of `docs`
    pub fn partitions<'a, S: AsRef<str>>(&self, docs: &'a [S]) -> Result<Vec<Partition<'a, S>>> {
        Ok(self
            .plan(docs.len())?
            .into_iter()
            .map(|plan| Partition {
                docs: &docs[plan.range.clone()],
                plan,
            })
            .collect())
    }

    /// Build every partition on the pool and wait for all of them.
    ///
    /// Partitions come back in id order. The first failing partition (by id)
    /// is reported as `PartitionBuild`; cancellation is reported as
    /// `Cancelled` when nothing else failed.
    pub fn build<S: AsRef<str> + Sync>(&self, docs: &[S]) -> Result<Vec<BuiltPartition>> {
        let partitions = self.partitions(docs)?;
        info!(
            "Building {} documents in {} partitions on {} workers",
            docs.len(),
            partitions.len(),
            self.pool.max_workers()
        );

        let results = self
            .pool
            .run(partitions, |_, partition| partition.build(&self.cancel));
        collect_partition_results(results)
    }

    /// Build, then union every partition into one global index.
    ///
    /// Each worker hands its partition to the shared coordinator as soon as
    /// it is built.
    pub fn build_and_merge<S: AsRef<str> + Sync>(&self, docs: &[S]) -> Result<InvertedIndex> {
        let partitions = self.partitions(docs)?;
        let partition_count = partitions.len();
        let coordinator = MergeCoordinator::new();

        let results = self.pool.run(partitions, |_, partition| -> Result<BuiltPartition> {
            let built = partition.build(&self.cancel)?;
            coordinator.merge_local_index(&built)?;
            Ok(built)
        });
        collect_partition_results(results)?;

        let index = coordinator.into_index();
        info!(
            "Merged {} partitions into {} terms",
            partition_count,
            index.term_count()
        );
        Ok(index)
    }
}

fn collect_partition_results(
    results: Vec<Result<BuiltPartition>>,
) -> Result<Vec<BuiltPartition>> {
    let mut built = Vec::with_capacity(results.len());
    let mut cancelled = false;
    let mut failure = None;

    for (partition_id, result) in results.into_iter().enumerate() {
        match result {
            Ok(partition) => built.push(partition),
            Err(FragdexError::Cancelled) => cancelled = true,
            Err(e) if failure.is_none() => {
                warn!("Partition {} failed: {}", partition_id, e);
                failure = Some(FragdexError::PartitionBuild {
                    partition_id,
                    source: Box::new(e),
                });
            }
            Err(e) => warn!("Partition {} failed: {}", partition_id, e),
        }
    }

    if let Some(e) = failure {
        return Err(e);
    }
    if cancelled {
        return Err(FragdexError::Cancelled);
    }
    Ok(built)
}
