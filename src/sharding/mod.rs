//! Term-space sharding
//!
//! A term lives in shard `crc32(term) % shard_count`. The hash is computed
//! over the UTF-8 bytes, so the assignment is the same in every process and
//! on every platform.

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::DEFAULT_SHARD_COUNT;
use crate::error::{FragdexError, Result};
use crate::index::{DocumentId, InvertedIndex, Position, Posting, PostingsList};
use crate::store::IndexStore;

/// Maps terms to shard ids
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShardRouter {
    shard_count: usize,
}

impl Default for ShardRouter {
    fn default() -> Self {
        Self {
            shard_count: DEFAULT_SHARD_COUNT,
        }
    }
}

impl ShardRouter {
    pub fn new(shard_count: usize) -> Result<Self> {
        if shard_count == 0 {
            return Err(FragdexError::InvalidConfig(
                "shard_count must be at least 1".to_string(),
            ));
        }
        Ok(Self { shard_count })
    }

    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    pub fn shard_id(&self, term: &str) -> usize {
        (crc32fast::hash(term.as_bytes()) as u64 % self.shard_count as u64) as usize
    }
}

/// Store name of one persisted shard
pub fn shard_name(prefix: &str, shard_id: usize) -> String {
    format!("{}.shard-{}", prefix, shard_id)
}

/// An inverted index split by term across independently locked shards
#[derive(Debug)]
pub struct ShardedIndex {
    router: ShardRouter,
    shards: Vec<RwLock<InvertedIndex>>,
}

impl ShardedIndex {
    pub fn new(router: ShardRouter) -> Self {
        let shards = (0..router.shard_count())
            .map(|_| RwLock::new(InvertedIndex::new()))
            .collect();
        Self { router, shards }
    }

    /// Split a built index by term
    pub fn from_index(router: ShardRouter, index: &InvertedIndex) -> Self {
        let sharded = Self::new(router);
        for (term, list) in index.iter() {
            let shard = router.shard_id(term);
            sharded.shards[shard]
                .write()
                .set_postings(term.to_string(), list.clone());
        }
        sharded
    }

    pub fn router(&self) -> ShardRouter {
        self.router
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Record `term` in `doc_id` at `positions`; returns the shard written
    pub fn add_to_shard(&self, term: &str, doc_id: DocumentId, positions: &[Position]) -> usize {
        let shard = self.router.shard_id(term);
        self.shards[shard]
            .write()
            .insert_posting(term, Posting::with_positions(doc_id, positions.to_vec()));
        shard
    }

    /// Ascending ids of documents containing `term`, read from its shard only
    pub fn search_in_shard(&self, term: &str) -> Vec<DocumentId> {
        self.shards[self.router.shard_id(term)].read().doc_ids(term)
    }

    pub fn postings(&self, term: &str) -> Option<PostingsList> {
        self.shards[self.router.shard_id(term)]
            .read()
            .postings(term)
            .cloned()
    }

    /// Copy of one shard, `None` if the id is out of range
    pub fn shard_snapshot(&self, shard_id: usize) -> Option<InvertedIndex> {
        self.shards.get(shard_id).map(|shard| shard.read().clone())
    }

    pub fn term_count(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().term_count()).sum()
    }

    /// Reassemble the full index
    pub fn to_index(&self) -> InvertedIndex {
        let mut index = InvertedIndex::new();
        for shard in &self.shards {
            index.union_with(shard.read().clone());
        }
        index
    }

    /// Persist every shard as `<prefix>.shard-<i>`
    pub fn save(&self, store: &IndexStore, prefix: &str) -> Result<()> {
        for (shard_id, shard) in self.shards.iter().enumerate() {
            let snapshot = shard.read().clone();
            store.save(&shard_name(prefix, shard_id), &snapshot)?;
            debug!("Saved shard {} ({} terms)", shard_id, snapshot.term_count());
        }
        info!("Saved {} shards under '{}'", self.shards.len(), prefix);
        Ok(())
    }

    /// Load shards written by `save`.
    ///
    /// A term stored in a shard the router would not send it to means the
    /// files were written with a different shard count.
    pub fn load(store: &IndexStore, prefix: &str, router: ShardRouter) -> Result<Self> {
        let mut shards = Vec::with_capacity(router.shard_count());
        for shard_id in 0..router.shard_count() {
            let name = shard_name(prefix, shard_id);
            let index = store.load(&name)?;
            if let Some(term) = index.terms().find(|t| router.shard_id(t) != shard_id) {
                return Err(FragdexError::corrupt(
                    name,
                    0,
                    format!(
                        "term '{}' belongs to shard {}",
                        term,
                        router.shard_id(term)
                    ),
                ));
            }
            shards.push(RwLock::new(index));
        }
        Ok(Self { router, shards })
    }
}
