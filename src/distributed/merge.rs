//! Merging local indexes into one global index
//!
//! `MergeCoordinator` owns the global index behind a single mutex; any number
//! of threads may hand it partitions or fragments, and every document id must
//! come from exactly one of them.
//!
//! `IndexMerger` loads fragments (text or compressed, files or memory) on a
//! bounded pool, then folds them through a coordinator in input order. A
//! fragment that cannot be loaded fails the whole merge.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::partitioner::BuiltPartition;
use super::pool::{CancellationToken, WorkerPool};
use crate::config::MergeConfig;
use crate::error::{FragdexError, Result};
use crate::index::{DocumentId, InvertedIndex};
use crate::store::{decode_index_bytes, IndexStore};

#[derive(Debug, Default)]
struct GlobalState {
    index: InvertedIndex,
    /// Names of merged units; the position is the unit's id
    units: Vec<String>,
    /// Which unit contributed each document id
    owners: HashMap<DocumentId, usize>,
    has_base: bool,
}

impl GlobalState {
    fn merged_units(&self) -> usize {
        self.units.len() - usize::from(self.has_base)
    }
}

/// Single-writer owner of the global index
#[derive(Debug, Default)]
pub struct MergeCoordinator {
    state: Mutex<GlobalState>,
}

impl MergeCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing global index whose documents belong to `name`
    pub fn with_base(name: &str, index: InvertedIndex) -> Self {
        let owners = index.document_ids().into_iter().map(|id| (id, 0)).collect();
        Self {
            state: Mutex::new(GlobalState {
                index,
                units: vec![name.to_string()],
                owners,
                has_base: true,
            }),
        }
    }

    /// Union a finished partition into the global index
    pub fn merge_local_index(&self, partition: &BuiltPartition) -> Result<()> {
        self.merge_unit(&partition.name(), partition.index().clone())
    }

    /// Union a loaded fragment into the global index
    pub fn merge_fragment(&self, name: &str, index: InvertedIndex) -> Result<()> {
        self.merge_unit(name, index)
    }

    /// Every call is a new unit, so an id seen before is always a duplicate
    fn merge_unit(&self, name: &str, index: InvertedIndex) -> Result<()> {
        let incoming = index.document_ids();
        let mut state = self.state.lock();

        // Check before touching the index so a rejected unit leaves no trace.
        for &doc_id in &incoming {
            if let Some(&owner) = state.owners.get(&doc_id) {
                let first = state.units[owner].clone();
                warn!(
                    "Document {} from {} already merged from {}",
                    doc_id, name, first
                );
                return Err(FragdexError::DuplicateDocumentId {
                    doc_id,
                    first,
                    second: name.to_string(),
                });
            }
        }

        let unit = state.units.len();
        state.units.push(name.to_string());
        state.owners.extend(incoming.into_iter().map(|id| (id, unit)));
        let terms = index.term_count();
        state.index.union_with(index);
        debug!("Merged {} ({} terms)", name, terms);
        Ok(())
    }

    /// Copy of the global index as merged so far
    pub fn snapshot(&self) -> InvertedIndex {
        self.state.lock().index.clone()
    }

    /// Units merged so far, not counting a base index
    pub fn merged_units(&self) -> usize {
        self.state.lock().merged_units()
    }

    pub fn into_index(self) -> InvertedIndex {
        self.state.into_inner().index
    }
}

/// Where fragment bytes come from
pub trait FragmentSource: Sync {
    /// Name used in logs and errors
    fn name(&self) -> String;

    fn read_bytes(&self) -> Result<Vec<u8>>;
}

impl FragmentSource for Path {
    fn name(&self) -> String {
        self.display().to_string()
    }

    fn read_bytes(&self) -> Result<Vec<u8>> {
        fs::read(self).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                FragdexError::IndexNotFound(self.display().to_string())
            } else {
                e.into()
            }
        })
    }
}

impl FragmentSource for PathBuf {
    fn name(&self) -> String {
        self.as_path().name()
    }

    fn read_bytes(&self) -> Result<Vec<u8>> {
        self.as_path().read_bytes()
    }
}

impl<T: FragmentSource + ?Sized> FragmentSource for &T {
    fn name(&self) -> String {
        (**self).name()
    }

    fn read_bytes(&self) -> Result<Vec<u8>> {
        (**self).read_bytes()
    }
}

/// A fragment already held in memory, e.g. received from another node
#[derive(Clone, Debug)]
pub struct MemoryFragment {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl MemoryFragment {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

impl FragmentSource for MemoryFragment {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn read_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.bytes.clone())
    }
}

/// Result of a successful merge
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub index: InvertedIndex,
    /// Number of fragments merged
    pub fragments: usize,
    pub terms: usize,
    pub postings: usize,
}

/// Merges fragments produced by independent nodes
#[derive(Debug)]
pub struct IndexMerger {
    pool: WorkerPool,
    cancel: CancellationToken,
}

impl IndexMerger {
    pub fn new(config: MergeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pool: WorkerPool::new(config.max_concurrency)?,
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

    /// Read and decode one fragment, detecting its format.
    ///
    /// Failures are wrapped in `FragmentLoad` naming the fragment.
    pub fn load_fragment<S: FragmentSource + ?Sized>(&self, source: &S) -> Result<InvertedIndex> {
        let name = source.name();
        let load = || -> Result<InvertedIndex> {
            let bytes = source.read_bytes()?;
            decode_index_bytes(&bytes, &name)
        };
        load().map_err(|e| FragdexError::FragmentLoad {
            fragment: name.clone(),
            source: Box::new(e),
        })
    }

    /// Load every fragment concurrently, then fold them in input order.
    ///
    /// Source names must be distinct so errors identify one fragment.
    pub fn merge<S: FragmentSource>(&self, sources: &[S]) -> Result<MergeOutcome> {
        let mut seen = HashSet::with_capacity(sources.len());
        for source in sources {
            let name = source.name();
            if !seen.insert(name.clone()) {
                return Err(FragdexError::InvalidConfig(format!(
                    "fragment '{}' is listed more than once",
                    name
                )));
            }
        }

        info!(
            "Merging {} fragments on up to {} workers",
            sources.len(),
            self.pool.max_workers()
        );

        let loaded = self.pool.run(sources.iter().collect(), |_, source| {
            self.cancel.check()?;
            let index = self.load_fragment(source)?;
            debug!("Loaded fragment {} ({} terms)", source.name(), index.term_count());
            Ok::<_, FragdexError>((source.name(), index))
        });

        // Every fragment has been attempted; report the first failure in input order.
        let mut fragments = Vec::with_capacity(loaded.len());
        for result in loaded {
            match result {
                Ok(fragment) => fragments.push(fragment),
                Err(e) => {
                    warn!("Merge aborted: {}", e);
                    return Err(e);
                }
            }
        }

        let coordinator = MergeCoordinator::new();
        for (name, index) in fragments {
            self.cancel.check()?;
            coordinator.merge_fragment(&name, index)?;
        }

        let index = coordinator.into_index();
        let outcome = MergeOutcome {
            fragments: sources.len(),
            terms: index.term_count(),
            postings: index.posting_count(),
            index,
        };
        info!(
            "Merged {} fragments into {} terms, {} postings",
            outcome.fragments, outcome.terms, outcome.postings
        );
        Ok(outcome)
    }

    /// Merge and persist the result under `output` in `store`
    pub fn merge_into<S: FragmentSource>(
        &self,
        sources: &[S],
        store: &IndexStore,
        output: &str,
    ) -> Result<MergeOutcome> {
        let outcome = self.merge(sources)?;
        store.save(output, &outcome.index)?;
        info!("Wrote merged index '{}'", output);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreFormat;
    use crate::store::encode_index_bytes;

    fn fragment(name: &str, entries: &[(&str, DocumentId, u32)]) -> MemoryFragment {
        let mut index = InvertedIndex::new();
        for &(term, doc, pos) in entries {
            index.insert_position(term, doc, pos);
        }
        MemoryFragment::new(name, encode_index_bytes(&index, StoreFormat::Text).unwrap())
    }

    fn merger() -> IndexMerger {
        IndexMerger::new(MergeConfig { max_concurrency: 2 }).unwrap()
    }

    #[test]
    fn test_disjoint_terms() {
        let a = fragment("a", &[("apple", 1, 0)]);
        let b = fragment("b", &[("banana", 2, 0)]);
        let outcome = merger().merge(&[a, b]).unwrap();

        assert_eq!(outcome.fragments, 2);
        assert_eq!(outcome.terms, 2);
        assert_eq!(outcome.index.doc_ids("apple"), vec![1]);
        assert_eq!(outcome.index.doc_ids("banana"), vec![2]);
    }

    #[test]
    fn test_shared_term_concatenates() {
        let a = fragment("a", &[("rust", 1, 0)]);
        let b = fragment("b", &[("rust", 2, 3)]);
        let outcome = merger().merge(&[b, a]).unwrap();

        assert_eq!(outcome.index.doc_ids("rust"), vec![1, 2]);
        assert_eq!(outcome.postings, 2);
    }

    #[test]
    fn test_duplicate_ids_across_fragments() {
        let a = fragment("a", &[("x", 7, 0)]);
        let b = fragment("b", &[("y", 7, 0)]);
        match merger().merge(&[a, b]) {
            Err(FragdexError::DuplicateDocumentId {
                doc_id,
                first,
                second,
            }) => {
                assert_eq!(doc_id, 7);
                assert_eq!((first.as_str(), second.as_str()), ("a", "b"));
            }
            other => panic!("expected duplicate id, got {:?}", other),
        }
    }

    #[test]
    fn test_corrupt_fragment_names_itself() {
        let good = fragment("good", &[("x", 1, 0)]);
        let bad = MemoryFragment::new("bad", b"x Doc 1 -> [0]\n".to_vec());
        let err = merger().merge(&[good, bad]).unwrap_err();

        assert_eq!(err.unit().as_deref(), Some("bad"));
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_cancelled_merge() {
        let merger = merger();
        merger.cancellation_token().cancel();
        let a = fragment("a", &[("x", 1, 0)]);
        assert!(matches!(merger.merge(&[a]), Err(FragdexError::Cancelled)));
    }

    #[test]
    fn test_coordinator_rejects_without_partial_merge() {
        let coordinator = MergeCoordinator::new();
        let mut first = InvertedIndex::new();
        first.insert_position("a", 1, 0);
        coordinator.merge_fragment("one", first.clone()).unwrap();

        let mut second = InvertedIndex::new();
        second.insert_position("b", 2, 0);
        second.insert_position("c", 1, 0);
        assert!(coordinator.merge_fragment("two", second).is_err());

        assert_eq!(coordinator.snapshot(), first);
        // A second unit under the same name still owns nothing
        match coordinator.merge_fragment("one", first.clone()) {
            Err(FragdexError::DuplicateDocumentId { doc_id, first, second }) => {
                assert_eq!(doc_id, 1);
                assert_eq!((first.as_str(), second.as_str()), ("one", "one"));
            }
            other => panic!("expected duplicate id, got {:?}", other),
        }
        assert_eq!(coordinator.merged_units(), 1);
        assert_eq!(coordinator.into_index(), first);
    }

    #[test]
    fn test_repeated_fragment_names_are_rejected() {
        let a = fragment("node", &[("x", 1, 0)]);
        let b = fragment("node", &[("y", 2, 0)]);
        assert!(matches!(
            merger().merge(&[a, b]),
            Err(FragdexError::InvalidConfig(_))
        ));
    }
}
