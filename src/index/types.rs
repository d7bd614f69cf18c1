//! Core types for the inverted index

use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};
use std::collections::BTreeSet;

/// Globally unique document identifier
pub type DocumentId = u64;

/// Zero-based token offset within a document
pub type Position = u32;

/// A reserved range of document ids: `[base, base + capacity)`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdBlock {
    pub base: DocumentId,
    pub capacity: u64,
}

impl IdBlock {
    /// A block covering every id from zero
    pub const UNBOUNDED: IdBlock = IdBlock {
        base: 0,
        capacity: u64::MAX,
    };

    pub fn new(base: DocumentId, capacity: u64) -> Self {
        Self { base, capacity }
    }

    /// Id for the `local`-th document, `None` once the block is exhausted
    pub fn id_for(&self, local: u64) -> Option<DocumentId> {
        if local >= self.capacity {
            return None;
        }
        self.base.checked_add(local)
    }

    /// Last id of the block (inclusive), saturating at `u64::MAX`
    pub fn last(&self) -> DocumentId {
        self.base.saturating_add(self.capacity.saturating_sub(1))
    }

    pub fn overlaps(&self, other: &IdBlock) -> bool {
        if self.capacity == 0 || other.capacity == 0 {
            return false;
        }
        self.base <= other.last() && other.base <= self.last()
    }
}

/// A single posting: one document and the positions of the term in it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocumentId,
    /// Strictly ascending, no duplicates
    positions: Vec<Position>,
}

impl Posting {
    pub fn new(doc_id: DocumentId) -> Self {
        Self {
            doc_id,
            positions: Vec::new(),
        }
    }

    /// Build a posting from arbitrary positions; they are sorted and deduplicated.
    pub fn with_positions(doc_id: DocumentId, mut positions: Vec<Position>) -> Self {
        positions.sort_unstable();
        positions.dedup();
        Self { doc_id, positions }
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn term_frequency(&self) -> u32 {
        self.positions.len() as u32
    }

    pub fn contains_position(&self, pos: Position) -> bool {
        self.positions.binary_search(&pos).is_ok()
    }

    /// Record an occurrence, keeping positions ascending and unique
    pub fn add_position(&mut self, pos: Position) {
        match self.positions.last() {
            Some(&last) if last < pos => self.positions.push(pos),
            None => self.positions.push(pos),
            _ => {
                if let Err(at) = self.positions.binary_search(&pos) {
                    self.positions.insert(at, pos);
                }
            }
        }
    }

    /// Set-union the positions of `other` into this posting
    pub fn union_positions(&mut self, other: &[Position]) {
        if other.is_empty() {
            return;
        }
        let merged: BTreeSet<Position> = self.positions.iter().chain(other).copied().collect();
        self.positions = merged.into_iter().collect();
    }
}

/// Postings for one term, ordered by ascending document id
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingsList {
    postings: BTreeMap<DocumentId, Posting>,
}

impl PostingsList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    pub fn get(&self, doc_id: DocumentId) -> Option<&Posting> {
        self.postings.get(&doc_id)
    }

    pub fn contains(&self, doc_id: DocumentId) -> bool {
        self.postings.contains_key(&doc_id)
    }

    /// Ascending document ids
    pub fn doc_ids(&self) -> Vec<DocumentId> {
        self.postings.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Posting> {
        self.postings.values()
    }

    /// Sum of term frequencies across documents
    pub fn total_frequency(&self) -> u64 {
        self.postings.values().map(|p| p.term_frequency() as u64).sum()
    }

    pub fn add_position(&mut self, doc_id: DocumentId, pos: Position) {
        self.postings
            .entry(doc_id)
            .or_insert_with(|| Posting::new(doc_id))
            .add_position(pos);
    }

    /// Insert a posting, replacing any existing posting for the same document
    pub fn insert(&mut self, posting: Posting) -> Option<Posting> {
        self.postings.insert(posting.doc_id, posting)
    }

    /// Merge a posting as a set union keyed by document id
    pub fn union_posting(&mut self, posting: Posting) {
        match self.postings.entry(posting.doc_id) {
            btree_map::Entry::Vacant(slot) => {
                slot.insert(posting);
            }
            btree_map::Entry::Occupied(mut slot) => {
                slot.get_mut().union_positions(posting.positions());
            }
        }
    }

    pub fn remove(&mut self, doc_id: DocumentId) -> Option<Posting> {
        self.postings.remove(&doc_id)
    }
}

impl<'a> IntoIterator for &'a PostingsList {
    type Item = &'a Posting;
    type IntoIter = btree_map::Values<'a, DocumentId, Posting>;

    fn into_iter(self) -> Self::IntoIter {
        self.postings.values()
    }
}

impl FromIterator<Posting> for PostingsList {
    fn from_iter<I: IntoIterator<Item = Posting>>(iter: I) -> Self {
        let mut list = PostingsList::new();
        for posting in iter {
            list.union_posting(posting);
        }
        list
    }
}

/// Term -> postings mapping, ordered by term
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvertedIndex {
    terms: BTreeMap<String, PostingsList>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Number of distinct terms
    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Number of (term, document) pairs
    pub fn posting_count(&self) -> usize {
        self.terms.values().map(PostingsList::len).sum()
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.terms.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PostingsList)> {
        self.terms.iter().map(|(term, list)| (term.as_str(), list))
    }

    pub fn postings(&self, term: &str) -> Option<&PostingsList> {
        self.terms.get(term)
    }

    /// Ascending ids of documents containing `term`
    pub fn doc_ids(&self, term: &str) -> Vec<DocumentId> {
        self.terms
            .get(term)
            .map(PostingsList::doc_ids)
            .unwrap_or_default()
    }

    pub fn insert_position(&mut self, term: &str, doc_id: DocumentId, pos: Position) {
        if let Some(list) = self.terms.get_mut(term) {
            list.add_position(doc_id, pos);
        } else {
            let mut list = PostingsList::new();
            list.add_position(doc_id, pos);
            self.terms.insert(term.to_string(), list);
        }
    }

    /// Set-union a posting into the term's list
    pub fn insert_posting(&mut self, term: &str, posting: Posting) {
        self.terms
            .entry(term.to_string())
            .or_default()
            .union_posting(posting);
    }

    /// Replace the whole postings list of a term
    pub fn set_postings(&mut self, term: String, list: PostingsList) -> Option<PostingsList> {
        self.terms.insert(term, list)
    }

    pub fn remove_term(&mut self, term: &str) -> Option<PostingsList> {
        self.terms.remove(term)
    }

    /// Merge another index term-wise as a set union keyed by document id.
    ///
    /// Applying the same `other` twice leaves the index unchanged the second time.
    pub fn union_with(&mut self, other: InvertedIndex) {
        for (term, list) in other.terms {
            match self.terms.entry(term) {
                btree_map::Entry::Vacant(slot) => {
                    slot.insert(list);
                }
                btree_map::Entry::Occupied(mut slot) => {
                    let target = slot.get_mut();
                    for posting in list.postings.into_values() {
                        target.union_posting(posting);
                    }
                }
            }
        }
    }

    /// All distinct document ids referenced by any term
    pub fn document_ids(&self) -> BTreeSet<DocumentId> {
        self.terms
            .values()
            .flat_map(|list| list.postings.keys().copied())
            .collect()
    }

    pub fn max_doc_id(&self) -> Option<DocumentId> {
        self.terms
            .values()
            .filter_map(|list| list.postings.keys().next_back().copied())
            .max()
    }

    pub fn term_frequency(&self, term: &str, doc_id: DocumentId) -> u32 {
        self.terms
            .get(term)
            .and_then(|list| list.get(doc_id))
            .map(Posting::term_frequency)
            .unwrap_or(0)
    }

    pub fn document_frequency(&self, term: &str) -> usize {
        self.terms.get(term).map(PostingsList::len).unwrap_or(0)
    }
}

impl FromIterator<(String, PostingsList)> for InvertedIndex {
    fn from_iter<I: IntoIterator<Item = (String, PostingsList)>>(iter: I) -> Self {
        let mut index = InvertedIndex::new();
        for (term, list) in iter {
            let target = index.terms.entry(term).or_default();
            for posting in list.postings.into_values() {
                target.union_posting(posting);
            }
        }
        index
    }
}
