//! Document builder for an in-memory inverted index
//!
//! The builder owns its index exclusively while documents are added. Ids are
//! drawn sequentially from an `IdBlock`; a partition builder gets a block that
//! no other partition can reach, which keeps ids unique across the corpus.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::types::{DocumentId, IdBlock, InvertedIndex, Position};
use crate::error::{FragdexError, Result};
use crate::tokenizer::Tokenizer;

/// Builds an inverted index from raw document text
#[derive(Debug)]
pub struct IndexBuilder {
    tokenizer: Tokenizer,
    index: InvertedIndex,
    block: IdBlock,
    /// Owner of the block, reported on capacity errors
    partition_id: usize,
    /// Number of documents added so far
    added: u64,
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexBuilder {
    /// Create an unbounded builder whose first document gets id 0
    pub fn new() -> Self {
        Self::with_id_block(IdBlock::UNBOUNDED)
    }

    /// Create a builder drawing ids from `block`
    pub fn with_id_block(block: IdBlock) -> Self {
        Self {
            tokenizer: Tokenizer::new(),
            index: InvertedIndex::new(),
            block,
            partition_id: 0,
            added: 0,
        }
    }

    /// Create a builder for one partition of a larger build
    pub fn for_partition(partition_id: usize, block: IdBlock) -> Self {
        Self {
            partition_id,
            ..Self::with_id_block(block)
        }
    }

    /// Add a document and return its assigned id.
    ///
    /// Empty or punctuation-only text still consumes an id but adds no postings.
    pub fn add_document(&mut self, text: &str) -> Result<DocumentId> {
        let doc_id = self.block.id_for(self.added).ok_or(
            FragdexError::PartitionCapacityExceeded {
                partition_id: self.partition_id,
                capacity: self.block.capacity,
            },
        )?;
        self.added += 1;

        // Single pass: positions for a document arrive in ascending order.
        for (term, pos) in self.tokenizer.tokenize(text) {
            self.index.insert_position(&term, doc_id, pos);
        }

        Ok(doc_id)
    }

    /// Read-only view of the index built so far
    pub fn index(&self) -> &InvertedIndex {
        &self.index
    }

    /// Shareable snapshot for read-only collaborators
    pub fn snapshot(&self) -> Arc<InvertedIndex> {
        Arc::new(self.index.clone())
    }

    pub fn into_index(self) -> InvertedIndex {
        self.index
    }

    pub fn document_count(&self) -> u64 {
        self.added
    }

    /// Id the next added document will receive, if the block has room
    pub fn next_doc_id(&self) -> Option<DocumentId> {
        self.block.id_for(self.added)
    }

    pub fn id_block(&self) -> IdBlock {
        self.block
    }

    /// Ascending ids of documents containing `term`
    pub fn search_word(&self, term: &str) -> Vec<DocumentId> {
        match self.tokenizer.normalize_term(term) {
            Some(term) => self.index.doc_ids(&term),
            None => Vec::new(),
        }
    }

    /// Documents containing `terms` at consecutive positions, ascending.
    ///
    /// An empty phrase matches nothing.
    pub fn search_phrase(&self, terms: &[&str]) -> Vec<DocumentId> {
        let mut normalized = Vec::with_capacity(terms.len());
        for term in terms {
            match self.tokenizer.normalize_term(term) {
                Some(term) => normalized.push(term),
                None => return Vec::new(),
            }
        }
        phrase_matches(&self.index, &normalized)
    }

    /// Tokenize a raw phrase and search for it
    pub fn search_phrase_text(&self, phrase: &str) -> Vec<DocumentId> {
        let terms = self.tokenizer.terms(phrase);
        phrase_matches(&self.index, &terms)
    }
}

/// Documents where `terms[i]` occurs at `p + i` for some start position `p`
pub fn phrase_matches(index: &InvertedIndex, terms: &[String]) -> Vec<DocumentId> {
    let Some(first) = terms.first() else {
        return Vec::new();
    };

    let mut candidates: BTreeSet<DocumentId> = index.doc_ids(first).into_iter().collect();
    for term in &terms[1..] {
        if candidates.is_empty() {
            break;
        }
        let docs: BTreeSet<DocumentId> = index.doc_ids(term).into_iter().collect();
        candidates = candidates.intersection(&docs).copied().collect();
    }

    candidates
        .into_iter()
        .filter(|&doc_id| phrase_in_document(index, doc_id, terms))
        .collect()
}

fn phrase_in_document(index: &InvertedIndex, doc_id: DocumentId, terms: &[String]) -> bool {
    let postings: Option<Vec<_>> = terms
        .iter()
        .map(|term| index.postings(term).and_then(|list| list.get(doc_id)))
        .collect();
    let Some(postings) = postings else {
        return false;
    };

    postings[0].positions().iter().any(|&start| {
        postings.iter().enumerate().skip(1).all(|(offset, posting)| {
            offset_position(start, offset).is_some_and(|pos| posting.contains_position(pos))
        })
    })
}

fn offset_position(start: Position, offset: usize) -> Option<Position> {
    Position::try_from(offset)
        .ok()
        .and_then(|offset| start.checked_add(offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_ids_and_word_search() {
        let mut builder = IndexBuilder::new();
        assert_eq!(builder.add_document("Hello world").unwrap(), 0);
        assert_eq!(builder.add_document("World of Java").unwrap(), 1);

        assert_eq!(builder.search_word("world"), vec![0, 1]);
        assert_eq!(builder.search_word("WORLD"), vec![0, 1]);
        assert_eq!(builder.search_word("hello"), vec![0]);
        assert!(builder.search_word("python").is_empty());
    }

    #[test]
    fn test_positions_recorded_per_document() {
        let mut builder = IndexBuilder::new();
        builder.add_document("to be or not to be").unwrap();

        let postings = builder.index().postings("be").unwrap();
        assert_eq!(postings.get(0).unwrap().positions(), &[1, 5]);
        assert_eq!(builder.index().term_frequency("to", 0), 2);
    }

    #[test]
    fn test_empty_document_consumes_id() {
        let mut builder = IndexBuilder::new();
        assert_eq!(builder.add_document("").unwrap(), 0);
        assert_eq!(builder.add_document("   ").unwrap(), 1);
        assert_eq!(builder.add_document("word").unwrap(), 2);
        assert_eq!(builder.index().term_count(), 1);
        assert_eq!(builder.document_count(), 3);
    }

    #[test]
    fn test_phrase_search() {
        let mut builder = IndexBuilder::new();
        builder.add_document("Hello world").unwrap();
        builder.add_document("World of Java").unwrap();
        builder.add_document("Hello Java and the world").unwrap();
        builder.add_document("world hello").unwrap();

        assert_eq!(builder.search_phrase(&["hello", "world"]), vec![0]);
        assert_eq!(builder.search_phrase(&["world", "of", "java"]), vec![1]);
        assert_eq!(builder.search_phrase(&["hello"]), vec![0, 2, 3]);
        assert_eq!(builder.search_phrase_text("Hello, World!"), vec![0]);
    }

    #[test]
    fn test_phrase_search_edge_cases() {
        let mut builder = IndexBuilder::new();
        builder.add_document("a b a b c").unwrap();

        assert!(builder.search_phrase(&[]).is_empty());
        assert!(builder.search_phrase(&["a", "missing"]).is_empty());
        assert!(builder.search_phrase(&["a", "!!"]).is_empty());
        assert!(builder.search_phrase_text("").is_empty());
        // Second occurrence of "a b" is followed by "c".
        assert_eq!(builder.search_phrase(&["a", "b", "c"]), vec![0]);
        assert!(builder.search_phrase(&["b", "a", "c"]).is_empty());
    }

    #[test]
    fn test_id_block_offsets_and_capacity() {
        let mut builder = IndexBuilder::for_partition(3, IdBlock::new(3000, 2));
        assert_eq!(builder.add_document("one").unwrap(), 3000);
        assert_eq!(builder.add_document("two").unwrap(), 3001);
        assert_eq!(builder.next_doc_id(), None);

        match builder.add_document("three") {
            Err(FragdexError::PartitionCapacityExceeded {
                partition_id,
                capacity,
            }) => {
                assert_eq!(partition_id, 3);
                assert_eq!(capacity, 2);
            }
            other => panic!("expected capacity error, got {:?}", other),
        }
        assert!(builder.search_word("three").is_empty());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut builder = IndexBuilder::new();
        builder.add_document("first").unwrap();
        let snapshot = builder.snapshot();
        builder.add_document("second").unwrap();

        assert_eq!(snapshot.term_count(), 1);
        assert_eq!(builder.index().term_count(), 2);
    }
}
