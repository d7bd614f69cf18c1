//! Raw frequency statistics over an inverted index
//!
//! Ranking lives outside this crate; these are the figures it reads:
//! document frequency, collection frequency and per-document length.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::types::{DocumentId, InvertedIndex};

/// Per-term frequency figures
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermStatistics {
    /// Number of documents containing the term
    pub document_frequency: u64,
    /// Total occurrences of the term across all documents
    pub collection_frequency: u64,
}

/// Statistics for a whole index
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IndexStatistics {
    /// Distinct documents with at least one term
    pub doc_count: u64,
    pub term_count: u64,
    /// Number of (term, document) pairs
    pub posting_count: u64,
    /// Sum of all document lengths
    pub total_term_occurrences: u64,
    terms: BTreeMap<String, TermStatistics>,
    /// Document length in tokens, keyed by document id
    doc_lengths: HashMap<DocumentId, u32>,
}

impl IndexStatistics {
    pub fn from_index(index: &InvertedIndex) -> Self {
        let mut stats = IndexStatistics::default();

        for (term, list) in index.iter() {
            let mut collection_frequency = 0u64;
            for posting in list {
                let tf = posting.term_frequency();
                collection_frequency += tf as u64;
                *stats.doc_lengths.entry(posting.doc_id).or_insert(0) += tf;
            }
            stats.posting_count += list.len() as u64;
            stats.total_term_occurrences += collection_frequency;
            stats.terms.insert(
                term.to_string(),
                TermStatistics {
                    document_frequency: list.len() as u64,
                    collection_frequency,
                },
            );
        }

        stats.term_count = stats.terms.len() as u64;
        stats.doc_count = stats.doc_lengths.len() as u64;
        stats
    }

    pub fn term(&self, term: &str) -> Option<&TermStatistics> {
        self.terms.get(term)
    }

    pub fn document_frequency(&self, term: &str) -> u64 {
        self.terms
            .get(term)
            .map(|t| t.document_frequency)
            .unwrap_or(0)
    }

    pub fn collection_frequency(&self, term: &str) -> u64 {
        self.terms
            .get(term)
            .map(|t| t.collection_frequency)
            .unwrap_or(0)
    }

    pub fn doc_length(&self, doc_id: DocumentId) -> Option<u32> {
        self.doc_lengths.get(&doc_id).copied()
    }

    /// Average document length over indexed documents
    pub fn avg_doc_length(&self) -> f64 {
        if self.doc_count == 0 {
            0.0
        } else {
            self.total_term_occurrences as f64 / self.doc_count as f64
        }
    }

    /// Terms sorted by descending document frequency, ties by term
    pub fn top_terms(&self, limit: usize) -> Vec<(&str, &TermStatistics)> {
        let mut terms: Vec<_> = self.terms.iter().map(|(t, s)| (t.as_str(), s)).collect();
        terms.sort_by(|a, b| {
            b.1.document_frequency
                .cmp(&a.1.document_frequency)
                .then_with(|| a.0.cmp(b.0))
        });
        terms.truncate(limit);
        terms
    }
}
