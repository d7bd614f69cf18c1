//! Invariant checking framework for inverted indexes
//!
//! Each invariant inspects a finished index and reports at most one
//! violation, with enough context to find the offending term or document.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::codec::{CompressedIndex, CompressedPostings};
use crate::index::{IdBlock, InvertedIndex};
use crate::store::{parse_index, serialize_index};

/// A violation of an invariant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub invariant: String,
    pub description: String,
    pub context: HashMap<String, String>,
}

impl Violation {
    fn new(invariant: &str, description: impl Into<String>) -> Self {
        Self {
            invariant: invariant.to_string(),
            description: description.into(),
            context: HashMap::new(),
        }
    }

    fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.context.insert(key.to_string(), value.to_string());
        self
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "INVARIANT VIOLATION: {}", self.invariant)?;
        writeln!(f, "  Description: {}", self.description)?;
        if !self.context.is_empty() {
            let mut keys: Vec<_> = self.context.keys().collect();
            keys.sort();
            writeln!(f, "  Context:")?;
            for key in keys {
                writeln!(f, "    {}: {}", key, self.context[key])?;
            }
        }
        Ok(())
    }
}

/// Trait for invariant checkers
pub trait Invariant: Send + Sync {
    fn name(&self) -> &str;

    fn check(&self, index: &InvertedIndex) -> Result<(), Violation>;

    fn description(&self) -> &str {
        "No description provided"
    }
}

/// Check all invariants and return violations
pub fn check_all_invariants(
    index: &InvertedIndex,
    invariants: &[Box<dyn Invariant>],
) -> Vec<Violation> {
    invariants
        .iter()
        .filter_map(|invariant| invariant.check(index).err())
        .collect()
}

/// Invariants every index produced by this crate satisfies
pub fn default_invariants() -> Vec<Box<dyn Invariant>> {
    vec![
        Box::new(TermsNormalized),
        Box::new(PositionsAscending),
        Box::new(NoEmptyPostingsLists),
        Box::new(CompressionRoundTrip),
        Box::new(TextRoundTrip),
    ]
}

/// Every term is non-empty and made of `[a-z0-9]`
pub struct TermsNormalized;

impl Invariant for TermsNormalized {
    fn name(&self) -> &str {
        "TermsNormalized"
    }

    fn description(&self) -> &str {
        "Terms are non-empty lowercase ascii letters and digits"
    }

    fn check(&self, index: &InvertedIndex) -> Result<(), Violation> {
        let bad = index.terms().find(|term| {
            term.is_empty()
                || !term
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        });
        match bad {
            Some(term) => Err(Violation::new(self.name(), "term is not normalized").with("term", term)),
            None => Ok(()),
        }
    }
}

/// Positions inside each posting are strictly ascending
pub struct PositionsAscending;

impl Invariant for PositionsAscending {
    fn name(&self) -> &str {
        "PositionsAscending"
    }

    fn check(&self, index: &InvertedIndex) -> Result<(), Violation> {
        for (term, list) in index.iter() {
            for posting in list {
                if posting.positions().windows(2).any(|w| w[0] >= w[1]) {
                    return Err(Violation::new(self.name(), "positions out of order")
                        .with("term", term)
                        .with("doc_id", posting.doc_id));
                }
            }
        }
        Ok(())
    }
}

pub struct NoEmptyPostingsLists;

impl Invariant for NoEmptyPostingsLists {
    fn name(&self) -> &str {
        "NoEmptyPostingsLists"
    }

    fn description(&self) -> &str {
        "A term is present only if some document contains it"
    }

    fn check(&self, index: &InvertedIndex) -> Result<(), Violation> {
        match index.iter().find(|(_, list)| list.is_empty()) {
            Some((term, _)) => Err(Violation::new(self.name(), "term has no postings").with("term", term)),
            None => Ok(()),
        }
    }
}

/// Every postings list survives compression unchanged
pub struct CompressionRoundTrip;

impl Invariant for CompressionRoundTrip {
    fn name(&self) -> &str {
        "CompressionRoundTrip"
    }

    fn check(&self, index: &InvertedIndex) -> Result<(), Violation> {
        for (term, list) in index.iter() {
            let restored = CompressedPostings::compress(list).and_then(|c| c.decompress());
            match restored {
                Ok(restored) if &restored == list => {}
                Ok(_) => {
                    return Err(Violation::new(self.name(), "decompressed postings differ")
                        .with("term", term))
                }
                Err(e) => return Err(Violation::new(self.name(), e.to_string()).with("term", term)),
            }
        }

        let whole = CompressedIndex::from_index(index)
            .map(|c| c.to_bytes())
            .and_then(|bytes| CompressedIndex::decode_index(&bytes, "invariant"));
        match whole {
            Ok(restored) if &restored == index => Ok(()),
            Ok(_) => Err(Violation::new(self.name(), "decoded fragment differs")),
            Err(e) => Err(Violation::new(self.name(), e.to_string())),
        }
    }
}

/// The index survives the text format unchanged
pub struct TextRoundTrip;

impl Invariant for TextRoundTrip {
    fn name(&self) -> &str {
        "TextRoundTrip"
    }

    fn check(&self, index: &InvertedIndex) -> Result<(), Violation> {
        let restored = serialize_index(index).and_then(|text| parse_index(&text, "invariant"));
        match restored {
            Ok(restored) if &restored == index => Ok(()),
            Ok(restored) => Err(Violation::new(self.name(), "parsed index differs")
                .with("differences", diff_indexes(index, &restored).join("; "))),
            Err(e) => Err(Violation::new(self.name(), e.to_string())),
        }
    }
}

/// Every document id falls inside one of the reserved blocks
pub struct IdsWithinBlocks {
    pub blocks: Vec<IdBlock>,
}

impl Invariant for IdsWithinBlocks {
    fn name(&self) -> &str {
        "IdsWithinBlocks"
    }

    fn check(&self, index: &InvertedIndex) -> Result<(), Violation> {
        let outside = index.document_ids().into_iter().find(|&id| {
            !self
                .blocks
                .iter()
                .any(|b| b.capacity > 0 && id >= b.base && id <= b.last())
        });
        match outside {
            Some(doc_id) => Err(Violation::new(self.name(), "document id outside every block")
                .with("doc_id", doc_id)),
            None => Ok(()),
        }
    }
}

/// Human-readable differences between two indexes, empty when equal
pub fn diff_indexes(expected: &InvertedIndex, actual: &InvertedIndex) -> Vec<String> {
    let mut diffs = Vec::new();
    for (term, list) in expected.iter() {
        match actual.postings(term) {
            None => diffs.push(format!("missing term '{}'", term)),
            Some(other) if other != list => {
                for posting in list {
                    match other.get(posting.doc_id) {
                        None => diffs.push(format!("'{}': missing doc {}", term, posting.doc_id)),
                        Some(p) if p != posting => diffs.push(format!(
                            "'{}': doc {} positions {:?} != {:?}",
                            term,
                            posting.doc_id,
                            posting.positions(),
                            p.positions()
                        )),
                        Some(_) => {}
                    }
                }
                for posting in other {
                    if !list.contains(posting.doc_id) {
                        diffs.push(format!("'{}': unexpected doc {}", term, posting.doc_id));
                    }
                }
            }
            Some(_) => {}
        }
    }
    for term in actual.terms() {
        if expected.postings(term).is_none() {
            diffs.push(format!("unexpected term '{}'", term));
        }
    }
    diffs
}
