//! In-memory inverted index: postings types, the document builder and raw
//! frequency statistics.
//!
//! # Architecture
//!
//! - `InvertedIndex`: term -> `PostingsList`, both ordered maps
//! - `IndexBuilder`: assigns document ids and accumulates positions
//! - `IndexStatistics`: document/collection frequencies for ranking collaborators

mod builder;
mod statistics;
mod types;

pub use builder::*;
pub use statistics::*;
pub use types::*;
