//! Testing infrastructure for correctness verification
//!
//! Structural invariants over an `InvertedIndex` plus a diff helper used by
//! merge-equivalence tests and the `verify` command.
//!
//! # Quick Start
//!
//! ```rust
//! use fragdex::index::IndexBuilder;
//! use fragdex::testing::prelude::*;
//!
//! let mut builder = IndexBuilder::new();
//! builder.add_document("Hello world").unwrap();
//!
//! let violations = check_all_invariants(builder.index(), &default_invariants());
//! assert!(violations.is_empty());
//! ```
//!
//! # Invariants
//!
//! - **TermsNormalized**: terms use only `[a-z0-9]`
//! - **PositionsAscending**: positions per posting strictly ascend
//! - **NoEmptyPostingsLists**: every term has a posting
//! - **CompressionRoundTrip**: compressed form decodes to the same index
//! - **TextRoundTrip**: text form parses to the same index
//! - **IdsWithinBlocks**: document ids stay inside reserved id blocks

pub mod invariants;

pub use invariants::{
    check_all_invariants, default_invariants, diff_indexes, CompressionRoundTrip,
    IdsWithinBlocks, Invariant, NoEmptyPostingsLists, PositionsAscending, TermsNormalized,
    TextRoundTrip, Violation,
};

/// Prelude for easy imports
pub mod prelude {
    pub use super::invariants::{
        check_all_invariants, default_invariants, diff_indexes, Invariant, Violation,
    };
}
