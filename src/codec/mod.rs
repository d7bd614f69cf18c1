//! Postings compression
//!
//! - `postings`: delta transform + variable-byte integers, per postings list
//! - `fragment`: checksummed binary file holding a whole compressed index

mod fragment;
mod postings;

pub use fragment::*;
pub use postings::*;
