//! Text normalization into ordered `(term, position)` sequences.

#[allow(clippy::module_inception)]
mod tokenizer;

pub use tokenizer::Tokenizer;
