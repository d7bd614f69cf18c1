//! Index persistence
//!
//! - `format`: the plain-text line format
//! - `index_store`: named index files with atomic saves and set-union updates

mod format;
mod index_store;

pub use format::*;
pub use index_store::*;
