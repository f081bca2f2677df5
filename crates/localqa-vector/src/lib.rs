//! On-disk chunk index backed by LanceDB.
//!
//! [`IndexWriter`] rebuilds an index from scratch; [`VectorIndex`] opens a
//! finished one and answers cosine top-k queries.

pub mod manifest;
pub mod schema;
mod search;
mod table;
mod writer;

pub use manifest::IndexManifest;
pub use search::VectorIndex;
pub use writer::IndexWriter;
