//! Vector index over schema fragments.
//!
//! - `vector`: the index itself, cosine search and schema fingerprints
//! - `store`: persistence to `<dir>/<database>.json` and the active index
//! - `indexer`: build or reuse the index for a database
//! - `retriever`: top-K lookup for a question

pub mod indexer;
pub mod retriever;
pub mod store;
pub mod vector;

pub use indexer::{IndexOutcome, SchemaIndexer};
pub use retriever::Retriever;
pub use store::{IndexFiles, IndexStore};
pub use vector::{VectorIndex, cosine_similarity, fingerprint};
