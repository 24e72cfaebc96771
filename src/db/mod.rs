//! Database access layer.
//!
//! - Connection pool management
//! - Schema extraction into fragments
//! - Execution of approved SQL
//! - Row decoding to JSON
//! - Demo dataset

pub mod demo;
pub mod executor;
pub mod pool;
pub mod schema;
pub mod types;

pub use demo::{DemoSummary, seed_demo};
pub use executor::Executor;
pub use pool::DbPool;
pub use schema::SchemaExtractor;
