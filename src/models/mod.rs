//! Data models for the SQL explorer.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod index;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::{ConnectionTarget, DatabaseType};
pub use index::{IndexedFragment, ScoredFragment};
pub use query::{
    DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_ROW_LIMIT, ExecutionResult, GeneratedQuery, MAX_ROW_LIMIT,
};
pub use schema::{ColumnInfo, ForeignKey, SchemaFragment};
