//! SQL Explorer Library
//!
//! Ask questions about a SQL database (SQLite, PostgreSQL) in plain English.
//! The schema is extracted and embedded into a per-database vector index; the
//! tables most relevant to a question are placed into a prompt for a
//! language model, and the SQL it returns passes a safety gate before it is
//! executed.

pub mod auth;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod format;
pub mod index;
pub mod llm;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod safety;
pub mod settings;
pub mod transport;

pub use config::Config;
pub use error::{ExplorerError, ExplorerResult};
pub use pipeline::Session;
pub use settings::Settings;
