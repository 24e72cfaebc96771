//! Error types for the SQL explorer.
//!
//! All failures in the question-to-result pipeline are expressed as one
//! `thiserror` enum. Each variant carries enough context to be shown to the
//! user verbatim, and most carry a suggestion for what to try next.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExplorerError {
    /// The database cannot be reached or introspected. Fatal to the session.
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    /// The connected database has no user-visible tables.
    #[error("Database '{database}' has no tables")]
    EmptySchema { database: String },

    /// The language model call failed or returned nothing usable.
    #[error("SQL generation failed: {message}")]
    Generation { message: String },

    /// The database rejected the statement. The message is the driver's own.
    #[error("Query execution failed: {message}")]
    Execution {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("Query blocked by safety gate: {}. Confirm explicitly to run it anyway.", reasons.join("; "))]
    QueryBlocked { reasons: Vec<String> },

    #[error("No database connected")]
    NotConnected,

    #[error("Vector index error: {message}")]
    Index { message: String },

    #[error("Embedding error: {message}")]
    Embedding { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File error: {message} (path: {path})")]
    FileIo { path: String, message: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ExplorerError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn empty_schema(database: impl Into<String>) -> Self {
        Self::EmptySchema {
            database: database.into(),
        }
    }

    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
        }
    }

    /// Create an execution error with optional SQL state.
    pub fn execution(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Execution {
            message: message.into(),
            sql_state,
        }
    }

    pub fn query_blocked(reasons: Vec<String>) -> Self {
        Self::QueryBlocked { reasons }
    }

    pub fn index(message: impl Into<String>) -> Self {
        Self::Index {
            message: message.into(),
        }
    }

    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn file_io(path: impl AsRef<std::path::Path>, err: impl std::fmt::Display) -> Self {
        Self::FileIo {
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::EmptySchema { .. } => {
                Some("Create at least one table; questions will be answered without schema context")
            }
            Self::Generation { .. } => Some("Rephrase the question or try again"),
            Self::Execution { .. } => Some("Edit the SQL and run it again"),
            Self::QueryBlocked { .. } => Some("Review the statement, then confirm or cancel it"),
            Self::NotConnected => Some("Connect to a database first"),
            Self::Index { .. } => Some("Rebuild the schema index"),
            _ => None,
        }
    }

    /// Whether the session must be abandoned after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Stable machine-readable label for this error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::EmptySchema { .. } => "empty_schema",
            Self::Generation { .. } => "generation",
            Self::Execution { .. } => "execution",
            Self::QueryBlocked { .. } => "query_blocked",
            Self::NotConnected => "not_connected",
            Self::Index { .. } => "index",
            Self::Embedding { .. } => "embedding",
            Self::Config { .. } => "config",
            Self::FileIo { .. } => "file_io",
            Self::Timeout { .. } => "timeout",
            Self::InvalidInput { .. } => "invalid_input",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Convert sqlx errors to ExplorerError.
///
/// This is the connection-layer view. The schema extractor and the executor
/// re-map driver errors to their own kinds.
impl From<sqlx::Error> for ExplorerError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => ExplorerError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                ExplorerError::execution(db_err.message(), code)
            }
            sqlx::Error::PoolTimedOut => ExplorerError::timeout("connection pool acquire", 30),
            sqlx::Error::PoolClosed => {
                ExplorerError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => ExplorerError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => ExplorerError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => ExplorerError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnDecode { index, source } => {
                ExplorerError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => {
                ExplorerError::internal(format!("Decode error: {}", source))
            }
            sqlx::Error::WorkerCrashed => ExplorerError::internal("Database worker crashed"),
            _ => ExplorerError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for pipeline operations.
pub type ExplorerResult<T> = Result<T, ExplorerError>;
