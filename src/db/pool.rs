//! Connection pool management.
//!
//! The session talks to exactly one database at a time. This module opens a
//! backend-specific pool (PgPool, SqlitePool) for a [`ConnectionTarget`] so
//! that each backend keeps full type support.

use crate::error::{ExplorerError, ExplorerResult};
use crate::models::{ConnectionTarget, DatabaseType};
use sqlx::{
    PgPool, SqlitePool, postgres::PgPoolOptions, sqlite::SqliteConnectOptions,
    sqlite::SqlitePoolOptions,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

/// Database-specific connection pool (avoids AnyPool limitations).
#[derive(Debug, Clone)]
pub enum DbPool {
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl DbPool {
    /// Open a pool for the given target.
    pub async fn connect(target: &ConnectionTarget) -> ExplorerResult<Self> {
        info!(
            database = %target.id,
            db_type = %target.db_type,
            url = %target.masked_connection_string(),
            "Connecting to database"
        );

        let acquire_timeout = Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS);
        let pool = match target.db_type {
            DatabaseType::PostgreSQL => {
                let pool = PgPoolOptions::new()
                    .max_connections(DEFAULT_MAX_CONNECTIONS)
                    .acquire_timeout(acquire_timeout)
                    .connect(&target.connection_string)
                    .await
                    .map_err(|e| {
                        ExplorerError::connection(
                            format!("Failed to connect: {}", e),
                            connection_suggestion(target.db_type, &e),
                        )
                    })?;
                DbPool::Postgres(pool)
            }
            DatabaseType::SQLite => {
                let options = SqliteConnectOptions::from_str(&target.connection_string)
                    .map_err(|e| {
                        ExplorerError::connection(
                            format!("Invalid SQLite connection string: {}", e),
                            "Check the connection URL format: sqlite:path/to/db.sqlite",
                        )
                    })?
                    .foreign_keys(true);

                // One connection: single-writer file, and `:memory:` databases are per-connection
                let pool = SqlitePoolOptions::new()
                    .min_connections(1)
                    .max_connections(1)
                    .acquire_timeout(acquire_timeout)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect_with(options)
                    .await
                    .map_err(|e| {
                        ExplorerError::connection(
                            format!("Failed to connect: {}", e),
                            connection_suggestion(target.db_type, &e),
                        )
                    })?;
                DbPool::SQLite(pool)
            }
        };

        if let Some(version) = pool.server_version().await {
            info!(database = %target.id, server_version = %version, "Connected successfully");
        }
        Ok(pool)
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        match self {
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::SQLite(pool) => pool.close().await,
        }
    }

    /// Get the database type for this pool.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbPool::Postgres(_) => DatabaseType::PostgreSQL,
            DbPool::SQLite(_) => DatabaseType::SQLite,
        }
    }

    /// Get the server version from the connected database.
    pub async fn server_version(&self) -> Option<String> {
        let result = match self {
            DbPool::Postgres(pool) => {
                sqlx::query_scalar::<_, String>("SELECT version()")
                    .fetch_one(pool)
                    .await
            }
            DbPool::SQLite(pool) => {
                sqlx::query_scalar::<_, String>("SELECT sqlite_version()")
                    .fetch_one(pool)
                    .await
            }
        };

        match result {
            Ok(version) => {
                debug!(version = %version, "Got server version");
                Some(version)
            }
            Err(e) => {
                warn!(error = %e, "Failed to get server version");
                None
            }
        }
    }
}

/// Pick a suggestion for a failed connection attempt.
fn connection_suggestion(db_type: DatabaseType, err: &sqlx::Error) -> &'static str {
    let msg = err.to_string().to_lowercase();
    match db_type {
        DatabaseType::SQLite if msg.contains("unable to open") => {
            "Check that the database file exists, or add ?mode=rwc to create it"
        }
        DatabaseType::SQLite => "Check the file path and permissions",
        DatabaseType::PostgreSQL if msg.contains("password") || msg.contains("authentication") => {
            "Check the username and password"
        }
        DatabaseType::PostgreSQL if msg.contains("does not exist") => {
            "Check that the database name is correct"
        }
        DatabaseType::PostgreSQL => "Check that the server is running and reachable at host:port",
    }
}
