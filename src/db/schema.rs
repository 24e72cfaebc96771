//! Schema extraction.
//!
//! Introspects the connected database and produces one [`SchemaFragment`] per
//! user-visible table, ordered by table name.
//!
//! # Architecture
//!
//! SQL queries are organized in the `queries` submodule with constants for each
//! database type. Database-specific implementations are in their respective
//! submodules (postgres, sqlite), each providing the same interface.

use crate::db::pool::DbPool;
use crate::db::types::RowToJson;
use crate::error::{ExplorerError, ExplorerResult};
use crate::models::{ColumnInfo, ForeignKey, SchemaFragment};
use crate::settings::ExtractorSettings;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

type SampleRows = Vec<serde_json::Map<String, JsonValue>>;

/// Structure of one table before it is rendered into a fragment.
#[derive(Debug, Clone)]
struct TableShape {
    name: String,
    columns: Vec<ColumnInfo>,
    foreign_keys: Vec<ForeignKey>,
}

/// Schema extractor for database introspection.
pub struct SchemaExtractor;

impl SchemaExtractor {
    /// Extract one fragment per table.
    ///
    /// Fails with `Connection` when introspection queries cannot run and with
    /// `EmptySchema` when the database has no tables.
    pub async fn extract(
        pool: &DbPool,
        database_id: &str,
        settings: &ExtractorSettings,
    ) -> ExplorerResult<Vec<SchemaFragment>> {
        let tables = Self::list_tables(pool, settings.include_views).await?;
        if tables.is_empty() {
            return Err(ExplorerError::empty_schema(database_id));
        }

        let mut fragments = Vec::with_capacity(tables.len());
        for table in &tables {
            let shape = Self::describe_table(pool, table).await?;
            if shape.columns.is_empty() {
                debug!(table = %table, "Skipping table without columns");
                continue;
            }
            let samples = Self::sample_rows(pool, table, settings.sample_rows).await;
            fragments.push(SchemaFragment::new(
                database_id,
                shape.name,
                shape.columns,
                shape.foreign_keys,
                samples,
            ));
        }

        info!(
            database = %database_id,
            tables = fragments.len(),
            "Extracted schema"
        );
        Ok(fragments)
    }

    /// List table names in name order.
    pub async fn list_tables(pool: &DbPool, include_views: bool) -> ExplorerResult<Vec<String>> {
        let result = match pool {
            DbPool::Postgres(p) => postgres::list_tables(p, include_views).await,
            DbPool::SQLite(p) => sqlite::list_tables(p, include_views).await,
        };
        result.map_err(introspection_error)
    }

    async fn describe_table(pool: &DbPool, table_name: &str) -> ExplorerResult<TableShape> {
        let result = match pool {
            DbPool::Postgres(p) => postgres::describe_table(p, table_name).await,
            DbPool::SQLite(p) => sqlite::describe_table(p, table_name).await,
        };
        result.map_err(introspection_error)
    }

    /// First `limit` rows of a table. Samples are optional: failures are logged.
    async fn sample_rows(pool: &DbPool, table_name: &str, limit: u32) -> Option<SampleRows> {
        if limit == 0 {
            return None;
        }

        let sql = format!("SELECT * FROM {} LIMIT {}", quote_ident(table_name), limit);
        let result = match pool {
            DbPool::Postgres(p) => sqlx::query(&sql)
                .fetch_all(p)
                .await
                .map(|rows| rows.iter().map(|r| r.to_json_map()).collect::<SampleRows>()),
            DbPool::SQLite(p) => sqlx::query(&sql)
                .fetch_all(p)
                .await
                .map(|rows| rows.iter().map(|r| r.to_json_map()).collect::<SampleRows>()),
        };

        match result {
            Ok(rows) => Some(rows),
            Err(e) => {
                warn!(table = %table_name, error = %e, "Failed to sample rows");
                None
            }
        }
    }
}

fn introspection_error(err: sqlx::Error) -> ExplorerError {
    ExplorerError::connection(
        format!("Schema introspection failed: {}", err),
        "Check that the connection is still alive and the user can read the catalog",
    )
}

/// Quote an identifier with double quotes (valid for both backends).
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

// =============================================================================
// SQL Query Templates
// =============================================================================

mod queries {
    pub mod postgres {
        pub const LIST_TABLES_WITH_VIEWS: &str = r#"
            SELECT table_name::text AS table_name
            FROM information_schema.tables
            WHERE table_schema = 'public'
            AND table_type IN ('BASE TABLE', 'VIEW')
            ORDER BY table_name
            "#;

        pub const LIST_TABLES_NO_VIEWS: &str = r#"
            SELECT table_name::text AS table_name
            FROM information_schema.tables
            WHERE table_schema = 'public'
            AND table_type = 'BASE TABLE'
            ORDER BY table_name
            "#;

        pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            c.column_name::text AS column_name,
            format_type(a.atttypid, a.atttypmod) AS column_type,
            c.is_nullable::text AS is_nullable,
            c.column_default::text AS column_default,
            CASE WHEN pk.column_name IS NOT NULL THEN true ELSE false END AS is_primary_key
        FROM information_schema.columns c
        JOIN pg_class t ON t.relname = c.table_name
        JOIN pg_namespace n ON n.oid = t.relnamespace AND n.nspname = c.table_schema
        JOIN pg_attribute a ON a.attrelid = t.oid AND a.attname = c.column_name
        LEFT JOIN (
            SELECT kcu.column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            WHERE tc.table_name = $1
            AND tc.table_schema = 'public'
            AND tc.constraint_type = 'PRIMARY KEY'
        ) pk ON c.column_name = pk.column_name
        WHERE c.table_name = $1 AND c.table_schema = 'public'
        ORDER BY c.ordinal_position
        "#;

        pub const DESCRIBE_FOREIGN_KEYS: &str = r#"
        SELECT
            kcu.column_name::text AS column_name,
            ccu.table_name::text AS foreign_table_name,
            ccu.column_name::text AS foreign_column_name
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
        JOIN information_schema.constraint_column_usage ccu
            ON ccu.constraint_name = tc.constraint_name
            AND ccu.table_schema = tc.table_schema
        WHERE tc.table_name = $1
        AND tc.table_schema = 'public'
        AND tc.constraint_type = 'FOREIGN KEY'
        ORDER BY kcu.ordinal_position
        "#;
    }

    pub mod sqlite {
        pub const LIST_TABLES_WITH_VIEWS: &str = r#"
            SELECT name FROM sqlite_master
            WHERE type IN ('table', 'view')
            AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#;

        pub const LIST_TABLES_NO_VIEWS: &str = r#"
            SELECT name FROM sqlite_master
            WHERE type = 'table'
            AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#;
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod postgres {
    use super::*;
    use sqlx::{PgPool, Row};

    pub async fn list_tables(pool: &PgPool, include_views: bool) -> Result<Vec<String>, sqlx::Error> {
        let query = if include_views {
            queries::postgres::LIST_TABLES_WITH_VIEWS
        } else {
            queries::postgres::LIST_TABLES_NO_VIEWS
        };

        let rows = sqlx::query(query).fetch_all(pool).await?;
        let tables = rows
            .iter()
            .map(|row| row.try_get::<String, _>("table_name"))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(count = tables.len(), "Listed PostgreSQL tables");
        Ok(tables)
    }

    pub(super) async fn describe_table(
        pool: &PgPool,
        table_name: &str,
    ) -> Result<TableShape, sqlx::Error> {
        let rows = sqlx::query(queries::postgres::DESCRIBE_COLUMNS)
            .bind(table_name)
            .fetch_all(pool)
            .await?;

        let columns = rows
            .iter()
            .map(|row| {
                let name: String = row.try_get("column_name")?;
                let column_type: String = row.try_get("column_type")?;
                let nullable: String = row.try_get("is_nullable")?;
                let default_value: Option<String> = row.try_get("column_default")?;
                let is_pk: bool = row.try_get("is_primary_key")?;

                let mut col =
                    ColumnInfo::new(name, column_type, nullable == "YES").with_primary_key(is_pk);
                if let Some(def) = default_value {
                    col = col.with_default(def);
                }
                Ok(col)
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        let fk_rows = sqlx::query(queries::postgres::DESCRIBE_FOREIGN_KEYS)
            .bind(table_name)
            .fetch_all(pool)
            .await?;

        let foreign_keys = fk_rows
            .iter()
            .map(|row| {
                Ok(ForeignKey::new(
                    row.try_get::<String, _>("column_name")?,
                    row.try_get::<String, _>("foreign_table_name")?,
                    row.try_get::<String, _>("foreign_column_name")?,
                ))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(TableShape {
            name: table_name.to_string(),
            columns,
            foreign_keys,
        })
    }
}

mod sqlite {
    use super::*;
    use sqlx::{Row, SqlitePool};

    pub async fn list_tables(
        pool: &SqlitePool,
        include_views: bool,
    ) -> Result<Vec<String>, sqlx::Error> {
        let query = if include_views {
            queries::sqlite::LIST_TABLES_WITH_VIEWS
        } else {
            queries::sqlite::LIST_TABLES_NO_VIEWS
        };

        let rows = sqlx::query(query).fetch_all(pool).await?;
        let tables = rows
            .iter()
            .map(|row| row.try_get::<String, _>("name"))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(count = tables.len(), "Listed SQLite tables");
        Ok(tables)
    }

    pub(super) async fn describe_table(
        pool: &SqlitePool,
        table_name: &str,
    ) -> Result<TableShape, sqlx::Error> {
        let pragma_query = format!("PRAGMA table_info({})", quote_ident(table_name));
        let rows = sqlx::query(&pragma_query).fetch_all(pool).await?;

        let columns = rows
            .iter()
            .map(|row| {
                let name: String = row.try_get("name")?;
                let data_type: String = row.try_get("type")?;
                let notnull: i64 = row.try_get("notnull")?;
                let default_value: Option<String> = row.try_get("dflt_value").ok().flatten();
                let pk: i64 = row.try_get("pk")?;

                let mut col = ColumnInfo::new(name, data_type, notnull == 0).with_primary_key(pk > 0);
                if let Some(def) = default_value {
                    col = col.with_default(def);
                }
                Ok(col)
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        let fk_query = format!("PRAGMA foreign_key_list({})", quote_ident(table_name));
        let fk_rows = sqlx::query(&fk_query).fetch_all(pool).await?;

        let foreign_keys = fk_rows
            .iter()
            .map(|row| {
                let column: String = row.try_get("from")?;
                let ref_table: String = row.try_get("table")?;
                // `to` is NULL when the reference targets the implicit primary key
                let ref_column: Option<String> = row.try_get("to")?;
                Ok(ForeignKey::new(
                    column,
                    ref_table,
                    ref_column.unwrap_or_else(|| "rowid".to_string()),
                ))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(TableShape {
            name: table_name.to_string(),
            columns,
            foreign_keys,
        })
    }
}
