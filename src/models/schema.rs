//! Schema-related data models.
//!
//! A [`SchemaFragment`] is the unit the rest of the pipeline works with: one
//! per user-visible table, carrying both the structured column list and the
//! free-text description that gets embedded and placed into prompts.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type as reported by the database (e.g., `varchar(30)`, `INTEGER`)
    pub data_type: String,
    pub nullable: bool,
    pub is_primary_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

impl ColumnInfo {
    /// Create a new column description.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            is_primary_key: false,
            default_value: None,
        }
    }

    /// Set whether this is a primary key column.
    pub fn with_primary_key(mut self, is_pk: bool) -> Self {
        self.is_primary_key = is_pk;
        self
    }

    /// Set the declared default expression.
    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}

impl ForeignKey {
    /// Create a new foreign key.
    pub fn new(
        column: impl Into<String>,
        references_table: impl Into<String>,
        references_column: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            references_table: references_table.into(),
            references_column: references_column.into(),
        }
    }
}

/// Textual and structured description of one table.
///
/// Immutable once produced. A new set is extracted whenever the connected
/// database changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaFragment {
    /// `<database_id>:<table_name>`
    pub id: String,
    pub table_name: String,
    pub columns: Vec<ColumnInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rows: Option<Vec<serde_json::Map<String, JsonValue>>>,
    pub description: String,
}

impl SchemaFragment {
    /// Build a fragment and render its description.
    pub fn new(
        database_id: &str,
        table_name: impl Into<String>,
        columns: Vec<ColumnInfo>,
        foreign_keys: Vec<ForeignKey>,
        sample_rows: Option<Vec<serde_json::Map<String, JsonValue>>>,
    ) -> Self {
        let table_name = table_name.into();
        let sample_rows = sample_rows.filter(|rows| !rows.is_empty());
        let description = describe(&table_name, &columns, &foreign_keys, sample_rows.as_deref());
        Self {
            id: format!("{}:{}", database_id, table_name),
            table_name,
            columns,
            foreign_keys,
            sample_rows,
            description,
        }
    }

    /// Names of the primary key columns, in declaration order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }
}

fn describe(
    table_name: &str,
    columns: &[ColumnInfo],
    foreign_keys: &[ForeignKey],
    sample_rows: Option<&[serde_json::Map<String, JsonValue>]>,
) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(out, "Table: {}", table_name);
    out.push_str("Columns:\n");
    for col in columns {
        let _ = write!(out, "- {} ({})", col.name, col.data_type);
        if col.is_primary_key {
            out.push_str(" PRIMARY KEY");
        }
        if !col.nullable {
            out.push_str(" NOT NULL");
        }
        if let Some(ref default) = col.default_value {
            let _ = write!(out, " DEFAULT {}", default);
        }
        out.push('\n');
    }

    if !foreign_keys.is_empty() {
        out.push_str("Foreign Keys:\n");
        for fk in foreign_keys {
            let _ = writeln!(
                out,
                "- {} → {}({})",
                fk.column, fk.references_table, fk.references_column
            );
        }
    }

    if let Some(rows) = sample_rows {
        out.push_str("Sample Rows:\n");
        for row in rows {
            let _ = writeln!(out, "- {}", JsonValue::Object(row.clone()));
        }
    }

    out
}
