//! Row decoding.
//!
//! Result rows are turned into JSON maps so that results from either backend
//! can be rendered, serialized, and embedded in schema samples alike.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders handle the actual value extraction

use crate::models::DatabaseType;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    /// SQLite expression columns with no declared type
    Null,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    if lower == "null" {
        return TypeCategory::Null;
    }

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if db == DatabaseType::SQLite {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower.contains("int") || lower.contains("serial") {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.contains("char") || lower.contains("text") || lower == "name" {
        return TypeCategory::Text;
    }

    // Dates, times, enums and everything else go through text decoding
    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

// =============================================================================
// Binary Encoding
// =============================================================================

/// Decode binary data to JSON value.
///
/// Valid UTF-8 is returned as text, anything else as base64.
pub fn decode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    match std::str::from_utf8(bytes) {
        Ok(s) => JsonValue::String(s.to_string()),
        Err(_) => JsonValue::String(STANDARD.encode(bytes)),
    }
}

// =============================================================================
// Row to JSON Trait
// =============================================================================

/// Trait for converting database rows to JSON maps.
pub trait RowToJson {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue>;
    fn column_names(&self) -> Vec<String>;
}

impl RowToJson for PgRow {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name(), DatabaseType::PostgreSQL);
                let value = postgres::decode_column(self, idx, category);
                (col.name().to_string(), value)
            })
            .collect()
    }

    fn column_names(&self) -> Vec<String> {
        self.columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect()
    }
}

impl RowToJson for SqliteRow {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let declared = col.type_info().name();
                let value = sqlite::decode_column(self, idx, declared);
                (col.name().to_string(), value)
            })
            .collect()
    }

    fn column_names(&self) -> Vec<String> {
        self.columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect()
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary_col(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Uuid => decode_uuid(row, idx),
            _ => decode_text(row, idx),
        }
    }

    fn decode_decimal(row: &PgRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(Some(v)) => JsonValue::String(v.0),
            Ok(None) => JsonValue::Null,
            Err(e) => {
                tracing::error!("Failed to decode NUMERIC: {:?}", e);
                JsonValue::Null
            }
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        JsonValue::Null
    }

    fn decode_boolean(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::Bool)
            .unwrap_or(JsonValue::Null)
    }

    fn decode_float(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return float_value(v as f64);
        }
        JsonValue::Null
    }

    fn decode_binary_col(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| decode_binary_value(&v))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_json(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<serde_json::Value>, _>(idx)
            .ok()
            .flatten()
            .unwrap_or(JsonValue::Null)
    }

    fn decode_uuid(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::String)
            .unwrap_or(JsonValue::Null)
    }

    fn decode_text(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
            return JsonValue::String(v);
        }
        // Dates and timestamps do not decode as String
        if let Ok(Some(v)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
            return JsonValue::String(v.to_rfc3339());
        }
        if let Ok(Some(v)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
            return JsonValue::String(v.to_string());
        }
        if let Ok(Some(v)) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
            return JsonValue::String(v.to_string());
        }
        if let Ok(Some(v)) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
            return JsonValue::String(v.to_string());
        }
        JsonValue::Null
    }
}

mod sqlite {
    use super::*;

    pub fn decode_column(row: &SqliteRow, idx: usize, declared: &str) -> JsonValue {
        let Ok(raw) = row.try_get_raw(idx) else {
            return JsonValue::Null;
        };
        if raw.is_null() {
            return JsonValue::Null;
        }

        // SQLite is dynamically typed: fall back to the stored value's type
        // when the column has no usable declared type.
        let mut category = categorize_type(declared, DatabaseType::SQLite);
        if matches!(category, TypeCategory::Null | TypeCategory::Unknown) {
            let storage = raw.type_info().name().to_string();
            category = categorize_type(&storage, DatabaseType::SQLite);
        }

        match category {
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float | TypeCategory::Decimal => decode_float(row, idx),
            TypeCategory::Binary => decode_binary_col(row, idx),
            _ => decode_text(row, idx, declared),
        }
    }

    fn decode_integer(row: &SqliteRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        // Declared INTEGER columns may still hold text or real values
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        decode_text(row, idx, "")
    }

    fn decode_boolean(row: &SqliteRow, idx: usize) -> JsonValue {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::Bool)
            .unwrap_or(JsonValue::Null)
    }

    fn decode_float(row: &SqliteRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        decode_text(row, idx, "")
    }

    fn decode_binary_col(row: &SqliteRow, idx: usize) -> JsonValue {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| decode_binary_value(&v))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_text(row: &SqliteRow, idx: usize, declared: &str) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
            if declared.to_lowercase().contains("json") {
                if let Ok(json) = serde_json::from_str::<JsonValue>(&v) {
                    return json;
                }
            }
            return JsonValue::String(v);
        }
        JsonValue::Null
    }
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}
