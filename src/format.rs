//! Terminal rendering of execution results and schema fragments.

use crate::models::{ExecutionResult, SchemaFragment};
use crate::safety::GateDecision;
use clap::ValueEnum;
use serde_json::Value as JsonValue;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Widest cell before truncation with an ellipsis.
const MAX_CELL_WIDTH: usize = 60;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table with a footer, like the mysql client
    #[default]
    Table,
    Markdown,
}

pub fn render(result: &ExecutionResult, format: OutputFormat) -> String {
    match format {
        OutputFormat::Table => format_as_table(result),
        OutputFormat::Markdown => format_as_markdown(result),
    }
}

pub fn format_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn cell(value: &JsonValue) -> String {
    let text = format_value(value).replace(['\n', '\r', '\t'], " ");
    if text.width() <= MAX_CELL_WIDTH {
        return text;
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w >= MAX_CELL_WIDTH {
            break;
        }
        used += w;
        out.push(ch);
    }
    out.push('…');
    out
}

/// Left/right padding by display width, `format!` pads by `char` count.
fn pad(text: &str, width: usize, right_align: bool) -> String {
    let fill = " ".repeat(width.saturating_sub(text.width()));
    if right_align {
        format!("{}{}", fill, text)
    } else {
        format!("{}{}", text, fill)
    }
}

fn footer(result: &ExecutionResult) -> String {
    let seconds = result.elapsed_ms as f64 / 1000.0;
    if let Some(affected) = result.rows_affected {
        let noun = if affected == 1 { "row" } else { "rows" };
        return format!("Query OK, {} {} affected ({:.2} sec)", affected, noun, seconds);
    }
    let noun = if result.row_count == 1 { "row" } else { "rows" };
    let mut line = format!("{} {} in set ({:.2} sec)", result.row_count, noun, seconds);
    if result.truncated {
        line.push_str(" [truncated]");
    }
    line
}

pub fn format_as_table(result: &ExecutionResult) -> String {
    if result.columns.is_empty() {
        if result.rows_affected.is_some() {
            return footer(result) + "\n";
        }
        return format!("Empty set ({:.2} sec)\n", result.elapsed_ms as f64 / 1000.0);
    }

    let cells: Vec<Vec<(String, bool)>> = result
        .rows
        .iter()
        .map(|row| {
            result
                .columns
                .iter()
                .map(|col| {
                    let value = row.get(col).unwrap_or(&JsonValue::Null);
                    (cell(value), value.is_number())
                })
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.width()).collect();
    for row in &cells {
        for (i, (text, _)) in row.iter().enumerate() {
            widths[i] = widths[i].max(text.width());
        }
    }

    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    let mut output = separator.clone();
    for (col, w) in result.columns.iter().zip(&widths) {
        output.push_str(&format!("| {} ", pad(col, *w, false)));
    }
    output.push_str("|\n");
    output.push_str(&separator);

    for row in &cells {
        for ((text, numeric), w) in row.iter().zip(&widths) {
            output.push_str(&format!("| {} ", pad(text, *w, *numeric)));
        }
        output.push_str("|\n");
    }
    output.push_str(&separator);
    output.push_str(&footer(result));
    output.push('\n');
    output
}

pub fn format_as_markdown(result: &ExecutionResult) -> String {
    if result.columns.is_empty() {
        return format!("*{}*", footer(result));
    }

    let escape = |s: String| s.replace('|', "\\|");
    let mut output = String::new();
    output.push_str(
        &(result
            .columns
            .iter()
            .map(|c| format!("| {} ", escape(c.clone())))
            .collect::<String>()
            + "|\n"),
    );
    output.push_str(&(result.columns.iter().map(|_| "|---").collect::<String>() + "|\n"));

    for row in &result.rows {
        let line: String = result
            .columns
            .iter()
            .map(|col| {
                let value = row.get(col).unwrap_or(&JsonValue::Null);
                format!("| {} ", escape(cell(value)))
            })
            .collect();
        output.push_str(&line);
        output.push_str("|\n");
    }

    output.push_str(&format!("\n*{}*", footer(result)));
    output
}

/// Generated SQL with its gate label, e.g. `[SAFE] SELECT ...`.
pub fn format_decision(decision: &GateDecision) -> String {
    let verdict = decision.verdict();
    let mut out = format!("[{}] {}\n", verdict.label(), decision.sql());
    for finding in verdict.findings() {
        out.push_str(&format!("  ! {}\n", finding));
    }
    out
}

/// Table names with column counts, one per line.
pub fn format_table_list(fragments: &[SchemaFragment]) -> String {
    if fragments.is_empty() {
        return "No tables.\n".to_string();
    }
    let width = fragments.iter().map(|f| f.table_name.width()).max().unwrap_or(0);
    fragments
        .iter()
        .map(|f| {
            let noun = if f.columns.len() == 1 { "column" } else { "columns" };
            format!("{}  {} {}\n", pad(&f.table_name, width, false), f.columns.len(), noun)
        })
        .collect()
}

/// Icon for a declared column type. Length and precision suffixes are ignored.
pub fn column_icon(data_type: &str) -> &'static str {
    let base = data_type
        .split('(')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match base.as_str() {
        "integer" | "int" | "int2" | "int4" | "int8" | "bigint" | "smallint" | "serial"
        | "bigserial" => "🔢",
        "text" | "char" | "character" | "varchar" | "character varying" | "clob" | "name" => "📝",
        "real" | "float" | "float4" | "float8" | "double" | "double precision" | "numeric"
        | "decimal" => "📐",
        "boolean" | "bool" => "✅",
        "date" => "📅",
        "time" | "timestamp" | "timestamptz" | "time without time zone"
        | "timestamp without time zone" | "timestamp with time zone" => "⏱",
        "json" | "jsonb" | "blob" | "bytea" => "📦",
        "uuid" => "🆔",
        _ => "📄",
    }
}

/// One line per column with its type icon, then the table's foreign keys.
pub fn format_columns(fragment: &SchemaFragment) -> String {
    let width = fragment.columns.iter().map(|c| c.name.width()).max().unwrap_or(0);
    let mut out = format!("{}\n", fragment.table_name);
    for col in &fragment.columns {
        let mut flags = String::new();
        if col.is_primary_key {
            flags.push_str(" PK");
        }
        if !col.nullable {
            flags.push_str(" NOT NULL");
        }
        out.push_str(&format!(
            "  {} {}  {}{}\n",
            column_icon(&col.data_type),
            pad(&col.name, width, false),
            col.data_type,
            flags
        ));
    }
    for fk in &fragment.foreign_keys {
        out.push_str(&format!(
            "  {} -> {}.{}\n",
            fk.column, fk.references_table, fk.references_column
        ));
    }
    out
}
