//! SQL column type to TypeScript type mapping.

use crate::diagnostic::{GeneratorError, Result};
use crate::naming::model_name;
use crate::registry::Service;
use crate::schema::Column;

const NUMBER_TYPES: &[&str] = &[
    "int", "int2", "int4", "int8", "integer", "smallint", "bigint", "tinyint", "mediumint",
    "serial", "smallserial", "bigserial", "numeric", "decimal", "float", "float4", "float8",
    "double", "double precision", "real", "money",
];

const STRING_TYPES: &[&str] = &[
    "string", "varchar", "character varying", "char", "character", "nchar", "nvarchar", "text",
    "citext", "clob", "uuid", "inet", "cidr", "macaddr", "date", "time", "timetz", "datetime",
    "timestamp", "timestamptz", "timestamp without time zone", "timestamp with time zone",
    "time without time zone", "time with time zone", "interval", "blob", "bytea", "binary", "xml",
];

const BOOLEAN_TYPES: &[&str] = &["bool", "boolean"];

const JSON_TYPES: &[&str] = &["json", "jsonb"];

/// TypeScript type for JSON columns.
pub const JSON_TS_TYPE: &str = "Record<string, unknown>";

/// Maps SQL types to TypeScript types.
#[derive(Debug, Clone, Default)]
pub struct TypeMapper {
    strict: bool,
}

impl TypeMapper {
    /// `strict` turns unrecognized types into errors instead of `unknown`.
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    /// Maps one column. `enum_values` come from a `CHECK (col IN (...))`
    /// constraint and produce a string-literal union.
    pub fn map_column(&self, table: &str, column: &Column, enum_values: Option<&[String]>) -> Result<String> {
        let sql_type = column.data_type.trim();
        if sql_type.is_empty() {
            return Err(GeneratorError::TypeMapping {
                table: table.to_string(),
                column: column.name.clone(),
                sql_type: column.data_type.clone(),
                message: "column has no type".to_string(),
            });
        }

        if let Some(values) = enum_values.filter(|v| !v.is_empty()) {
            return Ok(literal_union(values));
        }

        self.map_type(sql_type).ok_or_else(|| GeneratorError::TypeMapping {
            table: table.to_string(),
            column: column.name.clone(),
            sql_type: column.data_type.clone(),
            message: "unrecognized SQL type".to_string(),
        })
    }

    /// Maps a bare SQL type. `None` only in strict mode for unknown types.
    pub fn map_type(&self, sql_type: &str) -> Option<String> {
        let normalized = normalize(sql_type);

        if let Some(inner) = normalized.strip_suffix("[]") {
            return self.map_type(inner).map(|t| array_of(&t));
        }
        if let Some(inner) = normalized.strip_prefix('_') {
            return self.map_type(inner).map(|t| array_of(&t));
        }

        let base = normalized.as_str();
        let mapped = if NUMBER_TYPES.contains(&base) {
            "number"
        } else if STRING_TYPES.contains(&base) || base.starts_with("enum") {
            "string"
        } else if BOOLEAN_TYPES.contains(&base) {
            "boolean"
        } else if JSON_TYPES.contains(&base) {
            JSON_TS_TYPE
        } else if self.strict {
            return None;
        } else {
            tracing::debug!(sql_type, "unrecognized SQL type mapped to unknown");
            "unknown"
        };
        Some(mapped.to_string())
    }

    /// Name of the data interface generated for a table (`users` -> `UserData`).
    pub fn interface_name(&self, table: &str) -> String {
        format!("{}Data", model_name(table))
    }
}

impl Service for TypeMapper {}

/// Lower-cases, drops size/precision suffixes and collapses whitespace.
fn normalize(sql_type: &str) -> String {
    let mut stripped = String::with_capacity(sql_type.len());
    let mut depth = 0usize;
    for c in sql_type.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => stripped.push(c),
            _ => {}
        }
    }
    stripped
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace(" []", "[]")
}

fn array_of(ts_type: &str) -> String {
    if ts_type.contains('|') || ts_type.contains('<') {
        format!("({})[]", ts_type)
    } else {
        format!("{}[]", ts_type)
    }
}

fn literal_union(values: &[String]) -> String {
    values
        .iter()
        .map(|v| format!("'{}'", v.replace('\'', "\\'")))
        .collect::<Vec<_>>()
        .join(" | ")
}
