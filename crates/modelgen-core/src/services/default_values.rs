//! Converts database column defaults to TypeScript literals.

use std::rc::Rc;

use serde_json::Value;

use super::TypeMapper;
use crate::diagnostic::Result;
use crate::registry::Service;
use crate::schema::{Column, Table};
use crate::services::type_mapper::JSON_TS_TYPE;

/// SQL expressions evaluated by the database; they have no client-side literal.
const DATABASE_FUNCTIONS: &[&str] = &[
    "current_timestamp",
    "current_date",
    "current_time",
    "localtimestamp",
    "localtime",
    "now",
    "null",
];

#[derive(Debug, Clone)]
pub struct DefaultValueConverter {
    mapper: Rc<TypeMapper>,
}

impl DefaultValueConverter {
    pub fn new(mapper: Rc<TypeMapper>) -> Self {
        Self { mapper }
    }

    /// Literal defaults for every column that has one, as `(column, literal)`.
    pub fn defaults_for(&self, table: &Table) -> Result<Vec<(String, String)>> {
        let mut defaults = Vec::new();
        for column in &table.columns {
            if column.primary_key {
                continue;
            }
            if let Some(literal) = self.convert(&table.name, column)? {
                defaults.push((column.name.clone(), literal));
            }
        }
        Ok(defaults)
    }

    /// The TypeScript literal for a column's default, if it has a static one.
    pub fn convert(&self, table: &str, column: &Column) -> Result<Option<String>> {
        let Some(default) = &column.default else {
            return Ok(None);
        };
        let ts_type = self.mapper.map_column(table, column, None)?;
        Ok(convert_value(default, &ts_type))
    }
}

impl Service for DefaultValueConverter {}

fn convert_value(value: &Value, ts_type: &str) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => convert_expression(s, ts_type),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

fn convert_expression(raw: &str, ts_type: &str) -> Option<String> {
    let expr = strip_cast(raw.trim());
    if expr.is_empty() {
        return None;
    }

    let lower = expr.to_lowercase();
    if expr.contains('(') || DATABASE_FUNCTIONS.contains(&lower.as_str()) {
        return None;
    }

    if let Some(inner) = unquote(expr) {
        return match ts_type {
            "number" => inner.parse::<f64>().ok().map(|_| inner.to_string()),
            "boolean" => parse_bool(inner).map(|b| b.to_string()),
            t if t == JSON_TS_TYPE || t.ends_with("[]") => json_literal(inner, ts_type),
            _ => Some(quote(inner)),
        };
    }

    match ts_type {
        "number" => expr.parse::<f64>().ok().map(|_| expr.to_string()),
        "boolean" => parse_bool(expr).map(|b| b.to_string()),
        t if t == JSON_TS_TYPE || t.ends_with("[]") => json_literal(expr, ts_type),
        _ => Some(quote(expr)),
    }
}

/// `'draft'::character varying` -> `'draft'`.
fn strip_cast(expr: &str) -> &str {
    match expr.rfind("::") {
        Some(idx) if !expr[idx..].contains('\'') => expr[..idx].trim(),
        _ => expr,
    }
}

fn unquote(expr: &str) -> Option<&str> {
    expr.strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| expr.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace("''", "'").replace('\'', "\\'"))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "t" | "1" => Some(true),
        "false" | "f" | "0" => Some(false),
        _ => None,
    }
}

fn json_literal(s: &str, ts_type: &str) -> Option<String> {
    match s.trim() {
        "{}" if ts_type.ends_with("[]") => Some("[]".to_string()),
        "{}" => Some("{}".to_string()),
        "[]" => Some("[]".to_string()),
        other => serde_json::from_str::<Value>(other).ok().map(|v| v.to_string()),
    }
}
