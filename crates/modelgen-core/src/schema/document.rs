//! Raw JSON schema documents.
//!
//! A snapshot is checked structurally before typed deserialization so the
//! error can name the offending table or column instead of a serde path.

use std::path::Path;
use serde_json::Value;

use super::Schema;
use crate::diagnostic::{GeneratorError, Result};

/// Top-level keys every schema document must carry.
pub const REQUIRED_KEYS: &[&str] = &["tables", "relationships", "patterns", "indexes", "constraints"];

/// Reads and parses a schema snapshot file.
pub fn load(path: &Path) -> Result<Schema> {
    let content = std::fs::read_to_string(path).map_err(|e| GeneratorError::SchemaExtraction {
        message: format!("cannot read {}: {}", path.display(), e),
    })?;
    parse(&content)
}

/// Parses a schema snapshot from JSON text.
pub fn parse(content: &str) -> Result<Schema> {
    let mut document: Value = serde_json::from_str(content).map_err(|e| GeneratorError::SchemaExtraction {
        message: format!("schema document is not valid JSON: {}", e),
    })?;

    validate(&document)?;
    infer_primary_keys(&mut document);

    serde_json::from_value(document).map_err(|e| GeneratorError::SchemaAnalysis {
        message: e.to_string(),
    })
}

/// Column treated as the primary key when a table declares none.
pub const IMPLICIT_PRIMARY_KEY: &str = "id";

/// Marks `id` as the primary key of tables that declare no primary key.
/// The column also becomes non-null unless the document says otherwise.
fn infer_primary_keys(document: &mut Value) {
    let Some(tables) = document.get_mut("tables").and_then(Value::as_array_mut) else {
        return;
    };

    for columns in tables
        .iter_mut()
        .filter_map(|t| t.get_mut("columns"))
        .filter_map(Value::as_array_mut)
    {
        let declared = columns
            .iter()
            .any(|c| c.get("primary_key").and_then(Value::as_bool).unwrap_or(false));
        if declared {
            continue;
        }

        let implicit = columns
            .iter_mut()
            .filter_map(Value::as_object_mut)
            .find(|c| c.get("name").and_then(Value::as_str) == Some(IMPLICIT_PRIMARY_KEY));
        if let Some(column) = implicit {
            column.insert("primary_key".to_string(), Value::Bool(true));
            column
                .entry("nullable")
                .or_insert(Value::Bool(false));
        }
    }
}

/// Checks the document shape: required keys, named tables with columns, named and typed columns.
pub fn validate(document: &Value) -> Result<()> {
    let object = document.as_object().ok_or_else(|| GeneratorError::SchemaAnalysis {
        message: "schema document must be a JSON object".to_string(),
    })?;

    let missing: Vec<&str> = REQUIRED_KEYS
        .iter()
        .copied()
        .filter(|key| !object.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        return Err(GeneratorError::SchemaAnalysis {
            message: format!("schema is missing required keys: {}", missing.join(", ")),
        });
    }

    let tables = object["tables"].as_array().ok_or_else(|| GeneratorError::SchemaAnalysis {
        message: "'tables' must be an array".to_string(),
    })?;

    for (position, table) in tables.iter().enumerate() {
        let name = table
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| GeneratorError::SchemaAnalysis {
                message: format!("table at position {} must have a non-empty string name", position),
            })?;

        let columns = table
            .get("columns")
            .and_then(Value::as_array)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| GeneratorError::SchemaAnalysis {
                message: format!("table '{}' must have a non-empty columns array", name),
            })?;

        for (col_position, column) in columns.iter().enumerate() {
            let column = column.as_object().ok_or_else(|| GeneratorError::SchemaAnalysis {
                message: format!("column {} of table '{}' must be an object", col_position, name),
            })?;

            let col_name = column
                .get("name")
                .and_then(Value::as_str)
                .filter(|n| !n.trim().is_empty())
                .ok_or_else(|| GeneratorError::SchemaAnalysis {
                    message: format!("column {} of table '{}' has no name", col_position, name),
                })?;

            column
                .get("type")
                .and_then(Value::as_str)
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| GeneratorError::SchemaAnalysis {
                    message: format!("column '{}.{}' has no type", name, col_name),
                })?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "tables": [{"name": "users", "columns": [{"name": "id", "type": "integer", "nullable": false}]}],
        "relationships": {},
        "patterns": {},
        "indexes": {},
        "constraints": {}
    }"#;

    #[test]
    fn test_parse_valid_document() {
        let schema = parse(VALID).unwrap();
        assert_eq!(schema.table_names(), vec!["users".to_string()]);
        assert!(!schema.tables[0].columns[0].nullable);
    }

    #[test]
    fn test_id_is_the_implicit_primary_key() {
        let schema = parse(
            r#"{
                "tables": [
                    {"name": "users", "columns": [{"name": "id", "type": "integer"}, {"name": "email", "type": "varchar"}]},
                    {"name": "tags", "columns": [{"name": "id", "type": "integer", "nullable": true}]},
                    {"name": "pins", "columns": [{"name": "id", "type": "integer"}, {"name": "code", "type": "varchar", "primary_key": true}]}
                ],
                "relationships": {}, "patterns": {}, "indexes": {}, "constraints": {}
            }"#,
        )
        .unwrap();

        let users = schema.table("users").unwrap();
        assert!(users.columns[0].primary_key);
        assert!(!users.columns[0].nullable);
        assert!(users.columns[1].nullable);

        let tags = schema.table("tags").unwrap();
        assert!(tags.columns[0].primary_key);
        assert!(tags.columns[0].nullable);

        let pins = schema.table("pins").unwrap();
        assert!(!pins.columns[0].primary_key);
        assert!(pins.columns[1].primary_key);
    }

    #[test]
    fn test_missing_keys_are_listed() {
        let err = parse(r#"{"tables": [], "relationships": {}}"#).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("patterns"));
        assert!(message.contains("indexes"));
        assert!(message.contains("constraints"));
    }

    #[test]
    fn test_column_without_type_is_named() {
        let doc = r#"{
            "tables": [{"name": "posts", "columns": [{"name": "title"}]}],
            "relationships": {}, "patterns": {}, "indexes": {}, "constraints": {}
        }"#;
        let err = parse(doc).unwrap_err();
        assert!(err.to_string().contains("posts.title"));
    }

    #[test]
    fn test_table_without_columns() {
        let doc = r#"{
            "tables": [{"name": "posts", "columns": []}],
            "relationships": {}, "patterns": {}, "indexes": {}, "constraints": {}
        }"#;
        let err = parse(doc).unwrap_err();
        assert!(err.to_string().contains("'posts'"));
    }

    #[test]
    fn test_invalid_json() {
        let err = parse("{").unwrap_err();
        assert!(matches!(err, GeneratorError::SchemaExtraction { .. }));
    }
}
