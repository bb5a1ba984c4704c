//! Relational schema model.
//!
//! A [`Schema`] is the snapshot every stage reads: the tables with their
//! columns, plus per-table side tables for relationships, detected patterns,
//! indexes and constraints. Side tables are keyed by table name so lookups
//! during generation are plain map reads.

pub mod discovery;
pub mod document;
pub mod sqlite;

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::diagnostic::{GeneratorError, Result};

/// A single table column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub primary_key: bool,
}

fn default_nullable() -> bool {
    true
}

impl Column {
    /// Creates a nullable column.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            default: None,
            comment: None,
            primary_key: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Whether the generated property carries the optional marker.
    pub fn is_optional(&self) -> bool {
        self.nullable && !self.primary_key
    }
}

/// A table and its columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}

/// One side of an association between two tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Property name on the owning model.
    pub name: String,
    /// Table on the other side.
    pub target_table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,
    /// Polymorphic association this side resolves through (`has_many :x, as: :y`).
    #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
    pub as_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub through: Option<String>,
}

impl Relationship {
    pub fn new(name: impl Into<String>, target_table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_table: target_table.into(),
            foreign_key: None,
            as_name: None,
            through: None,
        }
    }

    pub fn with_foreign_key(mut self, foreign_key: impl Into<String>) -> Self {
        self.foreign_key = Some(foreign_key.into());
        self
    }

    pub fn with_as(mut self, as_name: impl Into<String>) -> Self {
        self.as_name = Some(as_name.into());
        self
    }
}

/// The named side of a polymorphic association (`<name>_type` / `<name>_id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolymorphicAssociation {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_field: Option<String>,
    /// Tables allowed as targets.
    #[serde(default)]
    pub target_tables: Vec<String>,
}

impl PolymorphicAssociation {
    pub fn new(name: impl Into<String>, target_tables: Vec<String>) -> Self {
        Self {
            name: name.into(),
            type_field: None,
            id_field: None,
            target_tables,
        }
    }

    pub fn type_field(&self) -> String {
        self.type_field
            .clone()
            .unwrap_or_else(|| format!("{}_type", self.name))
    }

    pub fn id_field(&self) -> String {
        self.id_field
            .clone()
            .unwrap_or_else(|| format!("{}_id", self.name))
    }
}

/// Relationships of one table, grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableRelationships {
    #[serde(default)]
    pub belongs_to: Vec<Relationship>,
    #[serde(default)]
    pub has_many: Vec<Relationship>,
    #[serde(default)]
    pub has_one: Vec<Relationship>,
    #[serde(default)]
    pub polymorphic: Vec<PolymorphicAssociation>,
    /// Any relationship kinds this generator does not recognize.
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub unrecognized: BTreeMap<String, serde_json::Value>,
}

impl TableRelationships {
    pub fn len(&self) -> usize {
        self.belongs_to.len() + self.has_many.len() + self.has_one.len() + self.polymorphic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of relationship kinds outside belongs_to/has_many/has_one/polymorphic.
    pub fn unrecognized_kinds(&self) -> Vec<&str> {
        self.unrecognized.keys().map(String::as_str).collect()
    }

    /// Whether any relationship on this table points at `table`.
    pub fn references(&self, table: &str, foreign_key: Option<&str>) -> bool {
        self.has_many
            .iter()
            .chain(self.has_one.iter())
            .any(|r| r.target_table == table && (foreign_key.is_none() || r.foreign_key.as_deref() == foreign_key))
    }
}

/// Structural patterns detected on a table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TablePatterns {
    /// Column marking soft-deleted rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soft_deletion: Option<String>,
    #[serde(default)]
    pub timestamps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positioning: Option<String>,
    #[serde(default)]
    pub user_tracking: Vec<String>,
}

impl TablePatterns {
    pub fn is_empty(&self) -> bool {
        self.soft_deletion.is_none()
            && self.timestamps.is_empty()
            && self.positioning.is_none()
            && self.user_tracking.is_empty()
    }

    /// Fills unset fields from `detected`; declared values win.
    pub fn merge_detected(&mut self, detected: TablePatterns) {
        if self.soft_deletion.is_none() {
            self.soft_deletion = detected.soft_deletion;
        }
        if self.positioning.is_none() {
            self.positioning = detected.positioning;
        }
        for ts in detected.timestamps {
            if !self.timestamps.contains(&ts) {
                self.timestamps.push(ts);
            }
        }
        for col in detected.user_tracking {
            if !self.user_tracking.contains(&col) {
                self.user_tracking.push(col);
            }
        }
    }
}

/// An index on a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

/// Kind of a table constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Check,
    Unique,
    ForeignKey,
    PrimaryKey,
    #[serde(other)]
    Other,
}

/// A table constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub kind: ConstraintKind,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

impl ConstraintDef {
    /// Values of a `CHECK (col IN ('a', 'b'))` constraint, if it has that shape.
    pub fn enum_values(&self) -> Option<Vec<String>> {
        if self.kind != ConstraintKind::Check {
            return None;
        }
        let expression = self.expression.as_deref()?;
        let caps = in_list_regex()?.captures(expression)?;
        let values: Vec<String> = caps[1]
            .split(',')
            .map(|v| v.trim().trim_matches('\'').trim_matches('"').to_string())
            .filter(|v| !v.is_empty())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values)
        }
    }
}

fn in_list_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bIN\s*\(([^)]*)\)").ok()).as_ref()
}

/// Full multi-table schema snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub tables: Vec<Table>,
    pub relationships: BTreeMap<String, TableRelationships>,
    pub patterns: BTreeMap<String, TablePatterns>,
    pub indexes: BTreeMap<String, Vec<IndexDef>>,
    pub constraints: BTreeMap<String, Vec<ConstraintDef>>,
}

impl Schema {
    pub fn new(tables: Vec<Table>) -> Self {
        Self {
            tables,
            ..Default::default()
        }
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }

    pub fn relationships_for(&self, table: &str) -> Option<&TableRelationships> {
        self.relationships.get(table)
    }

    pub fn patterns_for(&self, table: &str) -> Option<&TablePatterns> {
        self.patterns.get(table)
    }

    pub fn indexes_for(&self, table: &str) -> &[IndexDef] {
        self.indexes.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn constraints_for(&self, table: &str) -> &[ConstraintDef] {
        self.constraints.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `column` on `table` is covered by a single-column unique index.
    pub fn is_unique_column(&self, table: &str, column: &str) -> bool {
        self.indexes_for(table)
            .iter()
            .any(|i| i.unique && i.columns.len() == 1 && i.columns[0] == column)
    }

    /// Returns a copy holding only the tables `keep` accepts, with side tables trimmed to match.
    pub fn retain_tables(&self, keep: impl Fn(&str) -> bool) -> Schema {
        let tables: Vec<Table> = self
            .tables
            .iter()
            .filter(|t| keep(&t.name))
            .cloned()
            .collect();

        Schema {
            tables,
            relationships: filter_map(&self.relationships, &keep),
            patterns: filter_map(&self.patterns, &keep),
            indexes: filter_map(&self.indexes, &keep),
            constraints: filter_map(&self.constraints, &keep),
        }
    }

    /// Checks every table has a name and columns, and every column a name and type.
    pub fn validate_integrity(&self) -> Result<()> {
        for (position, table) in self.tables.iter().enumerate() {
            if table.name.trim().is_empty() {
                return Err(GeneratorError::SchemaAnalysis {
                    message: format!("table at position {} has no name", position),
                });
            }
            if table.columns.is_empty() {
                return Err(GeneratorError::SchemaAnalysis {
                    message: format!("table '{}' has no columns", table.name),
                });
            }
            for (col_position, column) in table.columns.iter().enumerate() {
                if column.name.trim().is_empty() {
                    return Err(GeneratorError::SchemaAnalysis {
                        message: format!(
                            "column at position {} of table '{}' has no name",
                            col_position, table.name
                        ),
                    });
                }
                if column.data_type.trim().is_empty() {
                    return Err(GeneratorError::SchemaAnalysis {
                        message: format!(
                            "column '{}.{}' has no type",
                            table.name, column.name
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

fn filter_map<V: Clone>(
    map: &BTreeMap<String, V>,
    keep: &impl Fn(&str) -> bool,
) -> BTreeMap<String, V> {
    map.iter()
        .filter(|(k, _)| keep(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Table {
        Table::new(
            "users",
            vec![
                Column::new("id", "integer").primary_key(),
                Column::new("email", "string").not_null(),
            ],
        )
    }

    #[test]
    fn test_column_optional_marker() {
        assert!(!Column::new("id", "integer").primary_key().is_optional());
        assert!(!Column::new("email", "string").not_null().is_optional());
        assert!(Column::new("name", "string").is_optional());
    }

    #[test]
    fn test_column_json_defaults_to_nullable() {
        let col: Column = serde_json::from_str(r#"{"name": "title", "type": "string"}"#).unwrap();
        assert!(col.nullable);
        assert_eq!(col.data_type, "string");
    }

    #[test]
    fn test_unrecognized_relationship_kinds_are_kept() {
        let rels: TableRelationships = serde_json::from_str(
            r#"{"belongs_to": [], "has_and_belongs_to_many": [{"name": "tags", "target_table": "tags"}]}"#,
        )
        .unwrap();
        assert_eq!(rels.unrecognized_kinds(), vec!["has_and_belongs_to_many"]);
        assert!(rels.is_empty());
    }

    #[test]
    fn test_enum_values_from_check_constraint() {
        let constraint = ConstraintDef {
            name: None,
            kind: ConstraintKind::Check,
            columns: vec!["status".to_string()],
            expression: Some("status IN ('open', 'closed')".to_string()),
        };
        assert_eq!(
            constraint.enum_values(),
            Some(vec!["open".to_string(), "closed".to_string()])
        );
    }

    #[test]
    fn test_retain_tables_trims_side_tables() {
        let mut schema = Schema::new(vec![users(), Table::new("posts", vec![Column::new("id", "integer")])]);
        schema.relationships.insert("posts".to_string(), TableRelationships::default());
        schema.patterns.insert("users".to_string(), TablePatterns::default());

        let filtered = schema.retain_tables(|name| name != "posts");
        assert_eq!(filtered.table_names(), vec!["users".to_string()]);
        assert!(filtered.relationships.is_empty());
        assert!(filtered.patterns.contains_key("users"));
    }

    #[test]
    fn test_integrity_names_offending_column() {
        let schema = Schema::new(vec![Table::new("users", vec![Column::new("email", "")])]);
        let err = schema.validate_integrity().unwrap_err();
        assert!(err.to_string().contains("users.email"));
    }

    #[test]
    fn test_integrity_rejects_empty_table() {
        let schema = Schema::new(vec![Table::new("users", vec![])]);
        let err = schema.validate_integrity().unwrap_err();
        assert!(matches!(err, GeneratorError::SchemaAnalysis { .. }));
    }
}
