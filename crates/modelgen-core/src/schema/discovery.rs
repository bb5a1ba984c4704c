//! Relationship and pattern discovery over a whole schema.
//!
//! Declared relationships are kept as-is. Every `belongs_to` gains its
//! inverse on the parent table and every polymorphic declaration gains a
//! `has_many ... as:` on each allowed target, so per-table lookups later on
//! see both sides of each association.

use std::collections::{BTreeMap, BTreeSet};

use super::{Relationship, Schema, Table, TablePatterns, TableRelationships};

/// Columns that mark soft-deleted rows, in preference order.
pub const SOFT_DELETE_COLUMNS: &[&str] = &["discarded_at", "deleted_at"];

/// Timestamp columns maintained by the database layer.
pub const TIMESTAMP_COLUMNS: &[&str] = &["created_at", "updated_at"];

/// Columns recording which user touched a row.
pub const USER_TRACKING_COLUMNS: &[&str] = &["created_by_id", "updated_by_id"];

/// Runs relationship and pattern discovery, returning the enriched schema.
pub fn enrich(mut schema: Schema) -> Schema {
    for table in &schema.tables {
        schema.relationships.entry(table.name.clone()).or_default();
        let detected = detect_patterns(table);
        schema
            .patterns
            .entry(table.name.clone())
            .or_default()
            .merge_detected(detected);
    }

    derive_inverse_relationships(&mut schema);
    schema
}

/// Detects soft deletion, timestamps, positioning and user tracking from column names.
pub fn detect_patterns(table: &Table) -> TablePatterns {
    TablePatterns {
        soft_deletion: SOFT_DELETE_COLUMNS
            .iter()
            .find(|c| table.has_column(c))
            .map(|c| c.to_string()),
        timestamps: TIMESTAMP_COLUMNS
            .iter()
            .filter(|c| table.has_column(c))
            .map(|c| c.to_string())
            .collect(),
        positioning: table.has_column("position").then(|| "position".to_string()),
        user_tracking: USER_TRACKING_COLUMNS
            .iter()
            .filter(|c| table.has_column(c))
            .map(|c| c.to_string())
            .collect(),
    }
}

/// Names `x` for which the table has both `x_type` and `x_id` columns.
pub fn polymorphic_column_pairs(table: &Table) -> Vec<String> {
    table
        .columns
        .iter()
        .filter_map(|c| c.name.strip_suffix("_type"))
        .filter(|stem| table.has_column(&format!("{}_id", stem)))
        .map(str::to_string)
        .collect()
}

/// An inverse association waiting to be attached to `owner`.
struct Inverse {
    owner: String,
    kind: InverseKind,
    relationship: Relationship,
    /// Association on the child that produced it, used to disambiguate names.
    qualifier: String,
}

fn derive_inverse_relationships(schema: &mut Schema) {
    let mut inverses = Vec::new();

    for (table, rels) in &schema.relationships {
        for parent in &rels.belongs_to {
            let foreign_key = parent
                .foreign_key
                .clone()
                .unwrap_or_else(|| format!("{}_id", parent.name));

            let kind = if schema.is_unique_column(table, &foreign_key) {
                InverseKind::HasOne
            } else {
                InverseKind::HasMany
            };
            let name = match kind {
                InverseKind::HasOne => crate::naming::singularize(table),
                InverseKind::HasMany => table.clone(),
            };

            inverses.push(Inverse {
                owner: parent.target_table.clone(),
                kind,
                relationship: Relationship::new(name, table.clone()).with_foreign_key(foreign_key),
                qualifier: parent.name.clone(),
            });
        }

        for assoc in &rels.polymorphic {
            for target in &assoc.target_tables {
                inverses.push(Inverse {
                    owner: target.clone(),
                    kind: InverseKind::HasMany,
                    relationship: Relationship::new(table.clone(), table.clone())
                        .with_foreign_key(assoc.id_field())
                        .with_as(assoc.name.clone()),
                    qualifier: assoc.name.clone(),
                });
            }
        }
    }

    let mut seen = BTreeSet::new();
    let mut pending = Vec::new();
    for inverse in inverses {
        if schema.table(&inverse.owner).is_none() {
            continue;
        }
        let target = &inverse.relationship.target_table;
        let foreign_key = inverse.relationship.foreign_key.clone();
        let declared = schema
            .relationships
            .get(&inverse.owner)
            .is_some_and(|rels| rels.references(target, foreign_key.as_deref()));
        if declared || !seen.insert((inverse.owner.clone(), target.clone(), foreign_key)) {
            continue;
        }
        pending.push(inverse);
    }

    // Several foreign keys from one child to the same parent would all be
    // named after the child; qualify each with its association instead.
    let mut name_counts: BTreeMap<(String, String), usize> = BTreeMap::new();
    for inverse in &pending {
        *name_counts
            .entry((inverse.owner.clone(), inverse.relationship.name.clone()))
            .or_default() += 1;
    }

    for mut inverse in pending {
        let key = (inverse.owner.clone(), inverse.relationship.name.clone());
        if name_counts.get(&key).copied().unwrap_or(0) > 1 {
            let qualified = format!("{}_as_{}", inverse.relationship.name, inverse.qualifier);
            tracing::debug!(
                table = %inverse.owner,
                inverse = %qualified,
                "qualified inverse relationship name"
            );
            inverse.relationship.name = qualified;
        }

        let entry: &mut TableRelationships = schema.relationships.entry(inverse.owner).or_default();
        match inverse.kind {
            InverseKind::HasMany => entry.has_many.push(inverse.relationship),
            InverseKind::HasOne => entry.has_one.push(inverse.relationship),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum InverseKind {
    HasMany,
    HasOne,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, IndexDef, PolymorphicAssociation};

    fn users_and_posts() -> Schema {
        let mut schema = Schema::new(vec![
            Table::new("users", vec![Column::new("id", "integer").primary_key()]),
            Table::new(
                "posts",
                vec![
                    Column::new("id", "integer").primary_key(),
                    Column::new("user_id", "integer").not_null(),
                    Column::new("created_at", "datetime"),
                    Column::new("discarded_at", "datetime"),
                ],
            ),
        ]);
        schema.relationships.insert(
            "posts".to_string(),
            TableRelationships {
                belongs_to: vec![Relationship::new("user", "users").with_foreign_key("user_id")],
                ..Default::default()
            },
        );
        schema
    }

    #[test]
    fn test_belongs_to_gains_has_many_inverse() {
        let schema = enrich(users_and_posts());
        let users = schema.relationships_for("users").unwrap();
        assert_eq!(users.has_many.len(), 1);
        assert_eq!(users.has_many[0].target_table, "posts");
        assert_eq!(users.has_many[0].foreign_key.as_deref(), Some("user_id"));
        assert!(users.belongs_to.is_empty());
    }

    #[test]
    fn test_unique_foreign_key_gains_has_one() {
        let mut schema = users_and_posts();
        schema.indexes.insert(
            "posts".to_string(),
            vec![IndexDef {
                name: "index_posts_on_user_id".to_string(),
                columns: vec!["user_id".to_string()],
                unique: true,
            }],
        );
        let schema = enrich(schema);
        let users = schema.relationships_for("users").unwrap();
        assert!(users.has_many.is_empty());
        assert_eq!(users.has_one[0].name, "post");
    }

    #[test]
    fn test_declared_inverse_is_not_duplicated() {
        let mut schema = users_and_posts();
        schema.relationships.insert(
            "users".to_string(),
            TableRelationships {
                has_many: vec![Relationship::new("posts", "posts").with_foreign_key("user_id")],
                ..Default::default()
            },
        );
        let schema = enrich(schema);
        assert_eq!(schema.relationships_for("users").unwrap().has_many.len(), 1);
    }

    #[test]
    fn test_polymorphic_targets_gain_has_many_as() {
        let mut schema = Schema::new(vec![
            Table::new("jobs", vec![Column::new("id", "integer")]),
            Table::new(
                "notes",
                vec![
                    Column::new("id", "integer"),
                    Column::new("notable_type", "string"),
                    Column::new("notable_id", "integer"),
                ],
            ),
        ]);
        schema.relationships.insert(
            "notes".to_string(),
            TableRelationships {
                polymorphic: vec![PolymorphicAssociation::new("notable", vec!["jobs".to_string()])],
                ..Default::default()
            },
        );
        let schema = enrich(schema);
        let jobs = schema.relationships_for("jobs").unwrap();
        assert_eq!(jobs.has_many[0].as_name.as_deref(), Some("notable"));
        assert_eq!(jobs.has_many[0].foreign_key.as_deref(), Some("notable_id"));
    }

    #[test]
    fn test_two_foreign_keys_to_one_parent_get_qualified_names() {
        let mut schema = Schema::new(vec![
            Table::new("users", vec![Column::new("id", "integer").primary_key()]),
            Table::new(
                "jobs",
                vec![
                    Column::new("id", "integer").primary_key(),
                    Column::new("created_by_id", "integer"),
                    Column::new("updated_by_id", "integer"),
                ],
            ),
        ]);
        schema.relationships.insert(
            "jobs".to_string(),
            TableRelationships {
                belongs_to: vec![
                    Relationship::new("created_by", "users").with_foreign_key("created_by_id"),
                    Relationship::new("updated_by", "users").with_foreign_key("updated_by_id"),
                ],
                ..Default::default()
            },
        );

        let schema = enrich(schema);
        let names: Vec<_> = schema
            .relationships_for("users")
            .unwrap()
            .has_many
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["jobs_as_created_by", "jobs_as_updated_by"]);
    }

    #[test]
    fn test_single_foreign_key_keeps_plain_name() {
        let schema = enrich(users_and_posts());
        assert_eq!(schema.relationships_for("users").unwrap().has_many[0].name, "posts");
    }

    #[test]
    fn test_patterns_detected() {
        let schema = enrich(users_and_posts());
        let patterns = schema.patterns_for("posts").unwrap();
        assert_eq!(patterns.soft_deletion.as_deref(), Some("discarded_at"));
        assert_eq!(patterns.timestamps, vec!["created_at".to_string()]);
        assert!(schema.patterns_for("users").unwrap().is_empty());
    }

    #[test]
    fn test_polymorphic_column_pairs() {
        let table = Table::new(
            "comments",
            vec![
                Column::new("commentable_type", "string"),
                Column::new("commentable_id", "integer"),
                Column::new("body_type", "string"),
            ],
        );
        assert_eq!(polymorphic_column_pairs(&table), vec!["commentable".to_string()]);
    }
}
