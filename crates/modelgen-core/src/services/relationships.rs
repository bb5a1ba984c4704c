//! Turns a table's relationships into interface properties, imports,
//! create/update exclusions, documentation and registrations.

use std::collections::BTreeSet;
use std::rc::Rc;

use super::{PolymorphicAnalyzer, PolymorphicDeclaration, TypeMapper};
use crate::diagnostic::{GeneratorError, Result};
use crate::naming::{file_stem, model_name};
use crate::registry::Service;
use crate::schema::{Relationship, Schema, Table, TablePatterns, TableRelationships};

/// Kind of an association as registered on the generated model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKind {
    BelongsTo,
    HasOne,
    HasMany,
    Polymorphic,
}

impl RelationshipKind {
    /// Name used in generated registration blocks.
    pub fn registration_name(&self) -> &'static str {
        match self {
            RelationshipKind::BelongsTo | RelationshipKind::Polymorphic => "belongsTo",
            RelationshipKind::HasOne => "hasOne",
            RelationshipKind::HasMany => "hasMany",
        }
    }
}

/// A relationship-derived property of the data interface.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipProperty {
    pub name: String,
    pub ts_type: String,
    pub kind: RelationshipKind,
}

/// One entry of the generated relationship registration block.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipRegistration {
    pub name: String,
    pub kind: RelationshipKind,
    /// Target model, absent for polymorphic associations.
    pub target_model: Option<String>,
    pub foreign_key: Option<String>,
    pub through: Option<String>,
    pub polymorphic: Option<PolymorphicDeclaration>,
}

/// Everything the templates need from relationship processing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessedRelationships {
    pub properties: Vec<RelationshipProperty>,
    /// Sorted, deduplicated `import type` lines for the data interface.
    pub imports: Vec<String>,
    pub create_exclusions: Vec<String>,
    pub update_exclusions: Vec<String>,
    pub documentation: Vec<String>,
    pub registrations: Vec<RelationshipRegistration>,
    pub polymorphic: Vec<PolymorphicDeclaration>,
}

#[derive(Debug, Clone)]
pub struct RelationshipProcessor {
    mapper: Rc<TypeMapper>,
    analyzer: Rc<PolymorphicAnalyzer>,
}

impl RelationshipProcessor {
    pub fn new(mapper: Rc<TypeMapper>, analyzer: Rc<PolymorphicAnalyzer>) -> Self {
        Self { mapper, analyzer }
    }

    pub fn process(
        &self,
        table: &Table,
        relationships: &TableRelationships,
        patterns: &TablePatterns,
        schema: Option<&Schema>,
    ) -> Result<ProcessedRelationships> {
        let mut out = ProcessedRelationships::default();
        let mut imports = BTreeSet::new();

        let grouped = [
            (RelationshipKind::BelongsTo, &relationships.belongs_to),
            (RelationshipKind::HasOne, &relationships.has_one),
            (RelationshipKind::HasMany, &relationships.has_many),
        ];

        for (kind, list) in grouped {
            for relationship in list {
                self.check(table, relationship, &out)?;

                let interface = self.mapper.interface_name(&relationship.target_table);
                let ts_type = match kind {
                    RelationshipKind::HasMany => format!("{}[]", interface),
                    _ => interface.clone(),
                };

                if relationship.target_table != table.name {
                    imports.insert(import_line(&relationship.target_table, &interface));
                }

                out.documentation.push(format!(
                    "{} {} -> {}{}",
                    kind_label(kind),
                    relationship.name,
                    model_name(&relationship.target_table),
                    relationship
                        .through
                        .as_ref()
                        .map(|t| format!(" (through {})", t))
                        .unwrap_or_default()
                ));
                out.registrations.push(RelationshipRegistration {
                    name: relationship.name.clone(),
                    kind,
                    target_model: Some(model_name(&relationship.target_table)),
                    foreign_key: relationship.foreign_key.clone(),
                    through: relationship.through.clone(),
                    polymorphic: None,
                });
                out.properties.push(RelationshipProperty {
                    name: relationship.name.clone(),
                    ts_type,
                    kind,
                });
            }
        }

        for declaration in self.analyzer.analyze(table, relationships, schema) {
            if declaration.name.trim().is_empty() {
                return Err(GeneratorError::RelationshipProcessing {
                    table: table.name.clone(),
                    relationship: declaration.name.clone(),
                    message: "polymorphic association has no name".to_string(),
                });
            }
            if out.properties.iter().any(|p| p.name == declaration.name) || table.has_column(&declaration.name) {
                return Err(conflict(table, &declaration.name));
            }

            let ts_type = if declaration.target_tables.is_empty() {
                "unknown".to_string()
            } else {
                declaration
                    .target_tables
                    .iter()
                    .map(|t| {
                        let interface = self.mapper.interface_name(t);
                        if t != &table.name {
                            imports.insert(import_line(t, &interface));
                        }
                        interface
                    })
                    .collect::<Vec<_>>()
                    .join(" | ")
            };

            out.documentation.push(format!(
                "polymorphic {} -> {}",
                declaration.name,
                if declaration.target_models.is_empty() {
                    "any".to_string()
                } else {
                    declaration.target_models.join(" | ")
                }
            ));
            out.registrations.push(RelationshipRegistration {
                name: declaration.name.clone(),
                kind: RelationshipKind::Polymorphic,
                target_model: None,
                foreign_key: Some(declaration.id_field.clone()),
                through: None,
                polymorphic: Some(declaration.clone()),
            });
            out.properties.push(RelationshipProperty {
                name: declaration.name.clone(),
                ts_type,
                kind: RelationshipKind::Polymorphic,
            });
            out.polymorphic.push(declaration);
        }

        let mut managed: Vec<String> = vec!["id".to_string()];
        managed.extend(patterns.timestamps.iter().cloned());
        managed.extend(out.properties.iter().map(|p| p.name.clone()));
        dedup(&mut managed);

        out.create_exclusions = managed.clone();
        out.update_exclusions = managed;
        if let Some(column) = &patterns.soft_deletion {
            out.update_exclusions.push(column.clone());
            dedup(&mut out.update_exclusions);
        }

        out.imports = imports.into_iter().collect();
        Ok(out)
    }

    fn check(&self, table: &Table, relationship: &Relationship, so_far: &ProcessedRelationships) -> Result<()> {
        if relationship.name.trim().is_empty() {
            return Err(GeneratorError::RelationshipProcessing {
                table: table.name.clone(),
                relationship: relationship.name.clone(),
                message: "relationship has no name".to_string(),
            });
        }
        if relationship.target_table.trim().is_empty() {
            return Err(GeneratorError::RelationshipProcessing {
                table: table.name.clone(),
                relationship: relationship.name.clone(),
                message: "relationship has no target table".to_string(),
            });
        }
        if table.has_column(&relationship.name) || so_far.properties.iter().any(|p| p.name == relationship.name) {
            return Err(conflict(table, &relationship.name));
        }
        Ok(())
    }
}

impl Service for RelationshipProcessor {}

fn conflict(table: &Table, name: &str) -> GeneratorError {
    GeneratorError::RelationshipProcessing {
        table: table.name.clone(),
        relationship: name.to_string(),
        message: "property name collides with a column or another relationship".to_string(),
    }
}

fn import_line(target_table: &str, interface: &str) -> String {
    format!("import type {{ {} }} from './{}-data';", interface, file_stem(target_table))
}

fn kind_label(kind: RelationshipKind) -> &'static str {
    match kind {
        RelationshipKind::BelongsTo => "belongs_to",
        RelationshipKind::HasOne => "has_one",
        RelationshipKind::HasMany => "has_many",
        RelationshipKind::Polymorphic => "polymorphic",
    }
}

fn dedup(names: &mut Vec<String>) {
    let mut seen = BTreeSet::new();
    names.retain(|n| seen.insert(n.clone()));
}
