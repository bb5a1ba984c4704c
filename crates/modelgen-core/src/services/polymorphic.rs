//! Polymorphic association analysis.
//!
//! A table is the named side of a polymorphic association when it declares
//! one, or when it carries an `<x>_type` / `<x>_id` column pair. Undeclared
//! pairs take their allow-list from the tables that declare
//! `has_many ... as: <x>` pointing back at this table.

use crate::naming::{model_name, polymorphic_type_key};
use crate::registry::Service;
use crate::schema::discovery::polymorphic_column_pairs;
use crate::schema::{PolymorphicAssociation, Schema, Table, TableRelationships};

/// A polymorphic association resolved for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct PolymorphicDeclaration {
    pub name: String,
    pub type_field: String,
    pub id_field: String,
    pub target_tables: Vec<String>,
    /// Model names of the allowed targets (`ClientNote`).
    pub target_models: Vec<String>,
    /// Type keys stored in the type column (`clientnote`).
    pub target_types: Vec<String>,
    /// Whether the association came from an explicit declaration.
    pub declared: bool,
}

impl PolymorphicDeclaration {
    fn from_association(association: &PolymorphicAssociation, declared: bool) -> Self {
        let target_models: Vec<String> = association.target_tables.iter().map(|t| model_name(t)).collect();
        let target_types = target_models.iter().map(|m| polymorphic_type_key(m)).collect();
        Self {
            name: association.name.clone(),
            type_field: association.type_field(),
            id_field: association.id_field(),
            target_tables: association.target_tables.clone(),
            target_models,
            target_types,
            declared,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PolymorphicAnalyzer;

impl PolymorphicAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Polymorphic associations where `table` is the named side.
    pub fn analyze(
        &self,
        table: &Table,
        relationships: &TableRelationships,
        schema: Option<&Schema>,
    ) -> Vec<PolymorphicDeclaration> {
        let mut declarations: Vec<PolymorphicDeclaration> = relationships
            .polymorphic
            .iter()
            .map(|a| PolymorphicDeclaration::from_association(a, true))
            .collect();

        for name in polymorphic_column_pairs(table) {
            if declarations.iter().any(|d| d.name == name) {
                continue;
            }
            let targets = schema
                .map(|s| allowed_targets(s, &table.name, &name))
                .unwrap_or_default();
            tracing::debug!(table = %table.name, association = %name, ?targets, "undeclared polymorphic pair");
            declarations.push(PolymorphicDeclaration::from_association(
                &PolymorphicAssociation::new(name, targets),
                false,
            ));
        }

        declarations
    }
}

impl Service for PolymorphicAnalyzer {}

/// Tables declaring `has_many <table>, as: <name>`.
fn allowed_targets(schema: &Schema, table: &str, name: &str) -> Vec<String> {
    schema
        .relationships
        .iter()
        .filter(|(_, rels)| {
            rels.has_many
                .iter()
                .chain(rels.has_one.iter())
                .any(|r| r.target_table == table && r.as_name.as_deref() == Some(name))
        })
        .map(|(owner, _)| owner.clone())
        .collect()
}
