//! Schema extraction, filtering, discovery and integrity checks.
//!
//! Relationship and pattern discovery runs over the full schema before any
//! filtering, so a single table still sees inverse associations declared by
//! tables outside the filter.

use std::rc::Rc;
use std::sync::Arc;

use serde_json::Value;

use crate::context::{keys, GenerationContext, MetadataValue, StageExecution};
use crate::diagnostic::{GeneratorError, Result};
use crate::registry::ServiceRegistry;
use crate::schema::discovery;
use crate::services::{names, SchemaIntrospector};

use super::validation::check_relationship_kinds;
use super::{priority, Stage, StageEnv};

pub struct SchemaAnalysisStage {
    registry: Rc<ServiceRegistry>,
}

impl SchemaAnalysisStage {
    pub fn new(registry: Rc<ServiceRegistry>) -> Self {
        Self { registry }
    }
}

impl Stage for SchemaAnalysisStage {
    fn name(&self) -> &'static str {
        "schema_analysis"
    }

    fn description(&self) -> &'static str {
        "Extracts, filters and enriches the database schema"
    }

    fn priority(&self) -> i32 {
        priority::SCHEMA_ANALYSIS
    }

    fn process(&self, context: &GenerationContext, env: &StageEnv<'_>) -> Result<GenerationContext> {
        let introspector = self.registry.get::<SchemaIntrospector>(names::SCHEMA_INTROSPECTOR)?;
        let full = discovery::enrich(introspector.extract()?.clone());
        let options = context.options();

        let is_excluded = |name: &str| options.exclude_tables.iter().any(|t| t == name);
        let available: Vec<String> = full
            .table_names()
            .into_iter()
            .filter(|name| !is_excluded(name))
            .collect();

        let (next, table_count) = match &options.table {
            Some(table_name) => {
                let filtered = full.retain_tables(|name| name == table_name);
                let table = filtered
                    .table(table_name)
                    .cloned()
                    .ok_or_else(|| GeneratorError::TableFiltering {
                        table: table_name.clone(),
                        available: full.table_names(),
                    })?;
                filtered.validate_integrity()?;

                let relationships = full.relationships_for(table_name).cloned().unwrap_or_default();
                check_relationship_kinds(table_name, &relationships, options.strict)?;
                let patterns = full.patterns_for(table_name).cloned().unwrap_or_default();

                tracing::debug!(
                    table = %table_name,
                    relationships = relationships.len(),
                    "single-table analysis"
                );

                // The full schema stays on the context as the lookup index for
                // constraints and polymorphic allow-lists.
                let next = context
                    .with_table(table)
                    .with_relationships(relationships)
                    .with_schema(full.clone())
                    .with_metadata(keys::PATTERNS, MetadataValue::Patterns(Arc::new(patterns)))?;
                (next, 1)
            }
            None => {
                let filtered = if options.exclude_tables.is_empty() {
                    full.clone()
                } else {
                    full.retain_tables(|name| !is_excluded(name))
                };
                if filtered.tables.is_empty() {
                    return Err(GeneratorError::SchemaExtraction {
                        message: "no tables left after filtering".to_string(),
                    });
                }
                filtered.validate_integrity()?;

                let count = filtered.tables.len();
                tracing::debug!(tables = count, "multi-table analysis");
                (context.with_schema(filtered), count)
            }
        };

        Ok(next
            .with_metadata(keys::TABLE_COUNT, MetadataValue::Json(Value::from(table_count)))?
            .with_metadata(keys::AVAILABLE_TABLES, MetadataValue::TableNames(Arc::new(available)))?
            .with_execution(
                StageExecution::new(self.name(), env.clock.now()).with_counter("tables", table_count as u64),
            ))
    }
}
