//! Renders the data interface, active model and reactive model for one table.

use std::rc::Rc;
use std::sync::Arc;

use crate::artifacts::{ArtifactBundle, ArtifactFilenames};
use crate::context::{keys, GenerationContext, MetadataValue, StageExecution};
use crate::diagnostic::{GeneratorError, Result};
use crate::naming::{file_stem, model_name};
use crate::registry::ServiceRegistry;
use crate::schema::{Schema, Table};
use crate::services::templates::{ColumnProperty, ModelTemplate};
use crate::services::{names, DefaultValueConverter, RelationshipProcessor, TemplateRenderer, TypeMapper};

use super::{priority, Stage, StageEnv};

pub struct ModelGenerationStage {
    registry: Rc<ServiceRegistry>,
}

impl ModelGenerationStage {
    pub fn new(registry: Rc<ServiceRegistry>) -> Self {
        Self { registry }
    }

    fn columns(&self, mapper: &TypeMapper, table: &Table, schema: Option<&Schema>) -> Result<Vec<ColumnProperty>> {
        table
            .columns
            .iter()
            .map(|column| {
                let enum_values = schema.and_then(|s| {
                    s.constraints_for(&table.name)
                        .iter()
                        .filter(|c| c.columns.len() == 1 && c.columns[0] == column.name)
                        .find_map(|c| c.enum_values())
                });
                Ok(ColumnProperty {
                    name: column.name.clone(),
                    ts_type: mapper.map_column(&table.name, column, enum_values.as_deref())?,
                    optional: column.is_optional(),
                    comment: column.comment.clone(),
                })
            })
            .collect()
    }
}

impl Stage for ModelGenerationStage {
    fn name(&self) -> &'static str {
        "model_generation"
    }

    fn description(&self) -> &'static str {
        "Renders the data interface, active model and reactive model"
    }

    fn priority(&self) -> i32 {
        priority::MODEL_GENERATION
    }

    fn can_run(&self, context: &GenerationContext) -> bool {
        context.table().is_some() && context.relationships().is_some() && context.patterns().is_some()
    }

    fn process(&self, context: &GenerationContext, env: &StageEnv<'_>) -> Result<GenerationContext> {
        let (Some(table), Some(relationships), Some(patterns)) =
            (context.table(), context.relationships(), context.patterns())
        else {
            return Err(GeneratorError::validation(
                "model generation needs table, relationships and patterns",
            ));
        };
        let schema = context.schema();

        let mapper = self.registry.get::<TypeMapper>(names::TYPE_MAPPER)?;
        let converter = self.registry.get::<DefaultValueConverter>(names::DEFAULT_VALUE_CONVERTER)?;
        let processor = self.registry.get::<RelationshipProcessor>(names::RELATIONSHIP_PROCESSOR)?;
        let renderer = self.registry.get::<TemplateRenderer>(names::TEMPLATE_RENDERER)?;

        let columns = self.columns(&mapper, table, schema)?;
        let processed = processor.process(table, relationships, patterns, schema)?;
        let defaults = converter.defaults_for(table)?;
        let stem = file_stem(&table.name);

        let template = ModelTemplate {
            table: table.name.clone(),
            model_name: model_name(&table.name),
            interface_name: mapper.interface_name(&table.name),
            stem: stem.clone(),
            primary_key: table.columns.iter().find(|c| c.primary_key).map(|c| c.name.clone()),
            columns,
            relationships: processed,
            patterns: patterns.clone(),
            defaults,
            generated_at: env.clock.timestamp(),
        };

        let bundle = ArtifactBundle {
            table: table.name.clone(),
            data_interface: renderer.render_data_interface(&template)?,
            active_model: renderer.render_active_model(&template)?,
            reactive_model: renderer.render_reactive_model(&template)?,
            filenames: ArtifactFilenames::for_stem(&stem),
        };

        tracing::debug!(
            table = %table.name,
            properties = template.columns.len() + template.relationships.properties.len(),
            "model rendered"
        );

        Ok(context
            .with_metadata(keys::GENERATED_CONTENT, MetadataValue::Artifacts(Arc::new(bundle)))?
            .with_execution(
                StageExecution::new(self.name(), env.clock.now())
                    .with_counter("columns", template.columns.len() as u64)
                    .with_counter("relationships", template.relationships.properties.len() as u64),
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, SystemClock};
    use crate::config::GenerationOptions;
    use crate::report::NullReporter;
    use crate::schema::{Column, ConstraintDef, ConstraintKind, TablePatterns, TableRelationships};
    use crate::services::{register_defaults, SchemaSource};
    use chrono::{TimeZone, Utc};

    fn stage() -> ModelGenerationStage {
        let registry = Rc::new(ServiceRegistry::new(Rc::new(SystemClock)));
        register_defaults(&registry, SchemaSource::InMemory(Schema::default()), &GenerationOptions::default()).unwrap();
        ModelGenerationStage::new(registry)
    }

    fn users() -> Table {
        Table::new(
            "users",
            vec![
                Column::new("id", "int").primary_key(),
                Column::new("email", "string").not_null(),
                Column::new("name", "string"),
            ],
        )
    }

    fn ready(table: Table) -> GenerationContext {
        GenerationContext::new(GenerationOptions::default())
            .with_table(table)
            .with_relationships(TableRelationships::default())
            .with_metadata(keys::PATTERNS, MetadataValue::Patterns(Arc::new(TablePatterns::default())))
            .unwrap()
    }

    fn process(ctx: &GenerationContext) -> Result<GenerationContext> {
        let clock = FixedClock(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap());
        stage().process(ctx, &StageEnv { clock: &clock, reporter: &NullReporter })
    }

    #[test]
    fn test_users_data_interface() {
        let ctx = process(&ready(users())).unwrap();
        let bundle = ctx.artifacts().unwrap();

        assert!(bundle.data_interface.contains("  id: number;\n  email: string;\n  name?: string;\n"));
        assert!(!bundle.active_model.is_empty());
        assert!(!bundle.reactive_model.is_empty());
        assert_eq!(bundle.filenames.len(), 3);
        assert!(bundle.data_interface.contains("// Generated: 2025-03-01T09:00:00Z"));
    }

    #[test]
    fn test_can_run_requires_relationships_and_patterns() {
        let base = GenerationContext::new(GenerationOptions::default()).with_table(users());
        assert!(!stage().can_run(&base));
        assert!(!stage().can_run(&base.with_relationships(TableRelationships::default())));

        let only_patterns = base
            .with_metadata(keys::PATTERNS, MetadataValue::Patterns(Arc::new(TablePatterns::default())))
            .unwrap();
        assert!(!stage().can_run(&only_patterns));
        assert!(stage().can_run(&ready(users())));
    }

    #[test]
    fn test_check_constraint_becomes_union() {
        let table = Table::new("posts", vec![Column::new("status", "varchar").not_null()]);
        let mut schema = Schema::new(vec![table.clone()]);
        schema.constraints.insert(
            "posts".to_string(),
            vec![ConstraintDef {
                name: None,
                kind: ConstraintKind::Check,
                columns: vec!["status".to_string()],
                expression: Some("status IN ('draft', 'live')".to_string()),
            }],
        );

        let ctx = process(&ready(table).with_schema(schema)).unwrap();
        assert!(ctx.artifacts().unwrap().data_interface.contains("  status: 'draft' | 'live';"));
    }

    #[test]
    fn test_empty_type_raises_type_mapping() {
        let table = Table::new("posts", vec![Column::new("title", "")]);
        let err = process(&ready(table)).unwrap_err();
        assert!(matches!(err, GeneratorError::TypeMapping { .. }));
    }
}
