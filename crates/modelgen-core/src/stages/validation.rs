//! Guards required context fields and structure before any generation work.

use crate::context::{GenerationContext, StageExecution};
use crate::diagnostic::{GeneratorError, Result};
use crate::schema::TableRelationships;

use super::{priority, Stage, StageEnv};

/// A context accessor that must be present and non-empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredField {
    Options,
    Table,
    Schema,
    Relationships,
    Patterns,
}

impl RequiredField {
    fn name(&self) -> &'static str {
        match self {
            RequiredField::Options => "options",
            RequiredField::Table => "table",
            RequiredField::Schema => "schema",
            RequiredField::Relationships => "relationships",
            RequiredField::Patterns => "patterns",
        }
    }
}

pub struct ValidationStage {
    required: Vec<RequiredField>,
}

impl Default for ValidationStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationStage {
    pub fn new() -> Self {
        Self {
            required: vec![RequiredField::Options],
        }
    }

    pub fn requiring(required: Vec<RequiredField>) -> Self {
        Self { required }
    }

    fn check_required(&self, context: &GenerationContext, field: RequiredField) -> Result<()> {
        let missing = || GeneratorError::validation(format!("required field '{}' is missing", field.name()));

        match field {
            RequiredField::Options => {
                let options = context.options();
                if options.table.as_deref().is_some_and(|t| t.trim().is_empty()) {
                    return Err(GeneratorError::validation("options.table is set but empty"));
                }
                if options.output_dir.as_os_str().is_empty() {
                    return Err(GeneratorError::validation("options.output_dir is empty"));
                }
                if options.batch_max_files == 0 || options.batch_max_memory_mb == 0 {
                    return Err(GeneratorError::validation("batch limits must be greater than zero"));
                }
            }
            RequiredField::Table => {
                let table = context.table().ok_or_else(missing)?;
                if table.name.trim().is_empty() {
                    return Err(GeneratorError::validation("required field 'table' has an empty name"));
                }
            }
            RequiredField::Schema => {
                let schema = context.schema().ok_or_else(missing)?;
                if schema.tables.is_empty() {
                    return Err(GeneratorError::validation("required field 'schema' has no tables"));
                }
            }
            RequiredField::Relationships => {
                context.relationships().ok_or_else(missing)?;
            }
            RequiredField::Patterns => {
                context.patterns().ok_or_else(missing)?;
            }
        }
        Ok(())
    }

    fn check_table(&self, context: &GenerationContext) -> Result<()> {
        let Some(table) = context.table() else {
            return Ok(());
        };

        if table.columns.is_empty() {
            let message = format!("table '{}' has no columns", table.name);
            if context.options().strict {
                return Err(GeneratorError::validation(message));
            }
            tracing::warn!("{}", message);
        }

        for (position, column) in table.columns.iter().enumerate() {
            if column.name.trim().is_empty() {
                return Err(GeneratorError::validation(format!(
                    "column at position {} of table '{}' has no name",
                    position, table.name
                )));
            }
            if column.data_type.trim().is_empty() {
                return Err(GeneratorError::validation(format!(
                    "column '{}.{}' has no type",
                    table.name, column.name
                )));
            }
        }
        Ok(())
    }

    fn check_relationship_kinds(&self, context: &GenerationContext) -> Result<()> {
        let mut sets: Vec<(&str, &TableRelationships)> = Vec::new();
        if let Some(rels) = context.relationships() {
            sets.push((context.table().map(|t| t.name.as_str()).unwrap_or("<current>"), rels));
        }
        if let Some(schema) = context.schema() {
            sets.extend(schema.relationships.iter().map(|(t, r)| (t.as_str(), r)));
        }

        for (table, rels) in sets {
            check_relationship_kinds(table, rels, context.options().strict)?;
        }
        Ok(())
    }
}

/// Rejects (strict) or warns about relationship kinds the generator does not know.
pub(crate) fn check_relationship_kinds(table: &str, rels: &TableRelationships, strict: bool) -> Result<()> {
    let unknown = rels.unrecognized_kinds();
    if unknown.is_empty() {
        return Ok(());
    }
    let message = format!(
        "table '{}' uses unrecognized relationship kinds: {}",
        table,
        unknown.join(", ")
    );
    if strict {
        return Err(GeneratorError::validation(message));
    }
    tracing::warn!("{}", message);
    Ok(())
}

impl Stage for ValidationStage {
    fn name(&self) -> &'static str {
        "validation"
    }

    fn description(&self) -> &'static str {
        "Checks required context fields and table structure"
    }

    fn priority(&self) -> i32 {
        priority::VALIDATION
    }

    fn process(&self, context: &GenerationContext, env: &StageEnv<'_>) -> Result<GenerationContext> {
        for field in &self.required {
            self.check_required(context, *field)?;
        }
        self.check_table(context)?;
        self.check_relationship_kinds(context)?;

        Ok(context.with_execution(
            StageExecution::new(self.name(), env.clock.now())
                .with_counter("required_fields", self.required.len() as u64),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::GenerationOptions;
    use crate::report::NullReporter;
    use crate::schema::{Column, Table};

    fn env() -> (SystemClock, NullReporter) {
        (SystemClock, NullReporter)
    }

    fn run(stage: &ValidationStage, ctx: &GenerationContext) -> Result<GenerationContext> {
        let (clock, reporter) = env();
        stage.process(ctx, &StageEnv { clock: &clock, reporter: &reporter })
    }

    fn options(strict: bool) -> GenerationOptions {
        GenerationOptions { strict, ..Default::default() }
    }

    #[test]
    fn test_default_requirements_pass() {
        let ctx = GenerationContext::new(GenerationOptions::default());
        let next = run(&ValidationStage::new(), &ctx).unwrap();
        assert_eq!(next.metadata().executions()[0].stage_name, "validation");
    }

    #[test]
    fn test_missing_required_field() {
        let ctx = GenerationContext::new(GenerationOptions::default());
        let err = run(&ValidationStage::requiring(vec![RequiredField::Table]), &ctx).unwrap_err();
        assert!(err.to_string().contains("'table' is missing"));
    }

    #[test]
    fn test_empty_table_option() {
        let ctx = GenerationContext::new(GenerationOptions::default().for_table(" "));
        assert!(run(&ValidationStage::new(), &ctx).is_err());
    }

    #[test]
    fn test_column_without_type() {
        let ctx = GenerationContext::new(options(false))
            .with_table(Table::new("users", vec![Column::new("email", "")]));
        let err = run(&ValidationStage::new(), &ctx).unwrap_err();
        assert!(err.to_string().contains("users.email"));
    }

    #[test]
    fn test_zero_columns_strict_vs_lenient() {
        let table = Table::new("empty", vec![]);
        let strict = GenerationContext::new(options(true)).with_table(table.clone());
        assert!(run(&ValidationStage::new(), &strict).is_err());

        let lenient = GenerationContext::new(options(false)).with_table(table);
        assert!(run(&ValidationStage::new(), &lenient).is_ok());
    }

    #[test]
    fn test_unrecognized_relationship_kind() {
        let rels: TableRelationships =
            serde_json::from_str(r#"{"has_and_belongs_to_many": [{"name": "tags", "target_table": "tags"}]}"#).unwrap();

        let strict = GenerationContext::new(options(true)).with_relationships(rels.clone());
        let err = run(&ValidationStage::new(), &strict).unwrap_err();
        assert!(err.to_string().contains("has_and_belongs_to_many"));

        let lenient = GenerationContext::new(options(false)).with_relationships(rels);
        assert!(run(&ValidationStage::new(), &lenient).is_ok());
    }
}
