//! Turns rendered artifacts into write requests and emits the aggregate files.
//!
//! Model files and the index are deferred to the formatting and file-writing
//! stages. The loggable-models configuration is a singleton aggregate and is
//! written immediately.

use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use serde_json::Value;

use crate::artifacts::{ArtifactBundle, WriteKind, WriteOutcome, WriteRequest};
use crate::context::{keys, GenerationContext, MetadataValue, StageExecution};
use crate::diagnostic::{GeneratorError, Result};
use crate::loggable::LoggableRegistry;
use crate::naming::model_name;
use crate::registry::ServiceRegistry;
use crate::report::FileStatus;
use crate::services::templates::LoggableEntry;
use crate::services::{names, FileManager, TemplateRenderer};

use super::{priority, Stage, StageEnv};

/// Index file path, relative to the output directory.
pub const INDEX_PATH: &str = "index.ts";

/// Loggable-models configuration path, relative to the output directory.
pub const CONFIG_PATH: &str = "config/loggable-models.ts";

pub struct TypeScriptGenerationStage {
    registry: Rc<ServiceRegistry>,
}

impl TypeScriptGenerationStage {
    pub fn new(registry: Rc<ServiceRegistry>) -> Self {
        Self { registry }
    }

    fn model_requests(&self, bundle: &ArtifactBundle, files: &FileManager) -> Result<Vec<WriteRequest>> {
        let mut requests = Vec::with_capacity(bundle.filenames.len());
        for (kind, path) in bundle.filenames.iter() {
            files.resolve(path)?;
            let content = bundle.content(kind).ok_or_else(|| GeneratorError::FileWriting {
                path: path.clone(),
                message: format!("no {} content in bundle", kind),
            })?;
            requests.push(WriteRequest::new(path.clone(), content, kind));
        }
        Ok(requests)
    }

    fn aggregate_tables(&self, context: &GenerationContext, bundle: &ArtifactBundle) -> Vec<String> {
        context
            .table_names(keys::AVAILABLE_TABLES)
            .map(<[String]>::to_vec)
            .filter(|tables| !tables.is_empty())
            .unwrap_or_else(|| vec![bundle.table.clone()])
    }

    fn index_request(
        &self,
        renderer: &TemplateRenderer,
        tables: &[String],
        env: &StageEnv<'_>,
    ) -> Result<WriteRequest> {
        let content = renderer
            .render_index(tables, &env.clock.timestamp())
            .map_err(|e| GeneratorError::IndexGeneration { message: e.to_string() })?;
        Ok(WriteRequest::new(INDEX_PATH, content, WriteKind::Index))
    }

    fn write_config(
        &self,
        context: &GenerationContext,
        renderer: &TemplateRenderer,
        files: &FileManager,
        tables: &[String],
        env: &StageEnv<'_>,
    ) -> Result<crate::artifacts::WriteResult> {
        let loggable = LoggableRegistry::load(context.options().loggable_manifest.as_deref())?;
        if loggable.is_fallback() {
            tracing::debug!("using built-in loggable model list");
        }

        let entries: Vec<LoggableEntry> = tables
            .iter()
            .map(|table| {
                let model = model_name(table);
                LoggableEntry {
                    table: table.clone(),
                    includes_loggable: loggable.includes(&model),
                    model_name: model,
                }
            })
            .collect();

        let content = renderer
            .render_config(&entries, &env.clock.timestamp())
            .map_err(|e| GeneratorError::ConfigGeneration { message: e.to_string() })?;

        let result = files.write(
            &WriteRequest::new(CONFIG_PATH, content, WriteKind::Config),
            context.options().force,
        );
        env.reporter
            .file_status(FileStatus::from(&result.outcome), &files.root().join(&result.path));

        if let WriteOutcome::Error(message) = &result.outcome {
            return Err(GeneratorError::ConfigGeneration {
                message: message.clone(),
            });
        }
        Ok(result)
    }
}

impl Stage for TypeScriptGenerationStage {
    fn name(&self) -> &'static str {
        "typescript_generation"
    }

    fn description(&self) -> &'static str {
        "Builds write requests for generated models and aggregate files"
    }

    fn priority(&self) -> i32 {
        priority::TYPESCRIPT_GENERATION
    }

    fn idempotent(&self) -> bool {
        false
    }

    fn can_run(&self, context: &GenerationContext) -> bool {
        context.artifacts().is_some()
    }

    fn process(&self, context: &GenerationContext, env: &StageEnv<'_>) -> Result<GenerationContext> {
        let bundle = context.artifacts().ok_or_else(|| {
            GeneratorError::validation("typescript generation needs generated_content")
        })?;
        let options = context.options();

        if options.dry_run {
            let mut planned: Vec<PathBuf> = bundle.filenames.iter().map(|(_, p)| p.clone()).collect();
            planned.push(PathBuf::from(INDEX_PATH));
            planned.push(PathBuf::from(CONFIG_PATH));

            for path in &planned {
                env.reporter.file_status(FileStatus::WouldCreate, &options.output_dir.join(path));
            }
            let listed = Value::from(
                planned
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>(),
            );
            return Ok(context
                .with_metadata(keys::PLANNED_PATHS, MetadataValue::Json(listed))?
                .with_execution(
                    StageExecution::new(self.name(), env.clock.now()).with_counter("planned", planned.len() as u64),
                ));
        }

        let files = self.registry.get::<FileManager>(names::FILE_WRITER)?;
        let renderer = self.registry.get::<TemplateRenderer>(names::TEMPLATE_RENDERER)?;

        let mut requests = self.model_requests(bundle, &files)?;
        let mut next = context.clone();

        if options.single_table() {
            let tables = self.aggregate_tables(context, bundle);
            requests.push(self.index_request(&renderer, &tables, env)?);

            let config = self.write_config(context, &renderer, &files, &tables, env)?;
            next = next.with_metadata(keys::CONFIG_RESULT, MetadataValue::WriteResults(Arc::new(vec![config])))?;
        }

        let count = requests.len() as u64;
        Ok(next
            .with_metadata(keys::WRITE_REQUESTS, MetadataValue::WriteRequests(Arc::new(requests)))?
            .with_execution(StageExecution::new(self.name(), env.clock.now()).with_counter("requests", count)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactFilenames;
    use crate::clock::SystemClock;
    use crate::config::GenerationOptions;
    use crate::report::NullReporter;
    use crate::schema::Schema;
    use crate::services::{register_defaults, SchemaSource};
    use tempfile::TempDir;

    fn bundle() -> ArtifactBundle {
        ArtifactBundle {
            table: "users".to_string(),
            data_interface: "export interface UserData {}\n".to_string(),
            active_model: "export const User = {};\n".to_string(),
            reactive_model: "export const ReactiveUser = {};\n".to_string(),
            filenames: ArtifactFilenames::for_stem("user"),
        }
    }

    fn run(options: GenerationOptions) -> Result<GenerationContext> {
        let registry = Rc::new(ServiceRegistry::new(Rc::new(SystemClock)));
        register_defaults(&registry, SchemaSource::InMemory(Schema::default()), &options)?;
        let ctx = GenerationContext::new(options)
            .with_metadata(keys::GENERATED_CONTENT, MetadataValue::Artifacts(Arc::new(bundle())))?;
        TypeScriptGenerationStage::new(registry).process(&ctx, &StageEnv { clock: &SystemClock, reporter: &NullReporter })
    }

    #[test]
    fn test_dry_run_plans_five_paths() {
        let dir = TempDir::new().unwrap();
        let options = GenerationOptions {
            dry_run: true,
            output_dir: dir.path().join("models"),
            ..GenerationOptions::default().for_table("users")
        };
        let ctx = run(options).unwrap();

        let planned = ctx.json(keys::PLANNED_PATHS).unwrap().as_array().unwrap();
        assert_eq!(planned.len(), 5);
        assert!(!dir.path().join("models").exists());
        assert!(ctx.write_requests(keys::WRITE_REQUESTS).is_none());
    }

    #[test]
    fn test_single_table_requests_and_config() {
        let dir = TempDir::new().unwrap();
        let options = GenerationOptions {
            output_dir: dir.path().to_path_buf(),
            ..GenerationOptions::default().for_table("users")
        };
        let ctx = run(options).unwrap();

        let requests = ctx.write_requests(keys::WRITE_REQUESTS).unwrap();
        let kinds: Vec<_> = requests.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![WriteKind::DataInterface, WriteKind::ActiveModel, WriteKind::ReactiveModel, WriteKind::Index]
        );
        assert!(!dir.path().join("user.ts").exists());

        let config = std::fs::read_to_string(dir.path().join(CONFIG_PATH)).unwrap();
        assert!(config.contains("users: { modelName: 'User', includesLoggable: true }"));
    }

    #[test]
    fn test_multi_table_mode_has_no_aggregates() {
        let dir = TempDir::new().unwrap();
        let options = GenerationOptions {
            output_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let ctx = run(options).unwrap();
        assert_eq!(ctx.write_requests(keys::WRITE_REQUESTS).unwrap().len(), 3);
        assert!(!dir.path().join(CONFIG_PATH).exists());
    }

    #[test]
    fn test_config_write_failure() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config"), "blocking file").unwrap();
        let options = GenerationOptions {
            output_dir: dir.path().to_path_buf(),
            ..GenerationOptions::default().for_table("users")
        };
        let err = run(options).unwrap_err();
        assert!(matches!(err, GeneratorError::ConfigGeneration { .. }));
    }
}
