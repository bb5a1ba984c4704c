//! # Modelgen Core
//!
//! Introspects a relational schema and generates TypeScript model artifacts
//! per table: a data interface, an active-record model and a reactive model,
//! plus an index and a loggable-models configuration.
//!
//! ## Architecture
//!
//! ```text
//! GenerationOptions + SchemaSource
//!        │
//!        ▼
//! ┌──────────────────┐
//! │    Validation    │  Required fields, table structure
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  SchemaAnalysis  │  Extract, enrich, filter
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │ ModelGeneration  │  Render three artifacts
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   TypeScript     │  Write requests, index, config
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │    Formatting    │  Batch prettier, per-file fallback
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   FileWriting    │  Skip semantically identical files
//! └──────────────────┘
//! ```
//!
//! Every stage reads an immutable [`GenerationContext`] and returns a new
//! one. Stages share collaborators through the [`ServiceRegistry`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use modelgen_core::{Generator, GenerationOptions, SchemaSource};
//!
//! let options = GenerationOptions {
//!     output_dir: "frontend/src/lib/models".into(),
//!     ..Default::default()
//! };
//! let result = Generator::new(options, SchemaSource::from_path("db/schema.json")).generate()?;
//! println!("{} created, {} identical", result.created, result.identical);
//! ```

pub mod artifacts;
pub mod clock;
pub mod compare;
pub mod config;
pub mod context;
pub mod diagnostic;
pub mod loggable;
pub mod naming;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod schema;
pub mod services;
pub mod stages;

use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use serde::Serialize;

pub use artifacts::{WriteKind, WriteOutcome, WriteResult, WriteTally};
pub use clock::{Clock, FixedClock, SystemClock};
pub use compare::SemanticComparator;
pub use config::GenerationOptions;
pub use context::GenerationContext;
pub use diagnostic::{GeneratorError, Result};
pub use pipeline::{Pipeline, PipelineRun};
pub use registry::{HealthReport, HealthStatus, RegistryStatistics, ServiceRegistry};
pub use report::{FileStatus, NullReporter, Reporter, TracingReporter};
pub use services::SchemaSource;
pub use stages::{FormatterRunner, FormattingReport, PrettierRunner};

use context::keys;

/// Summary of a `generate` run across every table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerateResult {
    pub tables: Vec<String>,
    pub created: usize,
    pub identical: usize,
    pub errors: usize,
    /// Paths that would be written, in dry-run mode.
    pub planned: Vec<String>,
    pub formatting: FormattingReport,
    pub write_results: Vec<WriteResult>,
    pub elapsed: Duration,
}

impl GenerateResult {
    fn absorb(&mut self, context: &GenerationContext) {
        let results = context
            .write_results(keys::CONFIG_RESULT)
            .into_iter()
            .chain(context.write_results(keys::WRITE_RESULTS))
            .flatten();

        // Aggregate files are rewritten once per table; the first outcome
        // stands unless a later run failed.
        for result in results {
            match self.write_results.iter_mut().find(|r| r.path == result.path) {
                Some(existing) => {
                    if matches!(result.outcome, WriteOutcome::Error(_)) {
                        *existing = result.clone();
                    }
                }
                None => self.write_results.push(result.clone()),
            }
        }

        if let Some(planned) = context.json(keys::PLANNED_PATHS).and_then(|v| v.as_array()) {
            for path in planned.iter().filter_map(|p| p.as_str()) {
                if !self.planned.iter().any(|p| p == path) {
                    self.planned.push(path.to_string());
                }
            }
        }

        if let Some(report) = context.formatting() {
            self.formatting.merge(report);
        }
    }

    fn finish(&mut self, elapsed: Duration) {
        let tally = WriteTally::from_results(&self.write_results);
        self.created = tally.created;
        self.identical = tally.identical;
        self.errors = tally.errors;
        self.elapsed = elapsed;
    }
}

/// One service that failed to construct during a health sweep.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceFailure {
    pub name: String,
    pub error: String,
}

/// Result of [`Generator::health`].
#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub report: HealthReport,
    pub statistics: RegistryStatistics,
    pub failures: Vec<ServiceFailure>,
}

impl HealthSummary {
    /// Overall status, treating construction failures as unhealthy services.
    pub fn status(&self) -> HealthStatus {
        if self.failures.is_empty() {
            return self.report.status;
        }
        registry::aggregate_health(
            self.report
                .services
                .values()
                .map(|s| s.status)
                .chain(self.failures.iter().map(|_| HealthStatus::Unhealthy)),
        )
    }
}

/// Drives the generation pipeline for one configuration.
pub struct Generator {
    options: GenerationOptions,
    source: SchemaSource,
    clock: Rc<dyn Clock>,
    reporter: Rc<dyn Reporter>,
    formatter: Rc<dyn FormatterRunner>,
}

impl Generator {
    pub fn new(options: GenerationOptions, source: SchemaSource) -> Self {
        Self {
            options,
            source,
            clock: Rc::new(SystemClock),
            reporter: Rc::new(TracingReporter),
            formatter: Rc::new(PrettierRunner),
        }
    }

    pub fn with_clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_reporter(mut self, reporter: Rc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_formatter(mut self, formatter: Rc<dyn FormatterRunner>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    /// A fresh registry with every built-in service registered.
    pub fn registry(&self) -> Result<Rc<ServiceRegistry>> {
        let registry = Rc::new(ServiceRegistry::new(self.clock.clone()));
        services::register_defaults(&registry, self.source.clone(), &self.options)?;
        registry.validate_dependencies()?;
        Ok(registry)
    }

    /// Runs validation and schema analysis only.
    pub fn analyze(&self) -> Result<GenerationContext> {
        let registry = self.registry()?;
        let outcome = self.analyze_with(&registry);
        registry.shutdown_all_services();
        outcome
    }

    /// Tables a `generate` run would process.
    pub fn tables(&self) -> Result<Vec<String>> {
        let context = self.analyze()?;
        Ok(table_names(&context))
    }

    /// Generates every selected table.
    ///
    /// Without a table filter, an analysis pass selects the tables and the
    /// full pipeline then runs once per table. The first failing table aborts
    /// the run.
    pub fn generate(&self) -> Result<GenerateResult> {
        let started = Instant::now();
        let registry = self.registry()?;
        let outcome = self.generate_with(&registry, started);

        let shutdown = registry.shutdown_all_services();
        for (service, error) in &shutdown.errors {
            tracing::warn!(service = %service, error = %error, "shutdown failed");
        }
        outcome
    }

    /// Constructs every service and probes it.
    pub fn health(&self) -> Result<HealthSummary> {
        let registry = self.registry()?;

        let mut failures = Vec::new();
        for name in services::names::ALL {
            if let Err(e) = registry.get_service(name) {
                failures.push(ServiceFailure {
                    name: name.to_string(),
                    error: e.to_string(),
                });
            }
        }

        let summary = HealthSummary {
            report: registry.health_check(),
            statistics: registry.statistics(),
            failures,
        };
        registry.shutdown_all_services();
        Ok(summary)
    }

    fn analyze_with(&self, registry: &Rc<ServiceRegistry>) -> Result<GenerationContext> {
        let pipeline = stages::analysis_pipeline(registry.clone())?;
        let run = pipeline.run(
            GenerationContext::new(self.options.clone()),
            self.clock.as_ref(),
            self.reporter.as_ref(),
        )?;
        Ok(run.context)
    }

    fn generate_with(&self, registry: &Rc<ServiceRegistry>, started: Instant) -> Result<GenerateResult> {
        let tables = match &self.options.table {
            Some(table) => vec![table.clone()],
            None => table_names(&self.analyze_with(registry)?),
        };
        tracing::info!(tables = tables.len(), dry_run = self.options.dry_run, "generating models");

        let pipeline = stages::standard_pipeline(registry.clone(), self.formatter.clone())?;
        let mut result = GenerateResult {
            tables: tables.clone(),
            ..Default::default()
        };

        for table in &tables {
            self.reporter.note(&format!("generating {}", table));
            let run = pipeline.run(
                GenerationContext::new(self.options.for_table(table)),
                self.clock.as_ref(),
                self.reporter.as_ref(),
            )?;
            tracing::debug!(table = %table, stages = ?run.executed, skipped = ?run.skipped, "table done");
            result.absorb(&run.context);
        }

        result.finish(started.elapsed());
        tracing::info!(
            created = result.created,
            identical = result.identical,
            errors = result.errors,
            "generation finished"
        );
        Ok(result)
    }
}

fn table_names(context: &GenerationContext) -> Vec<String> {
    match (context.table(), context.schema()) {
        (Some(table), _) => vec![table.name.clone()],
        (None, Some(schema)) => schema.table_names(),
        (None, None) => Vec::new(),
    }
}

/// Resolves a path the way generated files are reported: relative to `base` when possible.
pub fn display_path(path: &std::path::Path, base: &std::path::Path) -> PathBuf {
    pathdiff::diff_paths(path, base).unwrap_or_else(|| path.to_path_buf())
}
