//! Generator error types.
#![allow(unused_assignments)]

use std::path::PathBuf;
use miette::Diagnostic;
use thiserror::Error;

use crate::context::GenerationContext;

/// Errors that can occur while generating models.
#[derive(Error, Diagnostic, Debug)]
pub enum GeneratorError {
    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("I/O failure on '{}': {message}", path.display())]
    #[diagnostic(code(modelgen::io::failed))]
    IoError {
        path: PathBuf,
        message: String,
    },

    #[error("Invalid config file '{}': {message}", path.display())]
    #[diagnostic(
        code(modelgen::config::invalid_file),
        help("The config file is JSON with keys matching the generate flags (table, exclude_tables, output_dir, ...)")
    )]
    ConfigFile {
        path: PathBuf,
        message: String,
    },

    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("Validation failed: {message}")]
    #[diagnostic(code(modelgen::validation::failed))]
    Validation {
        message: String,
    },

    #[error("Metadata key '{key}' was already written by an earlier stage")]
    #[diagnostic(
        code(modelgen::context::metadata_conflict),
        help("Context metadata is append-only; write the value under a new key")
    )]
    MetadataConflict {
        key: String,
    },

    // =========================================================================
    // Schema Errors
    // =========================================================================
    #[error("Schema extraction failed: {message}")]
    #[diagnostic(code(modelgen::schema::extraction_failed))]
    SchemaExtraction {
        message: String,
    },

    #[error("Invalid schema: {message}")]
    #[diagnostic(code(modelgen::schema::invalid))]
    SchemaAnalysis {
        message: String,
    },

    #[error("Table '{table}' not found in schema")]
    #[diagnostic(
        code(modelgen::schema::table_not_found),
        help("Run `modelgen tables` to list the tables the schema exposes")
    )]
    TableFiltering {
        table: String,
        available: Vec<String>,
    },

    // =========================================================================
    // Generation Errors
    // =========================================================================
    #[error("Cannot map type '{sql_type}' of column '{table}.{column}': {message}")]
    #[diagnostic(code(modelgen::generation::type_mapping))]
    TypeMapping {
        table: String,
        column: String,
        sql_type: String,
        message: String,
    },

    #[error("Relationship '{relationship}' on '{table}' is invalid: {message}")]
    #[diagnostic(code(modelgen::generation::relationship))]
    RelationshipProcessing {
        table: String,
        relationship: String,
        message: String,
    },

    #[error("Failed to render template '{template}': {message}")]
    #[diagnostic(code(modelgen::generation::template))]
    TemplateRendering {
        template: String,
        message: String,
    },

    #[error("Failed to write '{}': {message}", path.display())]
    #[diagnostic(code(modelgen::output::file_writing))]
    FileWriting {
        path: PathBuf,
        message: String,
    },

    #[error("Failed to generate index file: {message}")]
    #[diagnostic(code(modelgen::output::index))]
    IndexGeneration {
        message: String,
    },

    #[error("Failed to generate configuration file: {message}")]
    #[diagnostic(code(modelgen::output::config))]
    ConfigGeneration {
        message: String,
    },

    // =========================================================================
    // Environment Errors
    // =========================================================================
    #[error("No frontend project root found (looked for package.json in: {})", searched.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", "))]
    #[diagnostic(
        code(modelgen::environment::frontend_root_not_found),
        help("Run from the project root, pass --project-root, or use --skip-formatter")
    )]
    FrontendRootNotFound {
        searched: Vec<PathBuf>,
    },

    #[error("prettier not found in dependencies of {}", manifest.display())]
    #[diagnostic(
        code(modelgen::environment::prettier_not_found),
        help("Add prettier to devDependencies or use --skip-formatter")
    )]
    PrettierNotFound {
        manifest: PathBuf,
    },

    #[error("Formatting failed: {message}")]
    #[diagnostic(code(modelgen::environment::formatting))]
    Formatting {
        message: String,
    },

    // =========================================================================
    // Service Errors
    // =========================================================================
    #[error("Unknown service: {name}")]
    #[diagnostic(code(modelgen::service::not_found))]
    ServiceNotFound {
        name: String,
    },

    #[error("Circular service dependency: {}", cycle.join(" -> "))]
    #[diagnostic(
        code(modelgen::service::circular_dependency),
        help("Break the cycle by removing one of the declared dependencies")
    )]
    CircularDependency {
        cycle: Vec<String>,
    },

    #[error("Service '{name}' failed: {cause}")]
    #[diagnostic(
        code(modelgen::service::failed),
        help("A failed service is not retried; clear the registry cache to rebuild it")
    )]
    Service {
        name: String,
        cause: String,
    },

    #[error("Service '{name}' is already initialized")]
    #[diagnostic(code(modelgen::service::already_initialized))]
    ServiceAlreadyInitialized {
        name: String,
    },

    // =========================================================================
    // Pipeline Errors
    // =========================================================================
    #[error("Stage '{name}' is already registered")]
    #[diagnostic(code(modelgen::pipeline::duplicate_stage))]
    DuplicateStage {
        name: String,
    },

    #[error("Stage '{stage}' failed: {source}")]
    #[diagnostic(code(modelgen::pipeline::stage_failed))]
    Stage {
        stage: String,
        context: Box<GenerationContext>,
        #[source]
        source: Box<GeneratorError>,
    },
}

impl GeneratorError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::IoError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Wraps an error with the stage that raised it and the context it saw.
    pub fn in_stage(self, stage: &str, context: &GenerationContext) -> Self {
        Self::Stage {
            stage: stage.to_string(),
            context: Box::new(context.clone()),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, unwrapping stage envelopes.
    pub fn root_cause(&self) -> &GeneratorError {
        match self {
            Self::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether this error came from the runtime environment rather than the schema.
    pub fn is_environment(&self) -> bool {
        matches!(
            self.root_cause(),
            Self::FrontendRootNotFound { .. } | Self::PrettierNotFound { .. }
        )
    }
}
