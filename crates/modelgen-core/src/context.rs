//! The immutable value threaded through every pipeline stage.
//!
//! Every `with_*` method returns a new [`GenerationContext`]; the receiver is
//! left untouched. Fields are behind `Arc` so copies share structure and an
//! error envelope can hold a snapshot without cloning the schema.
//!
//! Metadata is append-only: writing a key that already exists is a
//! [`GeneratorError::MetadataConflict`]. Each stage also appends a
//! [`StageExecution`] record to the audit trail.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::artifacts::{ArtifactBundle, WriteRequest, WriteResult};
use crate::config::GenerationOptions;
use crate::diagnostic::{GeneratorError, Result};
use crate::schema::{Schema, Table, TablePatterns, TableRelationships};
use crate::stages::formatting::FormattingReport;

/// Well-known metadata keys.
pub mod keys {
    /// Detected patterns of the current table.
    pub const PATTERNS: &str = "patterns";
    /// Number of tables after filtering (multi-table mode).
    pub const TABLE_COUNT: &str = "table_count";
    /// Every table name left after exclusion, for aggregate files.
    pub const AVAILABLE_TABLES: &str = "available_tables";
    /// Rendered artifact bundle of the current table.
    pub const GENERATED_CONTENT: &str = "generated_content";
    /// Deferred write requests produced by TypeScript generation.
    pub const WRITE_REQUESTS: &str = "write_requests";
    /// Paths a dry run would have written.
    pub const PLANNED_PATHS: &str = "planned_paths";
    /// Result of the immediate configuration file write.
    pub const CONFIG_RESULT: &str = "config_result";
    /// Write requests after formatting.
    pub const FORMATTED_WRITE_REQUESTS: &str = "formatted_write_requests";
    /// Formatter statistics.
    pub const FORMATTING: &str = "formatting";
    /// Per-file write outcomes.
    pub const WRITE_RESULTS: &str = "write_results";
}

/// A value stored in context metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Json(Value),
    Patterns(Arc<TablePatterns>),
    Artifacts(Arc<ArtifactBundle>),
    WriteRequests(Arc<Vec<WriteRequest>>),
    WriteResults(Arc<Vec<WriteResult>>),
    Formatting(Arc<FormattingReport>),
    TableNames(Arc<Vec<String>>),
}

/// Audit record appended by each executed stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageExecution {
    pub stage_name: String,
    pub executed_at: DateTime<Utc>,
    pub counters: BTreeMap<String, u64>,
}

impl StageExecution {
    pub fn new(stage_name: impl Into<String>, executed_at: DateTime<Utc>) -> Self {
        Self {
            stage_name: stage_name.into(),
            executed_at,
            counters: BTreeMap::new(),
        }
    }

    pub fn with_counter(mut self, name: impl Into<String>, value: u64) -> Self {
        self.counters.insert(name.into(), value);
        self
    }
}

/// Append-only metadata bag plus the stage audit trail.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    entries: BTreeMap<String, MetadataValue>,
    executions: Vec<StageExecution>,
}

impl Metadata {
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn executions(&self) -> &[StageExecution] {
        &self.executions
    }
}

/// Context carried from stage to stage.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    table: Option<Arc<Table>>,
    schema: Option<Arc<Schema>>,
    relationships: Option<Arc<TableRelationships>>,
    options: Arc<GenerationOptions>,
    metadata: Arc<Metadata>,
}

impl GenerationContext {
    pub fn new(options: GenerationOptions) -> Self {
        Self {
            table: None,
            schema: None,
            relationships: None,
            options: Arc::new(options),
            metadata: Arc::new(Metadata::default()),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn table(&self) -> Option<&Table> {
        self.table.as_deref()
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_deref()
    }

    pub fn relationships(&self) -> Option<&TableRelationships> {
        self.relationships.as_deref()
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn patterns(&self) -> Option<&TablePatterns> {
        match self.metadata.get(keys::PATTERNS) {
            Some(MetadataValue::Patterns(p)) => Some(p),
            _ => None,
        }
    }

    pub fn artifacts(&self) -> Option<&ArtifactBundle> {
        match self.metadata.get(keys::GENERATED_CONTENT) {
            Some(MetadataValue::Artifacts(a)) => Some(a),
            _ => None,
        }
    }

    pub fn write_requests(&self, key: &str) -> Option<&[WriteRequest]> {
        match self.metadata.get(key) {
            Some(MetadataValue::WriteRequests(r)) => Some(r.as_slice()),
            _ => None,
        }
    }

    pub fn write_results(&self, key: &str) -> Option<&[WriteResult]> {
        match self.metadata.get(key) {
            Some(MetadataValue::WriteResults(r)) => Some(r.as_slice()),
            _ => None,
        }
    }

    pub fn formatting(&self) -> Option<&FormattingReport> {
        match self.metadata.get(keys::FORMATTING) {
            Some(MetadataValue::Formatting(f)) => Some(f),
            _ => None,
        }
    }

    pub fn table_names(&self, key: &str) -> Option<&[String]> {
        match self.metadata.get(key) {
            Some(MetadataValue::TableNames(n)) => Some(n.as_slice()),
            _ => None,
        }
    }

    pub fn json(&self, key: &str) -> Option<&Value> {
        match self.metadata.get(key) {
            Some(MetadataValue::Json(v)) => Some(v),
            _ => None,
        }
    }

    // =========================================================================
    // Mutators (each returns a new context)
    // =========================================================================

    pub fn with_table(&self, table: Table) -> Self {
        Self {
            table: Some(Arc::new(table)),
            ..self.clone()
        }
    }

    pub fn with_schema(&self, schema: Schema) -> Self {
        Self {
            schema: Some(Arc::new(schema)),
            ..self.clone()
        }
    }

    pub fn with_relationships(&self, relationships: TableRelationships) -> Self {
        Self {
            relationships: Some(Arc::new(relationships)),
            ..self.clone()
        }
    }

    pub fn with_options(&self, options: GenerationOptions) -> Self {
        Self {
            options: Arc::new(options),
            ..self.clone()
        }
    }

    /// Adds a metadata entry. Fails if the key was already written.
    pub fn with_metadata(&self, key: &str, value: MetadataValue) -> Result<Self> {
        if self.metadata.contains(key) {
            return Err(GeneratorError::MetadataConflict { key: key.to_string() });
        }
        let mut metadata = (*self.metadata).clone();
        metadata.entries.insert(key.to_string(), value);
        Ok(Self {
            metadata: Arc::new(metadata),
            ..self.clone()
        })
    }

    /// Appends a stage execution record.
    pub fn with_execution(&self, execution: StageExecution) -> Self {
        let mut metadata = (*self.metadata).clone();
        metadata.executions.push(execution);
        Self {
            metadata: Arc::new(metadata),
            ..self.clone()
        }
    }
}
