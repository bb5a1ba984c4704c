//! Schema extraction service.

use std::cell::OnceCell;
use std::path::{Path, PathBuf};

use crate::diagnostic::{GeneratorError, Result};
use crate::registry::{HealthStatus, Service};
use crate::schema::{document, sqlite, Schema};

/// Where the schema comes from.
#[derive(Debug, Clone)]
pub enum SchemaSource {
    /// JSON snapshot document.
    Snapshot(PathBuf),
    /// SQLite database file.
    Sqlite(PathBuf),
    /// A schema already in memory.
    InMemory(Schema),
}

impl SchemaSource {
    /// Picks the source kind from the file extension: `.json` is a snapshot,
    /// anything else is opened as SQLite.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => SchemaSource::Snapshot(path),
            _ => SchemaSource::Sqlite(path),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            SchemaSource::Snapshot(p) | SchemaSource::Sqlite(p) => Some(p),
            SchemaSource::InMemory(_) => None,
        }
    }
}

/// Reads the schema once and memoizes it.
#[derive(Debug)]
pub struct SchemaIntrospector {
    source: SchemaSource,
    cache: OnceCell<Schema>,
}

impl SchemaIntrospector {
    pub fn new(source: SchemaSource) -> Self {
        Self {
            source,
            cache: OnceCell::new(),
        }
    }

    pub fn source(&self) -> &SchemaSource {
        &self.source
    }

    /// Returns the raw (un-enriched) schema.
    pub fn extract(&self) -> Result<&Schema> {
        if let Some(schema) = self.cache.get() {
            return Ok(schema);
        }

        let schema = match &self.source {
            SchemaSource::Snapshot(path) => document::load(path)?,
            SchemaSource::Sqlite(path) => sqlite::introspect_path(path)?,
            SchemaSource::InMemory(schema) => schema.clone(),
        };
        tracing::debug!(tables = schema.tables.len(), "schema extracted");

        Ok(self.cache.get_or_init(|| schema))
    }
}

impl Service for SchemaIntrospector {
    fn health_check(&self) -> Result<HealthStatus> {
        match self.source.path() {
            Some(path) if !path.exists() => Err(GeneratorError::SchemaExtraction {
                message: format!("schema source {} does not exist", path.display()),
            }),
            _ => Ok(HealthStatus::Healthy),
        }
    }
}
