//! Generation configuration.

use std::path::{Path, PathBuf};
use serde::Deserialize;

use crate::diagnostic::{GeneratorError, Result};

/// Default output directory for generated models.
pub const DEFAULT_OUTPUT_DIR: &str = "frontend/src/lib/models";

/// Default upper bound on files handed to one formatter invocation.
pub const DEFAULT_BATCH_MAX_FILES: usize = 50;

/// Default upper bound on estimated formatter memory per batch.
pub const DEFAULT_BATCH_MAX_MEMORY_MB: usize = 256;

/// Configuration for one generation run.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    /// Generate only this table.
    pub table: Option<String>,

    /// Tables to skip (ignored when `table` is set).
    pub exclude_tables: Vec<String>,

    /// Report what would be written without touching disk.
    pub dry_run: bool,

    /// Write files even when their content is semantically unchanged.
    pub force: bool,

    /// Directory generated files are written under.
    pub output_dir: PathBuf,

    /// Maximum files per batch formatter invocation.
    pub batch_max_files: usize,

    /// Maximum estimated formatter memory per batch, in megabytes.
    pub batch_max_memory_mb: usize,

    /// Skip the external formatter entirely.
    pub skip_formatter: bool,

    /// Fail (instead of warn) on empty tables and unknown relationship kinds.
    pub strict: bool,

    /// Fail (instead of emitting `unknown`) on unrecognized SQL types.
    pub strict_types: bool,

    /// Directory the frontend project root is searched from.
    pub project_root: PathBuf,

    /// JSON descriptor listing models that include the loggable capability.
    pub loggable_manifest: Option<PathBuf>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            table: None,
            exclude_tables: Vec::new(),
            dry_run: false,
            force: false,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            batch_max_files: DEFAULT_BATCH_MAX_FILES,
            batch_max_memory_mb: DEFAULT_BATCH_MAX_MEMORY_MB,
            skip_formatter: false,
            strict: true,
            strict_types: false,
            project_root: PathBuf::from("."),
            loggable_manifest: None,
        }
    }
}

impl GenerationOptions {
    /// Returns a copy restricted to a single table.
    pub fn for_table(&self, table: &str) -> Self {
        Self {
            table: Some(table.to_string()),
            ..self.clone()
        }
    }

    /// Whether the run targets exactly one table.
    pub fn single_table(&self) -> bool {
        self.table.is_some()
    }

    /// Loads options from a JSON config file, starting from defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| GeneratorError::ConfigFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let file: ConfigFile = serde_json::from_str(&content).map_err(|e| GeneratorError::ConfigFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut options = Self::default();
        file.apply_to(&mut options);
        Ok(options)
    }
}

/// On-disk shape of `modelgen.json`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub table: Option<String>,
    pub exclude_tables: Option<Vec<String>>,
    pub dry_run: Option<bool>,
    pub force: Option<bool>,
    pub output_dir: Option<PathBuf>,
    pub batch_max_files: Option<usize>,
    pub batch_max_memory_mb: Option<usize>,
    pub skip_formatter: Option<bool>,
    pub strict: Option<bool>,
    pub strict_types: Option<bool>,
    pub project_root: Option<PathBuf>,
    pub loggable_manifest: Option<PathBuf>,
}

impl ConfigFile {
    fn apply_to(self, options: &mut GenerationOptions) {
        if self.table.is_some() {
            options.table = self.table;
        }
        if let Some(exclude) = self.exclude_tables {
            options.exclude_tables = exclude;
        }
        if let Some(v) = self.dry_run {
            options.dry_run = v;
        }
        if let Some(v) = self.force {
            options.force = v;
        }
        if let Some(v) = self.output_dir {
            options.output_dir = v;
        }
        if let Some(v) = self.batch_max_files {
            options.batch_max_files = v;
        }
        if let Some(v) = self.batch_max_memory_mb {
            options.batch_max_memory_mb = v;
        }
        if let Some(v) = self.skip_formatter {
            options.skip_formatter = v;
        }
        if let Some(v) = self.strict {
            options.strict = v;
        }
        if let Some(v) = self.strict_types {
            options.strict_types = v;
        }
        if let Some(v) = self.project_root {
            options.project_root = v;
        }
        if self.loggable_manifest.is_some() {
            options.loggable_manifest = self.loggable_manifest;
        }
    }
}
