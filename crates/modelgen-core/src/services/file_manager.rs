//! Writes generated files, skipping semantically unchanged ones.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::artifacts::{WriteOutcome, WriteRequest, WriteResult};
use crate::compare::SemanticComparator;
use crate::diagnostic::{GeneratorError, Result};
use crate::registry::{HealthStatus, Service};

#[derive(Debug, Clone)]
pub struct FileManager {
    root: PathBuf,
    comparator: SemanticComparator,
}

impl FileManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            comparator: SemanticComparator::new(),
        }
    }

    pub fn with_comparator(mut self, comparator: SemanticComparator) -> Self {
        self.comparator = comparator;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn comparator(&self) -> &SemanticComparator {
        &self.comparator
    }

    /// Absolute location of a request path, rejecting paths that escape the root.
    pub fn resolve(&self, relative: &Path) -> Result<PathBuf> {
        let escapes = relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
        if escapes || relative.as_os_str().is_empty() {
            return Err(GeneratorError::FileWriting {
                path: relative.to_path_buf(),
                message: "path must be relative to the output directory".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }

    /// Applies one write request. Failures become [`WriteOutcome::Error`].
    ///
    /// Unless `force` is set, an existing file that is semantically identical
    /// to the new content is left untouched.
    pub fn write(&self, request: &WriteRequest, force: bool) -> WriteResult {
        let outcome = match self.try_write(request, force) {
            Ok(outcome) => outcome,
            Err(e) => WriteOutcome::Error(e.to_string()),
        };
        tracing::debug!(path = %request.path.display(), outcome = outcome.label(), "write");
        WriteResult {
            path: request.path.clone(),
            kind: request.kind,
            outcome,
        }
    }

    fn try_write(&self, request: &WriteRequest, force: bool) -> Result<WriteOutcome> {
        let target = self.resolve(&request.path)?;

        if !force && target.exists() {
            let existing = fs::read_to_string(&target).map_err(|e| GeneratorError::io(&target, e.to_string()))?;
            if self.comparator.identical(&existing, &request.content) {
                return Ok(WriteOutcome::Identical);
            }
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| GeneratorError::io(parent, e.to_string()))?;
        }
        fs::write(&target, &request.content).map_err(|e| GeneratorError::io(&target, e.to_string()))?;
        Ok(WriteOutcome::Created)
    }
}

impl Service for FileManager {
    fn health_check(&self) -> Result<HealthStatus> {
        match fs::metadata(&self.root) {
            Ok(meta) if meta.permissions().readonly() => Ok(HealthStatus::Degraded),
            Ok(_) => Ok(HealthStatus::Healthy),
            // Created on first write.
            Err(_) => Ok(HealthStatus::Healthy),
        }
    }
}
