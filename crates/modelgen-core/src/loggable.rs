//! Registry of models that include the loggable capability.
//!
//! Read from a JSON descriptor `{"models": ["Job", "Client", ...]}` produced
//! by the host application's build. Without a descriptor, or with an empty
//! one, the built-in list applies.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;

use crate::diagnostic::{GeneratorError, Result};

/// Models known to include the loggable capability.
pub const FALLBACK_LOGGABLE_MODELS: &[&str] = &[
    "Client",
    "Device",
    "Job",
    "JobAssignment",
    "Note",
    "Person",
    "ScheduledDateTime",
    "Task",
    "User",
];

#[derive(Debug, Deserialize)]
struct Descriptor {
    #[serde(default)]
    models: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggableRegistry {
    models: BTreeSet<String>,
    from_fallback: bool,
}

impl Default for LoggableRegistry {
    fn default() -> Self {
        Self::fallback()
    }
}

impl LoggableRegistry {
    pub fn fallback() -> Self {
        Self {
            models: FALLBACK_LOGGABLE_MODELS.iter().map(|m| m.to_string()).collect(),
            from_fallback: true,
        }
    }

    pub fn from_models<I, S>(models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let models: BTreeSet<String> = models.into_iter().map(Into::into).collect();
        if models.is_empty() {
            return Self::fallback();
        }
        Self {
            models,
            from_fallback: false,
        }
    }

    /// Loads the descriptor, falling back when `path` is `None` or missing.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::fallback());
        };
        if !path.exists() {
            tracing::warn!(path = %path.display(), "loggable manifest not found, using built-in list");
            return Ok(Self::fallback());
        }

        let content = std::fs::read_to_string(path).map_err(|e| GeneratorError::ConfigGeneration {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        let descriptor: Descriptor = serde_json::from_str(&content).map_err(|e| GeneratorError::ConfigGeneration {
            message: format!("invalid loggable manifest {}: {}", path.display(), e),
        })?;

        Ok(Self::from_models(descriptor.models))
    }

    pub fn includes(&self, model_name: &str) -> bool {
        self.models.contains(model_name)
    }

    pub fn is_fallback(&self) -> bool {
        self.from_fallback
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(String::as_str)
    }
}
