//! Per-file outcome reporting.
//!
//! Stages report what they did to each file through a [`Reporter`] instead of
//! printing. The CLI supplies a console implementation; library callers get
//! [`TracingReporter`] by default.

use std::fmt;
use std::path::Path;

use crate::artifacts::WriteOutcome;

/// Status of one file as reported to the invoking shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Create,
    Identical,
    Error,
    WouldCreate,
    WouldFormat,
    Format,
    Skip,
}

impl FileStatus {
    pub fn label(&self) -> &'static str {
        match self {
            FileStatus::Create => "create",
            FileStatus::Identical => "identical",
            FileStatus::Error => "error",
            FileStatus::WouldCreate => "would create",
            FileStatus::WouldFormat => "would format",
            FileStatus::Format => "format",
            FileStatus::Skip => "skip",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<&WriteOutcome> for FileStatus {
    fn from(outcome: &WriteOutcome) -> Self {
        match outcome {
            WriteOutcome::Created => FileStatus::Create,
            WriteOutcome::Identical => FileStatus::Identical,
            WriteOutcome::Error(_) => FileStatus::Error,
        }
    }
}

/// Sink for user-visible progress.
pub trait Reporter {
    fn file_status(&self, status: FileStatus, path: &Path);

    /// A free-form progress note.
    fn note(&self, message: &str);
}

/// Reports through `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn file_status(&self, status: FileStatus, path: &Path) {
        match status {
            FileStatus::Error => tracing::warn!(status = %status, path = %path.display(), "file"),
            _ => tracing::info!(status = %status, path = %path.display(), "file"),
        }
    }

    fn note(&self, message: &str) {
        tracing::info!("{}", message);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn file_status(&self, _status: FileStatus, _path: &Path) {}

    fn note(&self, _message: &str) {}
}
