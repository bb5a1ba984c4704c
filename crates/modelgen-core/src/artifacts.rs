//! Generated artifacts and the write requests built from them.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// File names of one table's three model artifacts, relative to the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactFilenames {
    pub data: PathBuf,
    pub active: PathBuf,
    pub reactive: PathBuf,
}

impl ArtifactFilenames {
    /// Standard layout: `types/<stem>-data.ts`, `<stem>.ts`, `reactive-<stem>.ts`.
    pub fn for_stem(stem: &str) -> Self {
        Self {
            data: PathBuf::from("types").join(format!("{}-data.ts", stem)),
            active: PathBuf::from(format!("{}.ts", stem)),
            reactive: PathBuf::from(format!("reactive-{}.ts", stem)),
        }
    }

    pub fn len(&self) -> usize {
        3
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = (WriteKind, &PathBuf)> {
        [
            (WriteKind::DataInterface, &self.data),
            (WriteKind::ActiveModel, &self.active),
            (WriteKind::ReactiveModel, &self.reactive),
        ]
        .into_iter()
    }
}

/// The three rendered sources for one table. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactBundle {
    pub table: String,
    pub data_interface: String,
    pub active_model: String,
    pub reactive_model: String,
    pub filenames: ArtifactFilenames,
}

impl ArtifactBundle {
    /// Content for one artifact kind; `None` for aggregate kinds.
    pub fn content(&self, kind: WriteKind) -> Option<&str> {
        match kind {
            WriteKind::DataInterface => Some(&self.data_interface),
            WriteKind::ActiveModel => Some(&self.active_model),
            WriteKind::ReactiveModel => Some(&self.reactive_model),
            WriteKind::Index | WriteKind::Config => None,
        }
    }
}

/// What a generated file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteKind {
    DataInterface,
    ActiveModel,
    ReactiveModel,
    Index,
    Config,
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WriteKind::DataInterface => "data",
            WriteKind::ActiveModel => "active",
            WriteKind::ReactiveModel => "reactive",
            WriteKind::Index => "index",
            WriteKind::Config => "config",
        };
        f.write_str(s)
    }
}

/// A file the generator wants on disk. `path` is relative to the output directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteRequest {
    pub path: PathBuf,
    pub content: String,
    pub kind: WriteKind,
}

impl WriteRequest {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>, kind: WriteKind) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            kind,
        }
    }
}

/// Outcome of one write request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "result", content = "message")]
pub enum WriteOutcome {
    Created,
    Identical,
    Error(String),
}

impl WriteOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            WriteOutcome::Created => "create",
            WriteOutcome::Identical => "identical",
            WriteOutcome::Error(_) => "error",
        }
    }
}

/// A write request after it has been applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteResult {
    pub path: PathBuf,
    pub kind: WriteKind,
    #[serde(flatten)]
    pub outcome: WriteOutcome,
}

/// Counts of write outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteTally {
    pub created: usize,
    pub identical: usize,
    pub errors: usize,
}

impl WriteTally {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a WriteResult>) -> Self {
        let mut tally = Self::default();
        for result in results {
            tally.record(&result.outcome);
        }
        tally
    }

    pub fn record(&mut self, outcome: &WriteOutcome) {
        match outcome {
            WriteOutcome::Created => self.created += 1,
            WriteOutcome::Identical => self.identical += 1,
            WriteOutcome::Error(_) => self.errors += 1,
        }
    }

    pub fn add(&mut self, other: WriteTally) {
        self.created += other.created;
        self.identical += other.identical;
        self.errors += other.errors;
    }
}
