//! Persists write requests through the file manager.

use std::rc::Rc;
use std::sync::Arc;

use crate::artifacts::{WriteRequest, WriteResult, WriteTally};
use crate::context::{keys, GenerationContext, MetadataValue, StageExecution};
use crate::diagnostic::{GeneratorError, Result};
use crate::registry::ServiceRegistry;
use crate::report::FileStatus;
use crate::services::{names, FileManager};

use super::{priority, Stage, StageEnv};

pub struct FileWritingStage {
    registry: Rc<ServiceRegistry>,
}

impl FileWritingStage {
    pub fn new(registry: Rc<ServiceRegistry>) -> Self {
        Self { registry }
    }

    /// Formatted requests when formatting produced them, raw ones otherwise.
    fn pending<'a>(&self, context: &'a GenerationContext) -> Option<&'a [WriteRequest]> {
        context
            .write_requests(keys::FORMATTED_WRITE_REQUESTS)
            .or_else(|| context.write_requests(keys::WRITE_REQUESTS))
    }
}

impl Stage for FileWritingStage {
    fn name(&self) -> &'static str {
        "file_writing"
    }

    fn description(&self) -> &'static str {
        "Writes generated files, skipping unchanged content"
    }

    fn priority(&self) -> i32 {
        priority::FILE_WRITING
    }

    fn idempotent(&self) -> bool {
        false
    }

    fn can_run(&self, context: &GenerationContext) -> bool {
        !context.options().dry_run && self.pending(context).is_some()
    }

    fn process(&self, context: &GenerationContext, env: &StageEnv<'_>) -> Result<GenerationContext> {
        let requests = self
            .pending(context)
            .ok_or_else(|| GeneratorError::validation("file writing needs write_requests"))?;
        let files = self.registry.get::<FileManager>(names::FILE_WRITER)?;
        let force = context.options().force;

        // I/O failures are recorded per file and never abort siblings.
        let results: Vec<WriteResult> = requests
            .iter()
            .map(|request| {
                let result = files.write(request, force);
                env.reporter
                    .file_status(FileStatus::from(&result.outcome), &files.root().join(&result.path));
                result
            })
            .collect();

        let tally = WriteTally::from_results(&results);
        if tally.errors > 0 {
            tracing::warn!(errors = tally.errors, "some files could not be written");
        }

        Ok(context
            .with_metadata(keys::WRITE_RESULTS, MetadataValue::WriteResults(Arc::new(results)))?
            .with_execution(
                StageExecution::new(self.name(), env.clock.now())
                    .with_counter("created", tally.created as u64)
                    .with_counter("identical", tally.identical as u64)
                    .with_counter("errors", tally.errors as u64),
            ))
    }
}
