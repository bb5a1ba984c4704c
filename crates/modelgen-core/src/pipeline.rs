//! Ordered, fail-fast execution of stages over a context.

use std::collections::BTreeSet;

use crate::clock::Clock;
use crate::context::GenerationContext;
use crate::diagnostic::{GeneratorError, Result};
use crate::report::Reporter;
use crate::stages::{Stage, StageEnv};

/// What a pipeline run did.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// The context returned by the last executed stage.
    pub context: GenerationContext,
    /// Stages that ran, in order.
    pub executed: Vec<&'static str>,
    /// Stages whose `can_run` returned false.
    pub skipped: Vec<&'static str>,
}

/// A set of stages run in ascending priority order.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a stage. Each stage name may be registered once.
    pub fn register(&mut self, stage: Box<dyn Stage>) -> Result<()> {
        if self.stages.iter().any(|s| s.name() == stage.name()) {
            return Err(GeneratorError::DuplicateStage {
                name: stage.name().to_string(),
            });
        }
        self.stages.push(stage);
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_stage(mut self, stage: Box<dyn Stage>) -> Result<Self> {
        self.register(stage)?;
        Ok(self)
    }

    /// Stage names in execution order. Equal priorities keep registration order.
    pub fn execution_order(&self) -> Vec<&'static str> {
        self.ordered().iter().map(|s| s.name()).collect()
    }

    /// Names of registered stages that declare side effects on re-run.
    pub fn non_idempotent_stages(&self) -> BTreeSet<&'static str> {
        self.stages
            .iter()
            .filter(|s| !s.idempotent())
            .map(|s| s.name())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    fn ordered(&self) -> Vec<&dyn Stage> {
        let mut ordered: Vec<&dyn Stage> = self.stages.iter().map(|s| s.as_ref()).collect();
        ordered.sort_by_key(|s| s.priority());
        ordered
    }

    /// Runs every stage against `context`.
    ///
    /// The first error aborts the run and comes back wrapped in
    /// [`GeneratorError::Stage`] with the context the stage was given.
    pub fn run(
        &self,
        context: GenerationContext,
        clock: &dyn Clock,
        reporter: &dyn Reporter,
    ) -> Result<PipelineRun> {
        let env = StageEnv { clock, reporter };
        let mut context = context;
        let mut executed = Vec::new();
        let mut skipped = Vec::new();

        for stage in self.ordered() {
            if !stage.can_run(&context) {
                tracing::debug!(stage = stage.name(), "stage skipped");
                skipped.push(stage.name());
                continue;
            }

            tracing::debug!(stage = stage.name(), priority = stage.priority(), "running stage");
            context = match stage.process(&context, &env) {
                Ok(next) => next,
                Err(e) => return Err(e.in_stage(stage.name(), &context)),
            };
            executed.push(stage.name());
        }

        Ok(PipelineRun {
            context,
            executed,
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::GenerationOptions;
    use crate::context::{keys, MetadataValue, StageExecution};
    use crate::report::NullReporter;
    use serde_json::Value;

    struct Fake {
        name: &'static str,
        priority: i32,
        runnable: bool,
        fails: bool,
    }

    impl Fake {
        fn new(name: &'static str, priority: i32) -> Self {
            Self { name, priority, runnable: true, fails: false }
        }
    }

    impl Stage for Fake {
        fn name(&self) -> &'static str {
            self.name
        }

        fn description(&self) -> &'static str {
            "test stage"
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn can_run(&self, _context: &GenerationContext) -> bool {
            self.runnable
        }

        fn process(&self, context: &GenerationContext, env: &StageEnv<'_>) -> Result<GenerationContext> {
            if self.fails {
                return Err(GeneratorError::validation("boom"));
            }
            Ok(context.with_execution(StageExecution::new(self.name, env.clock.now())))
        }
    }

    fn run(pipeline: &Pipeline) -> Result<PipelineRun> {
        pipeline.run(
            GenerationContext::new(GenerationOptions::default()),
            &SystemClock,
            &NullReporter,
        )
    }

    #[test]
    fn test_ascending_priority_runs_first() {
        let pipeline = Pipeline::new()
            .with_stage(Box::new(Fake::new("late", 60))).unwrap()
            .with_stage(Box::new(Fake::new("early", 10))).unwrap()
            .with_stage(Box::new(Fake::new("middle", 30))).unwrap();

        let run = run(&pipeline).unwrap();
        assert_eq!(run.executed, vec!["early", "middle", "late"]);
        let audit: Vec<_> = run
            .context
            .metadata()
            .executions()
            .iter()
            .map(|e| e.stage_name.clone())
            .collect();
        assert_eq!(audit, vec!["early", "middle", "late"]);
    }

    #[test]
    fn test_equal_priorities_keep_registration_order() {
        let pipeline = Pipeline::new()
            .with_stage(Box::new(Fake::new("b", 10))).unwrap()
            .with_stage(Box::new(Fake::new("a", 10))).unwrap();
        assert_eq!(pipeline.execution_order(), vec!["b", "a"]);
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let mut pipeline = Pipeline::new();
        pipeline.register(Box::new(Fake::new("x", 1))).unwrap();
        let err = pipeline.register(Box::new(Fake::new("x", 2))).unwrap_err();
        assert!(matches!(err, GeneratorError::DuplicateStage { .. }));
    }

    #[test]
    fn test_skipped_stage_is_not_an_error() {
        let mut skipped = Fake::new("skipped", 20);
        skipped.runnable = false;
        let pipeline = Pipeline::new()
            .with_stage(Box::new(Fake::new("first", 10))).unwrap()
            .with_stage(Box::new(skipped)).unwrap();

        let run = run(&pipeline).unwrap();
        assert_eq!(run.executed, vec!["first"]);
        assert_eq!(run.skipped, vec!["skipped"]);
    }

    #[test]
    fn test_failure_aborts_and_wraps() {
        let mut failing = Fake::new("failing", 20);
        failing.fails = true;
        let pipeline = Pipeline::new()
            .with_stage(Box::new(Fake::new("first", 10))).unwrap()
            .with_stage(Box::new(failing)).unwrap()
            .with_stage(Box::new(Fake::new("never", 30))).unwrap();

        let err = run(&pipeline).unwrap_err();
        match err {
            GeneratorError::Stage { stage, context, source } => {
                assert_eq!(stage, "failing");
                assert_eq!(context.metadata().executions().len(), 1);
                assert!(matches!(*source, GeneratorError::Validation { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_input_context_is_not_mutated() {
        let pipeline = Pipeline::new().with_stage(Box::new(Fake::new("only", 1))).unwrap();
        let input = GenerationContext::new(GenerationOptions::default())
            .with_metadata(keys::TABLE_COUNT, MetadataValue::Json(Value::from(1)))
            .unwrap();
        let run = pipeline.run(input.clone(), &SystemClock, &NullReporter).unwrap();
        assert!(input.metadata().executions().is_empty());
        assert_eq!(run.context.metadata().executions().len(), 1);
    }
}
