//! Pipeline stages.
//!
//! Stages run in ascending [`Stage::priority`] order:
//!
//! | stage                   | priority | idempotent |
//! |-------------------------|----------|------------|
//! | `validation`            | 10       | yes        |
//! | `schema_analysis`       | 20       | yes        |
//! | `model_generation`      | 30       | yes        |
//! | `typescript_generation` | 40       | no         |
//! | `formatting`            | 50       | yes        |
//! | `file_writing`          | 60       | no         |

pub mod file_writing;
pub mod formatting;
pub mod model_generation;
pub mod schema_analysis;
pub mod typescript_generation;
pub mod validation;

use std::rc::Rc;

use crate::clock::Clock;
use crate::context::GenerationContext;
use crate::diagnostic::Result;
use crate::pipeline::Pipeline;
use crate::registry::ServiceRegistry;
use crate::report::Reporter;

pub use file_writing::FileWritingStage;
pub use formatting::{FormatterRunner, FormattingReport, FormattingStage, PrettierRunner};
pub use model_generation::ModelGenerationStage;
pub use schema_analysis::SchemaAnalysisStage;
pub use typescript_generation::TypeScriptGenerationStage;
pub use validation::{RequiredField, ValidationStage};

/// Execution priorities. Lower runs earlier.
pub mod priority {
    pub const VALIDATION: i32 = 10;
    pub const SCHEMA_ANALYSIS: i32 = 20;
    pub const MODEL_GENERATION: i32 = 30;
    pub const TYPESCRIPT_GENERATION: i32 = 40;
    pub const FORMATTING: i32 = 50;
    pub const FILE_WRITING: i32 = 60;
}

/// Injected collaborators available to every stage.
pub struct StageEnv<'a> {
    pub clock: &'a dyn Clock,
    pub reporter: &'a dyn Reporter,
}

/// One unit of pipeline work.
pub trait Stage {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Lower runs earlier.
    fn priority(&self) -> i32;

    /// Whether re-running without cleanup is free of duplicate side effects.
    /// Advisory only.
    fn idempotent(&self) -> bool {
        true
    }

    /// A stage returning false is skipped without error.
    fn can_run(&self, _context: &GenerationContext) -> bool {
        true
    }

    /// Returns a new context; must not rely on mutating `context`.
    fn process(&self, context: &GenerationContext, env: &StageEnv<'_>) -> Result<GenerationContext>;
}

/// Validation and schema analysis only.
pub fn analysis_pipeline(registry: Rc<ServiceRegistry>) -> Result<Pipeline> {
    Pipeline::new()
        .with_stage(Box::new(ValidationStage::new()))?
        .with_stage(Box::new(SchemaAnalysisStage::new(registry)))
}

/// The full generation pipeline.
pub fn standard_pipeline(registry: Rc<ServiceRegistry>, formatter: Rc<dyn FormatterRunner>) -> Result<Pipeline> {
    Pipeline::new()
        .with_stage(Box::new(ValidationStage::new()))?
        .with_stage(Box::new(SchemaAnalysisStage::new(registry.clone())))?
        .with_stage(Box::new(ModelGenerationStage::new(registry.clone())))?
        .with_stage(Box::new(TypeScriptGenerationStage::new(registry.clone())))?
        .with_stage(Box::new(FormattingStage::new(formatter)))?
        .with_stage(Box::new(FileWritingStage::new(registry)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::GenerationOptions;
    use crate::schema::Schema;
    use crate::services::{register_defaults, SchemaSource};

    #[test]
    fn test_standard_pipeline_order() {
        let registry = Rc::new(ServiceRegistry::new(Rc::new(SystemClock)));
        register_defaults(&registry, SchemaSource::InMemory(Schema::default()), &GenerationOptions::default()).unwrap();

        let pipeline = standard_pipeline(registry, Rc::new(PrettierRunner)).unwrap();
        assert_eq!(
            pipeline.execution_order(),
            vec![
                "validation",
                "schema_analysis",
                "model_generation",
                "typescript_generation",
                "formatting",
                "file_writing",
            ]
        );
        assert_eq!(
            pipeline.non_idempotent_stages().into_iter().collect::<Vec<_>>(),
            vec!["file_writing", "typescript_generation"]
        );
    }
}
