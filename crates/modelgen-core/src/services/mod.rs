//! Cross-stage collaborators managed by the [`ServiceRegistry`].
//!
//! Each service is a plain struct implementing [`Service`]. [`register_defaults`]
//! wires them into a registry with their static dependency lists.

pub mod default_values;
pub mod file_manager;
pub mod introspector;
pub mod polymorphic;
pub mod relationships;
pub mod templates;
pub mod type_mapper;

use std::rc::Rc;

use crate::config::GenerationOptions;
use crate::diagnostic::Result;
use crate::registry::{ServiceHandle, ServiceRegistry};

pub use default_values::DefaultValueConverter;
pub use file_manager::FileManager;
pub use introspector::{SchemaIntrospector, SchemaSource};
pub use polymorphic::{PolymorphicAnalyzer, PolymorphicDeclaration};
pub use relationships::{ProcessedRelationships, RelationshipProcessor};
pub use templates::TemplateRenderer;
pub use type_mapper::TypeMapper;

/// Registered service names.
pub mod names {
    pub const SCHEMA_INTROSPECTOR: &str = "schema_introspector";
    pub const TYPE_MAPPER: &str = "type_mapper";
    pub const DEFAULT_VALUE_CONVERTER: &str = "default_value_converter";
    pub const TEMPLATE_RENDERER: &str = "template_renderer";
    pub const POLYMORPHIC_ANALYZER: &str = "polymorphic_analyzer";
    pub const RELATIONSHIP_PROCESSOR: &str = "relationship_processor";
    pub const FILE_WRITER: &str = "file_writer";

    /// Every built-in service, in registration order.
    pub const ALL: &[&str] = &[
        SCHEMA_INTROSPECTOR,
        TYPE_MAPPER,
        DEFAULT_VALUE_CONVERTER,
        TEMPLATE_RENDERER,
        POLYMORPHIC_ANALYZER,
        RELATIONSHIP_PROCESSOR,
        FILE_WRITER,
    ];
}

/// Registers every built-in service.
pub fn register_defaults(
    registry: &ServiceRegistry,
    source: SchemaSource,
    options: &GenerationOptions,
) -> Result<()> {
    let source = Rc::new(source);
    registry.register(names::SCHEMA_INTROSPECTOR, &[], move |_| {
        Ok(ServiceHandle::new(SchemaIntrospector::new((*source).clone())))
    })?;

    let strict_types = options.strict_types;
    registry.register(names::TYPE_MAPPER, &[], move |_| {
        Ok(ServiceHandle::new(TypeMapper::new(strict_types)))
    })?;

    registry.register(names::DEFAULT_VALUE_CONVERTER, &[names::TYPE_MAPPER], |r| {
        let mapper = r.get::<TypeMapper>(names::TYPE_MAPPER)?;
        Ok(ServiceHandle::new(DefaultValueConverter::new(mapper)))
    })?;

    registry.register(names::TEMPLATE_RENDERER, &[], |_| {
        Ok(ServiceHandle::new(TemplateRenderer::new()))
    })?;

    registry.register(names::POLYMORPHIC_ANALYZER, &[], |_| {
        Ok(ServiceHandle::new(PolymorphicAnalyzer::new()))
    })?;

    registry.register(
        names::RELATIONSHIP_PROCESSOR,
        &[names::TYPE_MAPPER, names::POLYMORPHIC_ANALYZER],
        |r| {
            let mapper = r.get::<TypeMapper>(names::TYPE_MAPPER)?;
            let analyzer = r.get::<PolymorphicAnalyzer>(names::POLYMORPHIC_ANALYZER)?;
            Ok(ServiceHandle::new(RelationshipProcessor::new(mapper, analyzer)))
        },
    )?;

    let output_dir = options.output_dir.clone();
    registry.register(names::FILE_WRITER, &[], move |_| {
        Ok(ServiceHandle::new(FileManager::new(output_dir.clone())))
    })?;

    Ok(())
}
