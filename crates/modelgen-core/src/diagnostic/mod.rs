//! Diagnostic types for error reporting.

mod error;

pub use error::GeneratorError;

/// Result alias used throughout the generator.
pub type Result<T> = std::result::Result<T, GeneratorError>;
