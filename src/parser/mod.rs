//! NESL Parser Module
//!
//! Builds the typed IR of an assembly from source files in eight passes
//! (see [`passes`]). Declarations are recognized per file, names are resolved
//! once every type is known, and method bodies are lowered to IL last.
//!
//! Diagnostics are values, collected per file, type or method and merged
//! when all passes are done.

mod body;
mod cursor;
mod declarations;
pub mod diagnostics;
mod literal;
mod operators;
mod passes;
mod scope;
pub mod storage;
pub mod syntax;

pub use declarations::namespace_from_path;
pub use diagnostics::{has_errors, merge, CompilationError, CompilationErrorType, Severity};
pub use literal::LiteralValue;
pub use passes::SourceFile;
pub use scope::keyword_type;
pub use storage::{ParserStorage, Requested};

pub(crate) use passes::parse_assembly;
