//! Error types for the NESL compiler

use crate::parser::diagnostics::{CompilationError, Severity};
use thiserror::Error;

/// NESL compiler errors
#[derive(Error, Debug, Clone)]
pub enum Error {
    // Front end
    /// Compilation produced at least one `Error`-severity diagnostic
    ///
    /// **Triggered by:** `NeslCompiler::compile` when any pass reported an error
    /// **Message:** every error line in `{path}(line,col): error NESLxxxx: Kind` form;
    /// every warning line when warnings were promoted to errors
    #[error("{}", render_errors(.diagnostics))]
    Compilation {
        /// Every diagnostic of the run, warnings included
        diagnostics: Vec<CompilationError>,
    },

    /// Block comments are not supported by the lexer
    #[error("{path}({line},{column}): multi-line comments are not implemented")]
    UnsupportedComment {
        /// Source file path
        path: String,
        /// Line of the `/*`
        line: usize,
        /// Column of the `/*`
        column: usize,
    },

    // IR contract violations
    /// Operation is not valid for the current state or variant of an object
    ///
    /// **Example:** asking a generic type parameter for its fields
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Argument outside of the accepted range
    ///
    /// **Example:** `make_generic` with the wrong number of type arguments
    #[error("Argument `{parameter}` out of range: {message}")]
    ArgumentOutOfRange {
        /// Name of the offending argument
        parameter: &'static str,
        /// Description of the accepted range
        message: String,
    },

    /// Feature the compiler does not implement yet
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Type lookup by name or id failed
    #[error("Type not found: {0}")]
    TypeNotFound(String),

    /// Method lookup by name or id failed
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Assembly is not registered in the object storage
    #[error("Assembly not found: {0}")]
    AssemblyNotFound(String),

    // Binary formats
    /// Reader ran past the end of its buffer
    #[error("Unexpected end of data: needed {needed} bytes, {available} available")]
    UnexpectedEndOfData {
        /// Bytes requested by the read
        needed: usize,
        /// Bytes left in the buffer
        available: usize,
    },

    /// Malformed serialized data
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Backends
    /// SPIR-V module builder rejected an instruction
    #[error("SPIR-V error: {0}")]
    SpirV(String),

    /// Reference interpreter trapped
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Error lines, or every line when warnings alone failed the run
fn render_errors(diagnostics: &[CompilationError]) -> String {
    let errors: Vec<String> = diagnostics
        .iter()
        .filter(|diagnostic| diagnostic.severity() == Severity::Error)
        .map(ToString::to_string)
        .collect();
    if !errors.is_empty() {
        return errors.join("\n");
    }
    diagnostics
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

impl From<rspirv::dr::Error> for Error {
    fn from(error: rspirv::dr::Error) -> Self {
        Error::SpirV(format!("{:?}", error))
    }
}

impl Error {
    /// Create an invalid-operation error with a message
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Error::InvalidOperation(msg.into())
    }

    /// Create a runtime error with a message
    pub fn runtime(msg: impl Into<String>) -> Self {
        Error::Runtime(msg.into())
    }

    /// Create a serialization error with a message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Error::Serialization(msg.into())
    }

    /// Whether the caller can fix this by changing the source code.
    ///
    /// Everything except a diagnostics-carrying compilation failure is an
    /// internal invariant violation of the compiler.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Compilation { .. })
    }

    /// Diagnostics carried by a compilation failure
    pub fn diagnostics(&self) -> &[CompilationError] {
        match self {
            Error::Compilation { diagnostics } => diagnostics,
            _ => &[],
        }
    }
}

/// Result type for NESL operations
pub type Result<T> = std::result::Result<T, Error>;
