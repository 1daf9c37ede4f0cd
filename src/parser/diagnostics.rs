//! Compile-time diagnostics
//!
//! The severity of a diagnostic is a property of its kind: the table in
//! `compilation_error_types!` is the only place a severity is chosen.

use crate::lexer::Token;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How bad a diagnostic is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Compilation still succeeds
    Warning,
    /// Compilation fails
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

macro_rules! compilation_error_types {
    ($($(#[$doc:meta])* $name:ident = $code:literal => $severity:ident,)*) => {
        /// Kind of a compile-time diagnostic
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum CompilationErrorType {
            $($(#[$doc])* $name,)*
        }

        impl CompilationErrorType {
            /// Every kind, in code order
            pub const ALL: &'static [CompilationErrorType] = &[$(CompilationErrorType::$name,)*];

            /// Numeric code rendered as `NESLxxxx`
            pub const fn code(self) -> u16 {
                match self {
                    $(CompilationErrorType::$name => $code,)*
                }
            }

            /// Severity bound to this kind
            pub const fn severity(self) -> Severity {
                match self {
                    $(CompilationErrorType::$name => Severity::$severity,)*
                }
            }

            /// Variant name
            pub const fn name(self) -> &'static str {
                match self {
                    $(CompilationErrorType::$name => stringify!($name),)*
                }
            }
        }
    };
}

compilation_error_types! {
    /// Token that cannot start or continue the current construct
    UnexpectedToken = 1 => Error,
    /// Expression that cannot be parsed or is not allowed here
    UnexpectedExpression = 2 => Error,
    /// File ended inside a construct
    UnexpectedEndOfFile = 3 => Error,
    /// Bracket without partner
    UnmatchedBracket = 4 => Error,
    /// Identifier expected
    ExpectedIdentifier = 5 => Error,
    /// `;` expected
    ExpectedSemicolon = 6 => Error,
    /// `=` expected
    ExpectedAssignment = 7 => Error,
    /// `,` expected
    ExpectedComma = 8 => Error,
    /// Type expected
    ExpectedType = 9 => Error,
    /// Type name does not resolve
    TypeNotFound = 10 => Error,
    /// Type declared twice in one assembly
    TypeAlreadyExists = 11 => Error,
    /// No method with this name
    MethodNotFound = 12 => Error,
    /// Methods with this name exist but none accepts the arguments
    MethodWithGivenArgumentsNotFound = 13 => Error,
    /// Method with the same signature declared twice
    MethodAlreadyExists = 14 => Error,
    /// No field or property with this name
    FieldNotFound = 15 => Error,
    /// Field declared twice
    FieldAlreadyExists = 16 => Error,
    /// No constructor accepts the arguments
    ConstructorNotFound = 17 => Error,
    /// No operator interface matches the operand types
    OperatorNotFound = 18 => Error,
    /// Interface method without implementation
    AbstractMethodNotImplemented = 19 => Error,
    /// `where` clause names an unknown generic parameter
    GenericParameterNotFound = 20 => Error,
    /// Generic argument does not satisfy a constraint
    GenericConstraintNotSatisfied = 21 => Error,
    /// Wrong number of generic arguments
    InvalidGenericArgumentCount = 22 => Error,
    /// Value of one type used where another is required
    ImplicitCastOperatorNotFound = 23 => Error,
    /// Body-less method that is neither abstract nor extern
    MissingModifiers = 24 => Error,
    /// Name that is neither a variable, field nor type
    VariableNotFound = 25 => Error,
    /// Local variable declared twice in one scope
    VariableAlreadyExists = 26 => Error,
    /// Literal that does not fit its type
    InvalidLiteral = 27 => Error,
    /// Attribute arguments do not match the attribute type
    InvalidAttributeArguments = 28 => Error,
    /// Using directive that names nothing
    UsingNotFound = 29 => Warning,
    /// Using directive that is never needed
    UnusedUsing = 30 => Warning,
    /// Statement after a return
    UnreachableCode = 31 => Warning,
    /// File-scoped namespace differs from the directory namespace
    NamespaceMismatch = 32 => Warning,
}

impl fmt::Display for CompilationErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A diagnostic attached to a source position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationError {
    /// File the diagnostic belongs to
    pub path: String,
    /// Line (1-indexed)
    pub line: usize,
    /// Column (1-indexed)
    pub column: usize,
    /// Kind, which fixes the severity
    pub error_type: CompilationErrorType,
    /// Extra context for tooling, not rendered
    pub detail: Option<String>,
}

impl CompilationError {
    /// Creates a diagnostic at an explicit position
    pub fn new(
        path: impl Into<String>,
        line: usize,
        column: usize,
        error_type: CompilationErrorType,
    ) -> Self {
        CompilationError {
            path: path.into(),
            line,
            column,
            error_type,
            detail: None,
        }
    }

    /// Creates a diagnostic at a token
    pub fn at(token: &Token, error_type: CompilationErrorType) -> Self {
        Self::new(token.path.as_ref(), token.line, token.column, error_type)
    }

    /// Attaches tooling context
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Severity of the kind
    pub fn severity(&self) -> Severity {
        self.error_type.severity()
    }
}

impl fmt::Display for CompilationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({},{}): {} NESL{:04}: {}",
            self.path,
            self.line,
            self.column,
            self.severity(),
            self.error_type.code(),
            self.error_type
        )
    }
}

/// Concatenates per-unit diagnostics and orders them by position
pub fn merge(lists: impl IntoIterator<Item = Vec<CompilationError>>) -> Vec<CompilationError> {
    let mut merged: Vec<CompilationError> = lists.into_iter().flatten().collect();
    merged.sort_by(|a, b| (&a.path, a.line, a.column).cmp(&(&b.path, b.line, b.column)));
    merged
}

/// Whether any diagnostic has `Error` severity
pub fn has_errors(diagnostics: &[CompilationError]) -> bool {
    diagnostics.iter().any(|d| d.severity() == Severity::Error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_format() {
        let error = CompilationError::new("file.nesl", 12, 5, CompilationErrorType::UnexpectedExpression);
        assert_eq!(
            error.to_string(),
            "file.nesl(12,5): error NESL0002: UnexpectedExpression"
        );
    }

    #[test]
    fn test_warning_format() {
        let error = CompilationError::new("b.nesl", 1, 1, CompilationErrorType::UsingNotFound);
        assert_eq!(error.to_string(), "b.nesl(1,1): warning NESL0029: UsingNotFound");
    }

    #[test]
    fn test_codes_are_unique() {
        let mut codes: Vec<u16> = CompilationErrorType::ALL.iter().map(|t| t.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), CompilationErrorType::ALL.len());
    }

    #[test]
    fn test_severity_follows_kind() {
        for &kind in CompilationErrorType::ALL {
            let first = CompilationError::new("a.nesl", 1, 1, kind);
            let second = CompilationError::new("b.nesl", 40, 17, kind);
            assert_eq!(first.severity(), kind.severity());
            assert_eq!(first.severity(), second.severity());
        }
    }

    #[test]
    fn test_merge_sorts_by_position() {
        let merged = merge(vec![
            vec![CompilationError::new("b.nesl", 1, 1, CompilationErrorType::TypeNotFound)],
            vec![
                CompilationError::new("a.nesl", 3, 2, CompilationErrorType::TypeNotFound),
                CompilationError::new("a.nesl", 3, 1, CompilationErrorType::FieldNotFound),
            ],
        ]);
        let positions: Vec<_> = merged.iter().map(|e| (e.path.as_str(), e.line, e.column)).collect();
        assert_eq!(positions, vec![("a.nesl", 3, 1), ("a.nesl", 3, 2), ("b.nesl", 1, 1)]);
    }
}
