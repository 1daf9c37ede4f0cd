//! Declarations found by the top-level pass
//!
//! Everything here is purely syntactic. Names are resolved by later passes;
//! method bodies stay token ranges until the body pass.

use crate::ir::{Modifiers, TypeKind};
use crate::lexer::Token;
use std::ops::Range;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Reference to a type as written: `Name`, `A.B.Name` or `Name<Args>`
#[derive(Debug, Clone)]
pub struct TypeName {
    /// First token, used for diagnostics
    pub token: Token,
    /// Dotted segments
    pub segments: Vec<String>,
    /// Generic arguments
    pub arguments: Vec<TypeName>,
}

impl TypeName {
    /// Dotted name without arguments
    pub fn dotted(&self) -> String {
        self.segments.join(".")
    }
}

/// `[Name(args)]`, literal arguments only
#[derive(Debug, Clone)]
pub struct AttributeSyntax {
    /// Attribute type
    pub name: TypeName,
    /// Literal tokens; a leading `-` is folded into `negative`
    pub arguments: Vec<LiteralSyntax>,
    /// Written as `[return: Name]`
    pub on_return: bool,
}

/// Literal with an optional sign
#[derive(Debug, Clone)]
pub struct LiteralSyntax {
    /// Number or `true`/`false`
    pub token: Token,
    /// Preceded by `-`
    pub negative: bool,
}

/// `where T : A, B`
#[derive(Debug, Clone)]
pub struct ConstraintSyntax {
    /// Constrained parameter
    pub parameter: Token,
    /// Required interfaces
    pub constraints: Vec<TypeName>,
}

/// Field declaration
#[derive(Debug, Clone)]
pub struct FieldSyntax {
    /// Attributes
    pub attributes: Vec<AttributeSyntax>,
    /// Modifiers
    pub modifiers: Modifiers,
    /// Declared type
    pub field_type: TypeName,
    /// Name token
    pub name: Token,
    /// `= literal`
    pub default: Option<LiteralSyntax>,
}

/// Method parameter
#[derive(Debug, Clone)]
pub struct ParameterSyntax {
    /// Attributes
    pub attributes: Vec<AttributeSyntax>,
    /// Declared type
    pub parameter_type: TypeName,
    /// Name token
    pub name: Token,
}

/// Method declaration; the body is a token range including its braces
#[derive(Debug, Clone)]
pub struct MethodSyntax {
    /// Attributes, `[return: ...]` included
    pub attributes: Vec<AttributeSyntax>,
    /// Modifiers
    pub modifiers: Modifiers,
    /// `None` for `void`
    pub return_type: Option<TypeName>,
    /// Name token
    pub name: Token,
    /// Generic parameter names
    pub generic_parameters: Vec<Token>,
    /// Parameters
    pub parameters: Vec<ParameterSyntax>,
    /// `where` clauses
    pub constraints: Vec<ConstraintSyntax>,
    /// `{ ... }`, absent for `;`
    pub body: Option<Range<usize>>,
}

/// Type declaration
#[derive(Debug, Clone)]
pub struct TypeSyntax {
    /// Attributes
    pub attributes: Vec<AttributeSyntax>,
    /// Modifiers
    pub modifiers: Modifiers,
    /// `struct`, `class` or `interface`
    pub kind: TypeKind,
    /// Name token
    pub name: Token,
    /// Generic parameter names
    pub generic_parameters: Vec<Token>,
    /// Implemented interfaces
    pub interfaces: Vec<TypeName>,
    /// `where` clauses
    pub constraints: Vec<ConstraintSyntax>,
    /// Fields in order
    pub fields: Vec<FieldSyntax>,
    /// Methods in order
    pub methods: Vec<MethodSyntax>,
}

/// `using Namespace;`
#[derive(Debug)]
pub struct UsingSyntax {
    /// `using` keyword
    pub token: Token,
    /// Imported namespace
    pub namespace: String,
    /// Set once a type resolved through this directive
    pub used: AtomicBool,
}

/// `using Alias = Type;`
#[derive(Debug, Clone)]
pub struct AliasSyntax {
    /// Alias name
    pub name: Token,
    /// Aliased type
    pub target: TypeName,
}

/// One parsed file
#[derive(Debug)]
pub struct FileSyntax {
    /// File path
    pub path: String,
    /// Tokens of the whole file
    pub tokens: Arc<Vec<Token>>,
    /// Namespace of every type in the file
    pub namespace: String,
    /// Namespace imports
    pub usings: Vec<UsingSyntax>,
    /// Type aliases
    pub aliases: Vec<AliasSyntax>,
    /// Declared types
    pub types: Vec<TypeSyntax>,
}
