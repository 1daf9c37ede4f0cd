//! # NESL - a shader language compiler
//!
//! NESL is a C#-flavored shading language. This crate compiles NESL source
//! files into a typed, serializable assembly (types, methods, attributes and
//! compact IL bodies), and lowers the shader entry points of an assembly to a
//! SPIR-V module. A reference interpreter runs the same IL on the CPU.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use nesl::compiler::NeslCompiler;
//! use nesl::parser::SourceFile;
//! use nesl::runtime::{Interpreter, Value};
//! use nesl::spirv::SpirVCompiler;
//!
//! # fn main() -> nesl::Result<()> {
//! let source = r#"
//!     using System;
//!     public static class Double {
//!         public static RwBuffer<uint> Values;
//!         [Kernel(64, 1, 1)]
//!         public static void Main() {
//!             uint index = ComputeUtils.GlobalInvocation3.X;
//!             if (index < Values.Length) { Values[index] = Values[index] * 2; }
//!         }
//!     }
//! "#;
//!
//! let files = vec![SourceFile::new("Shaders/Double.nesl", source)];
//! let assembly = NeslCompiler::default().compile("Shaders", "shaders.nesl", &files, &[])?;
//!
//! // GPU: one SPIR-V module with a GLCompute entry point and one storage buffer
//! let module = SpirVCompiler::default().compile(&assembly)?;
//! assert_eq!(module.entry_points[0].name, "Main");
//!
//! // CPU: same IL, interpreted
//! let main = assembly.get_type("Shaders.Double").unwrap().get_methods("Main")?[0].clone();
//! let mut interpreter = Interpreter::default();
//! interpreter.bind_buffer("Shaders.Double.Values", vec![Value::UInt(21); 64]);
//! interpreter.dispatch(&main, [1, 1, 1])?;
//! assert_eq!(interpreter.read_buffer("Shaders.Double.Values")?[0], Value::UInt(42));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Source files → lexer → 8 parser passes → NeslAssembly (IR + IL) ─┬→ SpirVCompiler → SPIR-V words
//!                                                 │                ├→ Interpreter
//!                                                 └─ generics      └→ get_raw_bytes / load
//! ```
//!
//! ### Main Components
//!
//! - [`lexer`] - tokens with bracket partner distances
//! - [`parser`] - the passes, diagnostics and method body → IL lowering
//! - [`ir`] - assemblies, types, methods, fields, attributes and the generics engine
//! - [`il`] - opcodes, containers, generator and disassembler
//! - [`serialization`] - binary assembly format
//! - [`compiler`] - [`NeslCompiler`] and the built-in `System` library
//! - [`spirv`] - [`SpirVCompiler`]
//! - [`runtime`] - [`Interpreter`]
//!
//! ## Error Handling
//!
//! Source errors are collected as [`parser::CompilationError`] values and
//! surface together in [`Error::Compilation`]; every other [`Error`] variant
//! is an internal failure.
//!
//! ## License
//!
//! Licensed under the [MIT License](https://opensource.org/licenses/MIT).

#![allow(clippy::needless_range_loop)] // Index needed for error messages

/// Version of the NESL compiler
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod compiler;
pub mod error;
pub mod il;
pub mod ir;
pub mod lexer;
pub mod parallel;
pub mod parser;
pub mod runtime;
pub mod serialization;
pub mod spirv;

// Re-export main types
pub use compiler::{CompilationOutcome, CompileOptions, NeslCompiler};
pub use error::{Error, Result};
pub use ir::{NeslAssembly, NeslMethod, NeslType};
pub use lexer::{lex, Token, TokenKind};
pub use parser::{CompilationError, CompilationErrorType, Severity, SourceFile};
pub use runtime::{Interpreter, Value};
pub use spirv::{SpirVCompilationResult, SpirVCompiler, SpirVCompilerOptions};
