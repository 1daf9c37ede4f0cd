//! # NESL Compiler - source files to a typed assembly
//!
//! Entry points of the front end. A compilation turns a set of source files
//! into one [`NeslAssembly`] that implicitly depends on the built-in
//! [`default_library`].
//!
//! ## Architecture
//!
//! ```text
//! Sources → Lexer → 8 parser passes → NeslAssembly (IR + IL) → SpirVCompiler → SPIR-V
//!                                            └────────────→ Interpreter
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use nesl::compiler::{CompileOptions, NeslCompiler};
//! use nesl::parser::SourceFile;
//!
//! let files = vec![SourceFile::new("Shaders/Add.nesl", source)];
//! let compiler = NeslCompiler::new(CompileOptions::default());
//! let assembly = compiler.compile("Shaders", "shaders.nesl", &files, &[])?;
//! ```

pub mod default_library;

pub use default_library::{default_library, DEFAULT_LIBRARY_NAME};

use crate::error::{Error, Result};
use crate::ir::{NeslAssembly, NeslAssemblyBuilder};
use crate::parser::{has_errors, parse_assembly, CompilationError, Severity, SourceFile};
use std::sync::Arc;
use tracing::{info, warn};

/// Compilation options
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Upper bound on worker threads per parser pass
    pub max_parallelism: usize,
    /// Add the built-in `System` assembly to the dependencies
    pub include_default_library: bool,
    /// Fail on warnings as well
    pub treat_warnings_as_errors: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            max_parallelism: num_cpus::get(),
            include_default_library: true,
            treat_warnings_as_errors: false,
        }
    }
}

/// Result of [`NeslCompiler::try_compile`]
#[derive(Debug)]
pub struct CompilationOutcome {
    /// The assembly; `None` when compilation failed
    pub assembly: Option<Arc<NeslAssembly>>,
    /// Every diagnostic, warnings included
    pub diagnostics: Vec<CompilationError>,
}

impl CompilationOutcome {
    /// Whether an assembly was produced
    pub fn succeeded(&self) -> bool {
        self.assembly.is_some()
    }

    /// Diagnostics with `Warning` severity
    pub fn warnings(&self) -> impl Iterator<Item = &CompilationError> {
        self.diagnostics
            .iter()
            .filter(|diagnostic| diagnostic.severity() == Severity::Warning)
    }
}

/// NESL source to IR compiler
pub struct NeslCompiler {
    options: CompileOptions,
}

impl Default for NeslCompiler {
    fn default() -> Self {
        Self::new(CompileOptions::default())
    }
}

impl NeslCompiler {
    /// Create a new compiler with options
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    /// Options in use
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compiles `files` into an assembly.
    ///
    /// Fails with [`Error::Compilation`] carrying every diagnostic when any
    /// error was reported; internal failures propagate as other variants.
    pub fn compile(
        &self,
        assembly_name: &str,
        assembly_path: &str,
        files: &[SourceFile],
        dependencies: &[Arc<NeslAssembly>],
    ) -> Result<Arc<NeslAssembly>> {
        let outcome = self.try_compile(assembly_name, assembly_path, files, dependencies)?;
        match outcome.assembly {
            Some(assembly) => Ok(assembly),
            None => Err(Error::Compilation {
                diagnostics: outcome.diagnostics,
            }),
        }
    }

    /// Compiles `files`, reporting diagnostics instead of failing on them.
    ///
    /// Only internal failures (unsupported comments, IR invariant
    /// violations) are returned as `Err`.
    pub fn try_compile(
        &self,
        assembly_name: &str,
        assembly_path: &str,
        files: &[SourceFile],
        dependencies: &[Arc<NeslAssembly>],
    ) -> Result<CompilationOutcome> {
        info!(assembly = assembly_name, files = files.len(), "compiling assembly");

        let mut all_dependencies = dependencies.to_vec();
        if self.options.include_default_library {
            let library = default_library()?;
            if !all_dependencies.iter().any(|dependency| Arc::ptr_eq(dependency, &library)) {
                all_dependencies.push(library);
            }
        }

        let builder = NeslAssemblyBuilder::new(assembly_name, assembly_path, all_dependencies);
        let diagnostics = parse_assembly(&builder, files, self.options.max_parallelism.max(1))?;

        let failed = has_errors(&diagnostics)
            || (self.options.treat_warnings_as_errors && !diagnostics.is_empty());
        if failed {
            return Ok(CompilationOutcome {
                assembly: None,
                diagnostics,
            });
        }
        if !diagnostics.is_empty() {
            warn!(
                assembly = assembly_name,
                warnings = diagnostics.len(),
                "compilation finished with warnings"
            );
        }

        Ok(CompilationOutcome {
            assembly: Some(builder.finish()),
            diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::CompilationErrorType;

    fn compile(code: &str) -> CompilationOutcome {
        NeslCompiler::default()
            .try_compile("Test", "test.nesl", &[SourceFile::new("Test.nesl", code)], &[])
            .unwrap()
    }

    #[test]
    fn test_empty_struct() {
        let outcome = compile("public struct Empty { }");
        assert!(outcome.succeeded(), "{:?}", outcome.diagnostics);
        let assembly = outcome.assembly.unwrap();
        assert_eq!(assembly.types().len(), 1);
        assert_eq!(assembly.types()[0].full_name(), "Test.Empty");
    }

    #[test]
    fn test_unknown_type_fails() {
        let outcome = compile("public struct Broken { public Missing Value; }");
        assert!(!outcome.succeeded());
        assert_eq!(outcome.diagnostics[0].error_type, CompilationErrorType::TypeNotFound);
    }

    #[test]
    fn test_compile_error_message() {
        let error = NeslCompiler::default()
            .compile(
                "Test",
                "test.nesl",
                &[SourceFile::new("Test.nesl", "public struct A { public Missing B; }")],
                &[],
            )
            .unwrap_err();
        assert!(error.is_recoverable());
        assert_eq!(error.to_string(), "Test.nesl(1,26): error NESL0010: TypeNotFound");
    }

    #[test]
    fn test_warnings_as_errors() {
        let options = CompileOptions {
            treat_warnings_as_errors: true,
            ..CompileOptions::default()
        };
        let outcome = NeslCompiler::new(options)
            .try_compile(
                "Test",
                "test.nesl",
                &[SourceFile::new("Test.nesl", "using Nowhere;\npublic struct A { }")],
                &[],
            )
            .unwrap();
        assert!(!outcome.succeeded());
        assert_eq!(outcome.warnings().count(), 1);
    }

    #[test]
    fn test_promoted_warnings_are_rendered() {
        let options = CompileOptions {
            treat_warnings_as_errors: true,
            ..CompileOptions::default()
        };
        let error = NeslCompiler::new(options)
            .compile(
                "Test",
                "test.nesl",
                &[SourceFile::new("Test.nesl", "using Nowhere;\npublic struct A { }")],
                &[],
            )
            .unwrap_err();
        assert!(matches!(&error, Error::Compilation { diagnostics } if diagnostics.len() == 1));
        let message = error.to_string();
        assert!(message.starts_with("Test.nesl(1,"));
        assert!(message.contains("warning NESL0029: UsingNotFound"));
    }

    #[test]
    fn test_multi_line_comment_is_fatal() {
        let result = NeslCompiler::default().try_compile(
            "Test",
            "test.nesl",
            &[SourceFile::new("Test.nesl", "/* no */ public struct A { }")],
            &[],
        );
        assert!(matches!(result, Err(Error::UnsupportedComment { .. })));
    }
}
