//! # SPIR-V backend
//!
//! Lowers the shader entry points of an assembly, and everything they call,
//! to one SPIR-V module built with [`rspirv`].
//!
//! ```text
//! entry points ──▶ wrappers ──▶ queued methods ──▶ FunctionLowering ──▶ Builder
//!                                     ▲                   │
//!                                     └──── calls ────────┘ (or intrinsics)
//! ```
//!
//! Generic code is lowered per instantiation: a call from a constructed
//! method is rebound through its substitution before it is queued.
//!
//! ## Usage
//!
//! ```ignore
//! use nesl::spirv::{SpirVCompiler, SpirVCompilerOptions};
//!
//! let result = SpirVCompiler::new(SpirVCompilerOptions::default()).compile(&assembly)?;
//! std::fs::write("shaders.spv", result.to_bytes())?;
//! ```

mod context;
mod entry;
mod function;
mod intrinsics;
pub mod result;
mod types;

pub use result::{
    DescriptorBinding, DescriptorKind, EntryPointInfo, InterfaceSlot, PushConstantRange, ShaderStage,
    SpirVCompilationResult,
};

use crate::error::Result;
use crate::ir::NeslAssembly;
use context::CompilationContext;
use entry::{emit_wrapper, find_entry_points};
use function::lower_function;
use rspirv::spirv::{ExecutionMode, ExecutionModel};
use std::sync::Arc;
use tracing::{debug, info};
use types::SpirVModule;

/// Backend options
#[derive(Debug, Clone)]
pub struct SpirVCompilerOptions {
    /// SPIR-V version written to the header
    pub version: (u8, u8),
    /// Emit `OpName`/`OpMemberName` for types, functions and globals
    pub emit_debug_names: bool,
}

impl Default for SpirVCompilerOptions {
    fn default() -> Self {
        Self {
            version: (1, 0),
            emit_debug_names: true,
        }
    }
}

/// Assembly to SPIR-V compiler
#[derive(Debug, Clone, Default)]
pub struct SpirVCompiler {
    options: SpirVCompilerOptions,
}

impl SpirVCompiler {
    /// Create a new backend with options
    pub fn new(options: SpirVCompilerOptions) -> Self {
        Self { options }
    }

    /// Compiles every entry point of `assembly` into one module.
    ///
    /// An assembly without entry points yields a valid module with no
    /// functions.
    pub fn compile(&self, assembly: &Arc<NeslAssembly>) -> Result<SpirVCompilationResult> {
        let requests = find_entry_points(assembly)?;
        info!(
            assembly = assembly.name(),
            entry_points = requests.len(),
            "compiling SPIR-V module"
        );

        let module = SpirVModule::new(self.options.version, self.options.emit_debug_names);
        let mut context = CompilationContext::new(module);

        let mut wrappers = Vec::with_capacity(requests.len());
        for request in &requests {
            wrappers.push(emit_wrapper(&mut context, request)?);
        }

        let mut lowered = 0usize;
        while let Some((method, id)) = context.next_pending() {
            lower_function(&mut context, &method, id)?;
            lowered += 1;
        }
        debug!(functions = lowered, "lowered functions");

        let mut entry_points = Vec::with_capacity(requests.len());
        for (request, wrapper) in requests.iter().zip(wrappers) {
            let model = match request.stage {
                ShaderStage::Compute => ExecutionModel::GLCompute,
                ShaderStage::Vertex => ExecutionModel::Vertex,
                ShaderStage::Fragment => ExecutionModel::Fragment,
            };
            let interface = context.interface(wrapper.function);
            let name = request.method.name().to_string();
            let builder = &mut context.module.builder;
            builder.entry_point(model, wrapper.function, name.clone(), interface);
            match (request.stage, request.local_size) {
                (ShaderStage::Compute, Some(size)) => {
                    builder.execution_mode(wrapper.function, ExecutionMode::LocalSize, size)
                }
                (ShaderStage::Fragment, _) => {
                    builder.execution_mode(wrapper.function, ExecutionMode::OriginUpperLeft, [])
                }
                _ => {}
            }

            entry_points.push(EntryPointInfo {
                name,
                method: request.method.full_name(),
                stage: request.stage,
                local_size: request.local_size,
                inputs: wrapper.inputs,
                outputs: wrapper.outputs,
            });
        }

        let (module, bindings, push_constants) = context.into_layout();
        let words = module.assemble();
        info!(words = words.len(), entry_points = entry_points.len(), "SPIR-V module assembled");

        Ok(SpirVCompilationResult {
            words,
            push_constants,
            bindings,
            entry_points,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::NeslCompiler;
    use crate::parser::SourceFile;
    use rspirv::dr::{load_words, Module};
    use rspirv::spirv::{Decoration, Op};

    fn compile(source: &str) -> Result<SpirVCompilationResult> {
        let assembly = NeslCompiler::default().compile(
            "Shaders",
            "shaders.nesl",
            &[SourceFile::new("Shaders/Test.nesl", source)],
            &[],
        )?;
        SpirVCompiler::default().compile(&assembly)
    }

    fn parse(result: &SpirVCompilationResult) -> Module {
        load_words(&result.words).unwrap()
    }

    const DOUBLE: &str = "using System;\n\
        public static class Double {\n\
            public static RwBuffer<uint> Values;\n\
            [Kernel(64, 1, 1)]\n\
            public static void Main() {\n\
                uint index = ComputeUtils.GlobalInvocation3.X;\n\
                if (index < Values.Length) {\n\
                    Values[index] = Values[index] * 2;\n\
                }\n\
            }\n\
        }";

    #[test]
    fn test_empty_assembly_has_header_only() {
        let result = compile("public struct Empty { public uint Value; }").unwrap();
        assert_eq!(result.words[0], rspirv::spirv::MAGIC_NUMBER);
        assert!(result.entry_points.is_empty());
        assert!(parse(&result).functions.is_empty());
    }

    #[test]
    fn test_kernel_entry_point() {
        let result = compile(DOUBLE).unwrap();
        let module = parse(&result);

        assert_eq!(result.entry_points.len(), 1);
        let entry = &result.entry_points[0];
        assert_eq!(entry.name, "Main");
        assert_eq!(entry.stage, ShaderStage::Compute);
        assert_eq!(entry.local_size, Some([64, 1, 1]));

        assert_eq!(module.entry_points.len(), 1);
        let mode = &module.execution_modes[0];
        assert_eq!(mode.operands.len(), 5);
        assert_eq!(module.functions.len(), 2);
    }

    #[test]
    fn test_buffer_binding() {
        let result = compile(DOUBLE).unwrap();
        assert_eq!(result.bindings.len(), 1);
        let binding = &result.bindings[0];
        assert_eq!(binding.name, "Shaders.Double.Values");
        assert_eq!((binding.set, binding.binding), (0, 0));
        assert_eq!(binding.kind, DescriptorKind::StorageBuffer);
        assert_eq!(binding.stride, 4);

        let module = parse(&result);
        let buffer_blocks = module
            .annotations
            .iter()
            .filter(|inst| {
                inst.class.opcode == Op::Decorate
                    && inst.operands.get(1) == Some(&rspirv::dr::Operand::Decoration(Decoration::BufferBlock))
            })
            .count();
        assert_eq!(buffer_blocks, 1);
    }

    #[test]
    fn test_debug_names_can_be_disabled() {
        let assembly = NeslCompiler::default()
            .compile(
                "Shaders",
                "shaders.nesl",
                &[SourceFile::new("Shaders/Test.nesl", DOUBLE)],
                &[],
            )
            .unwrap();
        let options = SpirVCompilerOptions {
            emit_debug_names: false,
            ..SpirVCompilerOptions::default()
        };
        let result = SpirVCompiler::new(options).compile(&assembly).unwrap();
        assert!(parse(&result).debug_names.is_empty());
    }

    #[test]
    fn test_kernel_with_parameters_is_rejected() {
        let error = compile(
            "public static class Bad {\n\
                [Kernel(1, 1, 1)] public static void Main(uint value) { }\n\
            }",
        )
        .unwrap_err();
        assert!(error.to_string().contains("must take no parameters"));
    }

    #[test]
    fn test_missing_intrinsic_is_reported() {
        let error = compile(
            "public static class Broken {\n\
                public static extern uint Missing();\n\
                [Kernel(1, 1, 1)] public static void Main() { uint value = Missing(); }\n\
            }",
        )
        .unwrap_err();
        assert!(error.to_string().contains("unable to find definition"));
    }
}
