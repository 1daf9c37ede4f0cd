//! Entry point wrappers
//!
//! A shader method is lowered like any other function. Its entry point is a
//! parameterless wrapper that reads the flattened inputs, calls the method
//! and scatters the returned value over the outputs.

use super::context::CompilationContext;
use super::result::{InterfaceSlot, ShaderStage};
use super::types::unsupported;
use crate::error::{Error, Result};
use crate::ir::attribute::find;
use crate::ir::{
    representation_of, FragmentShaderAttribute, KernelAttribute, MethodRef, NeslAssembly,
    PositionAttribute, Representation, ScalarKind, TypeRef, VertexShaderAttribute,
};
use rspirv::dr::Operand;
use rspirv::spirv::{BuiltIn, Decoration, FunctionControl, StorageClass, Word};

/// A method marked as a shader stage
pub(crate) struct EntryPointRequest {
    pub method: MethodRef,
    pub stage: ShaderStage,
    pub local_size: Option<[u32; 3]>,
}

/// The emitted wrapper of an entry point
pub(crate) struct EntryPointWrapper {
    pub function: Word,
    pub inputs: Vec<InterfaceSlot>,
    pub outputs: Vec<InterfaceSlot>,
}

/// Non-generic methods of non-generic types carrying a stage attribute, in
/// declaration order
pub(crate) fn find_entry_points(assembly: &NeslAssembly) -> Result<Vec<EntryPointRequest>> {
    let mut requests = Vec::new();
    for ty in assembly.types() {
        if ty.is_generic_definition() {
            continue;
        }
        for method in ty.methods()? {
            if !method.generic_parameters().is_empty() {
                continue;
            }
            let attributes = method.attributes()?;
            let request = if let Some(kernel) = find::<KernelAttribute>(&attributes) {
                Some((
                    ShaderStage::Compute,
                    Some([kernel.x.max(1), kernel.y.max(1), kernel.z.max(1)]),
                ))
            } else if find::<VertexShaderAttribute>(&attributes).is_some() {
                Some((ShaderStage::Vertex, None))
            } else if find::<FragmentShaderAttribute>(&attributes).is_some() {
                Some((ShaderStage::Fragment, None))
            } else {
                None
            };

            if let Some((stage, local_size)) = request {
                if !method.is_static() {
                    return Err(Error::invalid_operation(format!(
                        "entry point `{}` must be static",
                        method.full_name()
                    )));
                }
                requests.push(EntryPointRequest {
                    method,
                    stage,
                    local_size,
                });
            }
        }
    }
    Ok(requests)
}

struct WrapperBuilder<'c> {
    context: &'c mut CompilationContext,
    function: Word,
    stage: ShaderStage,
    next_input: u32,
    next_output: u32,
    inputs: Vec<InterfaceSlot>,
    outputs: Vec<InterfaceSlot>,
}

/// Emits the wrapper of `request` and queues the wrapped method
pub(crate) fn emit_wrapper(context: &mut CompilationContext, request: &EntryPointRequest) -> Result<EntryPointWrapper> {
    let method = &request.method;
    let signature = method.signature()?;
    if request.stage == ShaderStage::Compute
        && (!signature.parameters.is_empty() || signature.return_type.is_some())
    {
        return Err(Error::invalid_operation(format!(
            "kernel `{}` must take no parameters and return nothing",
            method.full_name()
        )));
    }

    let callee = context.function_id(method);
    let void = context.module.void();
    let function_type = context.module.function_type(void, Vec::new());
    let function = context
        .module
        .builder
        .begin_function(void, None, FunctionControl::NONE, function_type)?;
    context.module.name(function, method.name());
    context.module.builder.begin_block(None)?;
    context.record_call(function, callee);

    let mut wrapper = WrapperBuilder {
        context,
        function,
        stage: request.stage,
        next_input: 0,
        next_output: 0,
        inputs: Vec::new(),
        outputs: Vec::new(),
    };

    let mut arguments = Vec::with_capacity(signature.parameters.len());
    for parameter in &signature.parameters {
        arguments.push(wrapper.read_input(&parameter.name, &parameter.parameter_type)?);
    }

    let return_word = match &signature.return_type {
        Some(ty) => wrapper.context.module.value_type(ty)?,
        None => void,
    };
    let result = wrapper
        .context
        .module
        .builder
        .function_call(return_word, None, callee, arguments)?;
    if let Some(ty) = &signature.return_type {
        wrapper.write_output(ty, result)?;
    }

    wrapper.context.module.builder.ret()?;
    wrapper.context.module.builder.end_function()?;
    Ok(EntryPointWrapper {
        function,
        inputs: wrapper.inputs,
        outputs: wrapper.outputs,
    })
}

fn is_struct(ty: &TypeRef) -> bool {
    representation_of(ty).is_none()
}

fn is_integer(ty: &TypeRef) -> bool {
    matches!(
        representation_of(ty).map(Representation::scalar),
        Some(ScalarKind::UnsignedInteger | ScalarKind::SignedInteger)
    )
}

fn is_float4(ty: &TypeRef) -> bool {
    representation_of(ty)
        == Some(Representation::Vector {
            element: ScalarKind::Float,
            size: 4,
        })
}

impl<'c> WrapperBuilder<'c> {
    /// Value of one parameter, assembled from its Input variables
    fn read_input(&mut self, name: &str, ty: &TypeRef) -> Result<Word> {
        let value_type = self.context.module.value_type(ty)?;
        if !is_struct(ty) {
            let variable = self.located(StorageClass::Input, name, ty)?;
            return Ok(self.context.module.builder.load(value_type, None, variable, None, [])?);
        }

        let mut members = Vec::new();
        for field in ty.fields()?.into_iter().filter(|field| !field.is_static()) {
            let field_name = format!("{}.{}", name, field.name());
            let field_type = self.context.module.value_type(field.field_type())?;
            let position = find::<PositionAttribute>(field.attributes()).is_some();

            let variable = if position && self.stage == ShaderStage::Fragment {
                if !is_float4(field.field_type()) {
                    return Err(unsupported(field.field_type(), "a FragCoord input"));
                }
                self.inputs.push(InterfaceSlot {
                    name: field_name,
                    location: None,
                });
                self.context
                    .builtin_input(BuiltIn::FragCoord, field_type, "FragCoord")
            } else {
                self.located(StorageClass::Input, &field_name, field.field_type())?
            };
            self.context.record_interface(self.function, variable);
            members.push(self.context.module.builder.load(field_type, None, variable, None, [])?);
        }
        Ok(self
            .context
            .module
            .builder
            .composite_construct(value_type, None, members)?)
    }

    /// Stores the returned `value` into Output variables
    fn write_output(&mut self, ty: &TypeRef, value: Word) -> Result<()> {
        if !is_struct(ty) {
            let variable = self.located(StorageClass::Output, "return", ty)?;
            self.context.module.builder.store(variable, value, None, [])?;
            return Ok(());
        }

        let fields: Vec<_> = ty.fields()?.into_iter().filter(|field| !field.is_static()).collect();
        for (member, field) in fields.iter().enumerate() {
            let field_name = format!("return.{}", field.name());
            let field_type = self.context.module.value_type(field.field_type())?;
            let position = find::<PositionAttribute>(field.attributes()).is_some();

            let variable = if position && self.stage == ShaderStage::Vertex {
                if !is_float4(field.field_type()) {
                    return Err(unsupported(field.field_type(), "a Position output"));
                }
                self.outputs.push(InterfaceSlot {
                    name: field_name,
                    location: None,
                });
                self.context
                    .builtin_output(BuiltIn::Position, field_type, "Position")
            } else {
                self.located(StorageClass::Output, &field_name, field.field_type())?
            };
            self.context.record_interface(self.function, variable);

            let component = self
                .context
                .module
                .builder
                .composite_extract(field_type, None, value, [member as u32])?;
            self.context.module.builder.store(variable, component, None, [])?;
        }
        Ok(())
    }

    /// Input or Output variable with the next free `Location`
    fn located(&mut self, class: StorageClass, name: &str, ty: &TypeRef) -> Result<Word> {
        let value_type = self.context.module.value_type(ty)?;
        let pointer = self.context.module.pointer(class, value_type);
        let variable = self.context.module.builder.variable(pointer, None, class, None);

        let (location, slots) = if class == StorageClass::Input {
            let location = self.next_input;
            self.next_input += 1;
            (location, &mut self.inputs)
        } else {
            let location = self.next_output;
            self.next_output += 1;
            (location, &mut self.outputs)
        };
        slots.push(InterfaceSlot {
            name: name.to_string(),
            location: Some(location),
        });

        let builder = &mut self.context.module.builder;
        builder.decorate(variable, Decoration::Location, [Operand::LiteralBit32(location)]);
        if class == StorageClass::Input && self.stage == ShaderStage::Fragment && is_integer(ty) {
            builder.decorate(variable, Decoration::Flat, []);
        }
        self.context.module.name(variable, name);
        self.context.record_interface(self.function, variable);
        Ok(variable)
    }
}
