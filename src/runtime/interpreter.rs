//! CPU execution of IL method bodies
//!
//! Control flow jumps between `Label` instructions found in a prescan; merge
//! declarations only matter to the SPIR-V lowering and are skipped. Static
//! fields other than resources are private to one invocation, the way
//! `Private` variables are on the GPU.

use super::arithmetic;
use super::value::{Resource, Value};
use crate::error::{Error, Result};
use crate::il::{IlContainer, OpCode, NO_RESULT};
use crate::ir::attribute::find;
use crate::ir::representation::{COMPUTE_UTILS, RW_BUFFER, TEXTURE_2D, VERTEX_UTILS};
use crate::ir::{
    identity_key, representation::vector_size_of_definition, representation_of, resource_of, substitute_method,
    substitute_type, KernelAttribute, MethodRef, NeslOperators, SubstitutionMap, TypeRef,
};
use crate::parallel::try_fan_out;
use std::collections::HashMap;
use tracing::{debug, trace};

/// Interpreter options
#[derive(Debug, Clone)]
pub struct InterpreterOptions {
    /// Nested calls allowed before execution traps
    pub max_call_depth: usize,
    /// Upper bound on worker threads for [`Interpreter::dispatch`]
    pub max_parallelism: usize,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self {
            max_call_depth: 256,
            max_parallelism: num_cpus::get(),
        }
    }
}

/// Built-in inputs of one invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Invocation {
    /// `ComputeUtils.GlobalInvocation3`
    pub global: [u32; 3],
    /// `ComputeUtils.LocalInvocation3`
    pub local: [u32; 3],
    /// `ComputeUtils.WorkGroup3`
    pub work_group: [u32; 3],
    /// `VertexUtils.Index`
    pub vertex_index: u32,
}

impl Invocation {
    /// Compute invocation `local` of work group `work_group`
    pub fn compute(work_group: [u32; 3], local: [u32; 3], local_size: [u32; 3]) -> Self {
        let mut global = [0; 3];
        for axis in 0..3 {
            global[axis] = work_group[axis] * local_size[axis] + local[axis];
        }
        Invocation {
            global,
            local,
            work_group,
            vertex_index: 0,
        }
    }

    /// Vertex shader invocation for vertex `index`
    pub fn vertex(index: u32) -> Self {
        Invocation {
            vertex_index: index,
            ..Invocation::default()
        }
    }
}

const IDENTITY: [[f32; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Reference interpreter with host-bound resources.
///
/// # Example
/// ```ignore
/// let mut interpreter = Interpreter::new(InterpreterOptions::default());
/// interpreter.bind_buffer("Shaders.Double.Values", vec![Value::UInt(1), Value::UInt(2)]);
/// interpreter.dispatch(&main, [1, 1, 1])?;
/// assert_eq!(interpreter.read_buffer("Shaders.Double.Values")?, vec![Value::UInt(2), Value::UInt(4)]);
/// ```
pub struct Interpreter {
    options: InterpreterOptions,
    resources: HashMap<String, Resource>,
    object_to_clip: [[f32; 4]; 4],
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(InterpreterOptions::default())
    }
}

impl Interpreter {
    /// Create a new interpreter with options
    pub fn new(options: InterpreterOptions) -> Self {
        Self {
            options,
            resources: HashMap::new(),
            object_to_clip: IDENTITY,
        }
    }

    /// Binds `values` to the `RwBuffer<T>` field named `Namespace.Type.Field`
    pub fn bind_buffer(&mut self, name: &str, values: Vec<Value>) {
        self.resources
            .insert(name.to_string(), Resource::buffer(name, values));
    }

    /// Binds a `width × height` image, rows first, to a `Texture2D<T>` field
    pub fn bind_texture(&mut self, name: &str, width: u32, height: u32, texels: Vec<Value>) -> Result<()> {
        if texels.len() != width as usize * height as usize {
            return Err(Error::ArgumentOutOfRange {
                parameter: "texels",
                message: format!("{} texels for a {}x{} image", texels.len(), width, height),
            });
        }
        self.resources
            .insert(name.to_string(), Resource::texture(name, width, texels));
        Ok(())
    }

    /// Bound resource by name
    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.get(name)
    }

    /// Current contents of a bound buffer or image
    pub fn read_buffer(&self, name: &str) -> Result<Vec<Value>> {
        self.resource(name)
            .map(Resource::snapshot)
            .ok_or_else(|| Error::runtime(format!("resource `{}` is not bound", name)))
    }

    /// Column-major matrix used by `VertexUtils.ObjectToClipPos`
    pub fn set_object_to_clip(&mut self, matrix: [[f32; 4]; 4]) {
        self.object_to_clip = matrix;
    }

    /// Runs `method` once; returns [`Value::Void`] for void methods.
    /// Instance methods take the receiver as the first argument.
    pub fn invoke(&self, method: &MethodRef, arguments: Vec<Value>, invocation: Invocation) -> Result<Value> {
        Execution {
            interpreter: self,
            invocation,
            statics: HashMap::new(),
            depth: 0,
        }
        .call(method, arguments)
    }

    /// Runs a `[Kernel]` method once per invocation of `work_groups`
    /// work groups. Invocations run in parallel and share the bound
    /// resources.
    pub fn dispatch(&self, method: &MethodRef, work_groups: [u32; 3]) -> Result<()> {
        let kernel = find::<KernelAttribute>(&method.attributes()?).ok_or_else(|| {
            Error::invalid_operation(format!("`{}` is not a kernel", method.full_name()))
        })?;
        let local_size = [kernel.x.max(1), kernel.y.max(1), kernel.z.max(1)];

        let mut invocations = Vec::new();
        for gz in 0..work_groups[2] {
            for gy in 0..work_groups[1] {
                for gx in 0..work_groups[0] {
                    for lz in 0..local_size[2] {
                        for ly in 0..local_size[1] {
                            for lx in 0..local_size[0] {
                                invocations.push(Invocation::compute([gx, gy, gz], [lx, ly, lz], local_size));
                            }
                        }
                    }
                }
            }
        }
        debug!(
            kernel = %method.full_name(),
            invocations = invocations.len(),
            "dispatching kernel"
        );

        try_fan_out(&invocations, self.options.max_parallelism, |invocation| {
            self.invoke(method, Vec::new(), *invocation).map(|_| ())
        })?;
        Ok(())
    }
}

/// Variables of one activation
struct Frame {
    values: Vec<Value>,
    types: Vec<Option<TypeRef>>,
}

impl Frame {
    /// Frame for a body with `count` variables: its parameters plus one per
    /// `DefVariable`
    fn with_variables(count: usize) -> Self {
        Frame {
            values: vec![Value::Void; count],
            types: vec![None; count],
        }
    }

    fn define(&mut self, variable: u32, ty: TypeRef, value: Value) -> Result<()> {
        let count = self.values.len();
        match (self.values.get_mut(variable as usize), self.types.get_mut(variable as usize)) {
            (Some(slot), Some(slot_type)) => {
                *slot = value;
                *slot_type = Some(ty);
                Ok(())
            }
            _ => Err(Error::invalid_operation(format!(
                "IL variable %{} outside of the {} variables of the body",
                variable, count
            ))),
        }
    }

    fn undefined(variable: u32) -> Error {
        Error::invalid_operation(format!("IL variable %{} is not defined", variable))
    }

    fn get(&self, variable: u32) -> Result<&Value> {
        self.values
            .get(variable as usize)
            .ok_or_else(|| Self::undefined(variable))
    }

    fn get_mut(&mut self, variable: u32) -> Result<&mut Value> {
        self.values
            .get_mut(variable as usize)
            .ok_or_else(|| Self::undefined(variable))
    }

    fn type_of(&self, variable: u32) -> Result<&TypeRef> {
        self.types
            .get(variable as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| Self::undefined(variable))
    }

    fn set(&mut self, variable: u32, value: Value) -> Result<()> {
        *self.get_mut(variable)? = value;
        Ok(())
    }
}

/// State of one invocation
struct Execution<'i> {
    interpreter: &'i Interpreter,
    invocation: Invocation,
    statics: HashMap<(usize, u32), Value>,
    depth: usize,
}

fn argument(method: &MethodRef, arguments: &[Value], index: usize) -> Result<Value> {
    arguments.get(index).cloned().ok_or_else(|| {
        Error::invalid_operation(format!(
            "`{}` called with {} arguments",
            method.full_name(),
            arguments.len()
        ))
    })
}

fn member(composite: &[Value], index: u32) -> Result<Value> {
    composite
        .get(index as usize)
        .cloned()
        .ok_or_else(|| Error::runtime(format!("component {} out of range", index)))
}

fn uint3(values: [u32; 3]) -> Value {
    Value::Composite(values.iter().copied().map(Value::UInt).collect())
}

impl<'i> Execution<'i> {
    fn call(&mut self, method: &MethodRef, arguments: Vec<Value>) -> Result<Value> {
        let container = match method.il()? {
            Some(container) => container,
            None => return self.intrinsic(method, arguments),
        };
        if self.depth >= self.interpreter.options.max_call_depth {
            return Err(Error::runtime(format!(
                "call depth {} exceeded in `{}`",
                self.interpreter.options.max_call_depth,
                method.full_name()
            )));
        }

        trace!(method = %method.full_name(), depth = self.depth, "call");
        self.depth += 1;
        let result = self.run(method, &container, arguments);
        self.depth -= 1;
        result
    }

    fn run(&mut self, method: &MethodRef, container: &IlContainer, arguments: Vec<Value>) -> Result<Value> {
        let assembly = container.assembly()?;
        let substitution: SubstitutionMap = method.substitution();
        let parameter_types = method.il_parameter_types()?;
        if parameter_types.len() != arguments.len() {
            return Err(Error::invalid_operation(format!(
                "`{}` takes {} arguments, {} given",
                method.full_name(),
                parameter_types.len(),
                arguments.len()
            )));
        }

        let locals = container
            .instruction_pairs()
            .iter()
            .filter(|(opcode, _)| *opcode == OpCode::DefVariable)
            .count();
        let mut frame = Frame::with_variables(parameter_types.len() + locals);
        for (index, (ty, value)) in parameter_types.into_iter().zip(arguments).enumerate() {
            frame.define(index as u32, ty, value)?;
        }
        let mut labels = HashMap::new();
        for (index, mut instruction) in container.instructions().enumerate() {
            match instruction.opcode() {
                OpCode::DefVariable => {
                    let variable = instruction.read_u32()?;
                    let ty = substitute_type(&container.get_type_by_id(instruction.read_u64()?)?, &substitution)?;
                    let zero = Value::zero(&ty)?;
                    frame.define(variable, ty, zero)?;
                }
                OpCode::Label => {
                    labels.insert(instruction.read_u32()?, index);
                }
                _ => {}
            }
        }
        let target = |label: u32| {
            labels
                .get(&label)
                .copied()
                .ok_or_else(|| Error::invalid_operation(format!("label L{} is not defined", label)))
        };

        let mut pc = 0;
        while let Some(mut instruction) = container.instruction(pc) {
            pc += 1;
            let opcode = instruction.opcode();
            match opcode {
                OpCode::Nop
                | OpCode::DefVariable
                | OpCode::Label
                | OpCode::SelectionMerge
                | OpCode::LoopMerge => {}
                OpCode::Load => {
                    let dst = instruction.read_u32()?;
                    let value = frame.get(instruction.read_u32()?)?.clone();
                    frame.set(dst, value)?;
                }
                OpCode::LoadUInt32 => {
                    let dst = instruction.read_u32()?;
                    frame.set(dst, Value::UInt(instruction.read_u32()?))?;
                }
                OpCode::LoadInt32 => {
                    let dst = instruction.read_u32()?;
                    frame.set(dst, Value::Int(instruction.read_u32()? as i32))?;
                }
                OpCode::LoadFloat32 => {
                    let dst = instruction.read_u32()?;
                    frame.set(dst, Value::Float(instruction.read_f32()?))?;
                }
                OpCode::LoadBool => {
                    let dst = instruction.read_u32()?;
                    frame.set(dst, Value::Bool(instruction.read_u8()? != 0))?;
                }
                OpCode::LoadField => {
                    let dst = instruction.read_u32()?;
                    let object = instruction.read_u32()?;
                    let (index, _) = frame.type_of(object)?.instance_member(instruction.read_u32()?)?;
                    let value = member(frame.get(object)?.as_composite()?, index)?;
                    frame.set(dst, value)?;
                }
                OpCode::SetField => {
                    let object = instruction.read_u32()?;
                    let (index, _) = frame.type_of(object)?.instance_member(instruction.read_u32()?)?;
                    let value = frame.get(instruction.read_u32()?)?.clone();
                    let members = frame.get_mut(object)?.as_composite_mut()?;
                    match members.get_mut(index as usize) {
                        Some(slot) => *slot = value,
                        None => return Err(Error::runtime(format!("component {} out of range", index))),
                    }
                }
                OpCode::LoadStaticField => {
                    let dst = instruction.read_u32()?;
                    let owner = substitute_type(&container.get_type_by_id(instruction.read_u64()?)?, &substitution)?;
                    let value = self.load_static(&owner, instruction.read_u32()?)?;
                    frame.set(dst, value)?;
                }
                OpCode::SetStaticField => {
                    let owner = substitute_type(&container.get_type_by_id(instruction.read_u64()?)?, &substitution)?;
                    let field = instruction.read_u32()?;
                    let value = frame.get(instruction.read_u32()?)?.clone();
                    self.store_static(&owner, field, value)?;
                }
                OpCode::LoadElement => {
                    let dst = instruction.read_u32()?;
                    let object = instruction.read_u32()?;
                    let index = frame.get(instruction.read_u32()?)?.as_uint()?;
                    let value = member(frame.get(object)?.as_composite()?, index)?;
                    frame.set(dst, value)?;
                }
                OpCode::SetElement => {
                    let object = instruction.read_u32()?;
                    let index = frame.get(instruction.read_u32()?)?.as_uint()?;
                    let value = frame.get(instruction.read_u32()?)?.clone();
                    let members = frame.get_mut(object)?.as_composite_mut()?;
                    match members.get_mut(index as usize) {
                        Some(slot) => *slot = value,
                        None => return Err(Error::runtime(format!("component {} out of range", index))),
                    }
                }
                OpCode::Add
                | OpCode::Subtract
                | OpCode::Multiply
                | OpCode::Divide
                | OpCode::Modulo
                | OpCode::Remainder
                | OpCode::Equal
                | OpCode::NotEqual
                | OpCode::Less
                | OpCode::LessOrEqual
                | OpCode::Greater
                | OpCode::GreaterOrEqual
                | OpCode::And
                | OpCode::Or => {
                    let dst = instruction.read_u32()?;
                    let left = frame.get(instruction.read_u32()?)?;
                    let right = frame.get(instruction.read_u32()?)?;
                    let value = arithmetic::binary(opcode, left, right)?;
                    frame.set(dst, value)?;
                }
                OpCode::Negate | OpCode::Not => {
                    let dst = instruction.read_u32()?;
                    let value = arithmetic::unary(opcode, frame.get(instruction.read_u32()?)?)?;
                    frame.set(dst, value)?;
                }
                OpCode::Call => {
                    let dst = instruction.read_u32()?;
                    let target = assembly.get_method_by_id(instruction.read_u64()?)?;
                    let target = substitute_method(&target, &substitution)?;
                    let mut values = Vec::new();
                    for variable in instruction.read_variables()? {
                        values.push(frame.get(variable)?.clone());
                    }
                    let result = self.call(&target, values)?;
                    if dst != NO_RESULT {
                        frame.set(dst, result)?;
                    }
                }
                OpCode::Return => return Ok(Value::Void),
                OpCode::ReturnValue => return Ok(frame.get(instruction.read_u32()?)?.clone()),
                OpCode::Jump => pc = target(instruction.read_u32()?)?,
                OpCode::JumpIf => {
                    let condition = frame.get(instruction.read_u32()?)?.as_bool()?;
                    let on_true = instruction.read_u32()?;
                    let on_false = instruction.read_u32()?;
                    pc = target(if condition { on_true } else { on_false })?;
                }
            }
        }
        Ok(Value::Void)
    }

    fn load_static(&mut self, owner: &TypeRef, index: u32) -> Result<Value> {
        let fields = owner.fields()?;
        let field = fields
            .get(index as usize)
            .ok_or_else(|| Error::invalid_operation(format!("`{}` has no field #{}", owner, index)))?;
        let ty = field.field_type();

        if resource_of(ty).is_some() {
            let name = format!("{}.{}", owner.full_name(), field.name());
            return self
                .interpreter
                .resource(&name)
                .cloned()
                .map(Value::Resource)
                .ok_or_else(|| Error::runtime(format!("resource `{}` is not bound", name)));
        }

        let key = (identity_key(owner), index);
        if let Some(value) = self.statics.get(&key) {
            return Ok(value.clone());
        }
        let value = match field.default_data().and_then(|bytes| Value::from_default_data(ty, bytes)) {
            Some(value) => value,
            None => Value::zero(ty)?,
        };
        self.statics.insert(key, value.clone());
        Ok(value)
    }

    fn store_static(&mut self, owner: &TypeRef, index: u32, value: Value) -> Result<()> {
        let fields = owner.fields()?;
        let field = fields
            .get(index as usize)
            .ok_or_else(|| Error::invalid_operation(format!("`{}` has no field #{}", owner, index)))?;
        if resource_of(field.field_type()).is_some() {
            return Err(Error::invalid_operation(format!(
                "resource `{}.{}` cannot be assigned",
                owner.full_name(),
                field.name()
            )));
        }
        self.statics.insert((identity_key(owner), index), value);
        Ok(())
    }

    /// Built-in behavior of methods without an IL body
    fn intrinsic(&mut self, method: &MethodRef, arguments: Vec<Value>) -> Result<Value> {
        let owner = method.owner()?;
        let definition = owner.generic_definition().cloned().unwrap_or_else(|| owner.clone());
        let arg = |index| argument(method, &arguments, index);
        trace!(method = %method.full_name(), "intrinsic");

        let value = match (definition.full_name(), method.name()) {
            (COMPUTE_UTILS, "'pGGlobalInvocation3") => uint3(self.invocation.global),
            (COMPUTE_UTILS, "'pGLocalInvocation3") => uint3(self.invocation.local),
            (COMPUTE_UTILS, "'pGWorkGroup3") => uint3(self.invocation.work_group),
            (VERTEX_UTILS, "'pGIndex") => Value::UInt(self.invocation.vertex_index),
            (VERTEX_UTILS, "ObjectToClipPos") => self.object_to_clip_pos(&arg(0)?)?,
            (RW_BUFFER | TEXTURE_2D, NeslOperators::INDEXER_GET) => arg(0)?.as_resource()?.get(&arg(1)?)?,
            (RW_BUFFER | TEXTURE_2D, NeslOperators::INDEXER_SET) => {
                arg(0)?.as_resource()?.set(&arg(1)?, arg(2)?)?;
                Value::Void
            }
            (RW_BUFFER, "'pGLength") => Value::UInt(arg(0)?.as_resource()?.len() as u32),
            (name, NeslOperators::CONSTRUCTOR) if vector_size_of_definition(name).is_some() => {
                Value::Composite(arguments.clone())
            }
            (_, "Power") if representation_of(&owner).is_some() => arithmetic::power(&arg(0)?, &arg(1)?)?,
            (_, name) if representation_of(&owner).is_some() => match OpCode::from_operator_method(name) {
                Some(OpCode::Negate) => arithmetic::unary(OpCode::Negate, &arg(0)?)?,
                Some(opcode) => arithmetic::binary(opcode, &arg(0)?, &arg(1)?)?,
                None => return Err(missing_definition(method)),
            },
            _ => return Err(missing_definition(method)),
        };
        Ok(value)
    }

    fn object_to_clip_pos(&self, position: &Value) -> Result<Value> {
        let components = position.as_composite()?;
        if components.len() != 3 {
            return Err(Error::runtime(format!(
                "expected a 3-component position, got {}",
                components.len()
            )));
        }
        let mut homogeneous = [1.0f32; 4];
        for (slot, component) in homogeneous.iter_mut().zip(components) {
            *slot = component.as_float()?;
        }

        let matrix = &self.interpreter.object_to_clip;
        let mut clip = Vec::with_capacity(4);
        for row in 0..4 {
            let sum: f32 = (0..4).map(|column| matrix[column][row] * homogeneous[column]).sum();
            clip.push(Value::Float(sum));
        }
        Ok(Value::Composite(clip))
    }
}

fn missing_definition(method: &MethodRef) -> Error {
    Error::invalid_operation(format!("unable to find definition of `{}`", method.full_name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::NeslCompiler;
    use crate::ir::NeslAssembly;
    use crate::parser::SourceFile;
    use std::sync::Arc;

    fn compile(source: &str) -> Arc<NeslAssembly> {
        NeslCompiler::default()
            .compile("Test", "test.nesl", &[SourceFile::new("Test.nesl", source)], &[])
            .unwrap()
    }

    fn method(assembly: &NeslAssembly, ty: &str, name: &str) -> MethodRef {
        assembly.get_type(ty).unwrap().get_methods(name).unwrap()[0].clone()
    }

    #[test]
    fn test_out_of_range_variable_is_rejected() {
        let assembly = compile("public static class Empty { public static void Noop() { } }");
        let noop = method(&assembly, "Empty", "Noop");
        let uint = assembly.get_type("System.UInt32").unwrap();

        let mut generator = crate::il::IlGenerator::new(&assembly, 0);
        generator
            .emit(
                OpCode::DefVariable,
                &[
                    crate::il::Operand::Variable(4_000_000_000),
                    crate::il::Operand::Type(assembly.get_local_type_id(&uint)),
                ],
            )
            .unwrap();
        generator.ret().unwrap();
        noop.set_il(Arc::new(generator.build())).unwrap();

        let error = Interpreter::default()
            .invoke(&noop, Vec::new(), Invocation::compute([0; 3], [0; 3], [1, 1, 1]))
            .unwrap_err();
        assert!(error.to_string().contains("%4000000000 outside of the 1 variables"));
    }

    #[test]
    fn test_invocation_ids() {
        let invocation = Invocation::compute([2, 0, 0], [3, 1, 0], [4, 2, 1]);
        assert_eq!(invocation.global, [11, 1, 0]);
    }

    #[test]
    fn test_while_loop() {
        let assembly = compile(
            "public static class Math {\n\
                public static uint Sum(uint count) {\n\
                    uint total = 0;\n\
                    uint i = 1;\n\
                    while (i <= count) { total += i; i += 1; }\n\
                    return total;\n\
                }\n\
            }",
        );
        let sum = method(&assembly, "Math", "Sum");
        let result = Interpreter::default()
            .invoke(&sum, vec![Value::UInt(10)], Invocation::default())
            .unwrap();
        assert_eq!(result, Value::UInt(55));
    }

    #[test]
    fn test_if_else() {
        let assembly = compile(
            "public static class Math {\n\
                public static int Sign(int value) {\n\
                    if (value < 0) { return -1; } else if (value > 0) { return 1; }\n\
                    return 0;\n\
                }\n\
            }",
        );
        let sign = method(&assembly, "Math", "Sign");
        let interpreter = Interpreter::default();
        for (input, expected) in [(-5, -1), (0, 0), (9, 1)] {
            let result = interpreter
                .invoke(&sign, vec![Value::Int(input)], Invocation::default())
                .unwrap();
            assert_eq!(result, Value::Int(expected));
        }
    }

    #[test]
    fn test_runaway_recursion_traps() {
        let assembly = compile(
            "public static class Loop {\n\
                public static uint Forever(uint value) { return Forever(value); }\n\
            }",
        );
        let forever = method(&assembly, "Loop", "Forever");
        let options = InterpreterOptions {
            max_call_depth: 16,
            ..InterpreterOptions::default()
        };
        let error = Interpreter::new(options)
            .invoke(&forever, vec![Value::UInt(0)], Invocation::default())
            .unwrap_err();
        assert!(error.to_string().contains("call depth"));
    }

    #[test]
    fn test_unbound_buffer_is_reported() {
        let assembly = compile(
            "public static class Fill {\n\
                public static RwBuffer<uint> Data;\n\
                [Kernel(1, 1, 1)] public static void Main() { Data[0] = 1; }\n\
            }",
        );
        let main = method(&assembly, "Fill", "Main");
        let error = Interpreter::default().dispatch(&main, [1, 1, 1]).unwrap_err();
        assert!(error.to_string().contains("is not bound"));
    }

    #[test]
    fn test_bind_texture_checks_size() {
        let mut interpreter = Interpreter::default();
        assert!(interpreter
            .bind_texture("Test.Image", 2, 2, vec![Value::Float(0.0); 3])
            .is_err());
    }
}
