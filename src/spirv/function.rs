//! Lowering of one method body
//!
//! Every IL variable becomes a `Function` variable declared at the top of
//! the entry block, so values flow through loads and stores and no phi
//! nodes are needed. Resource-typed variables are aliases of module-level
//! descriptor variables instead.

use super::context::{CompilationContext, ResourceVariable};
use super::intrinsics::{IntrinsicCall, INTRINSICS};
use super::types::unsupported;
use crate::error::{Error, Result};
use crate::il::{IlContainer, OpCode, NO_RESULT};
use crate::ir::{
    representation_of, resource_of, substitute_method, substitute_type, MethodRef, NeslAssembly,
    Representation, ScalarKind, SubstitutionMap, TypeRef,
};
use rspirv::dr::Operand;
use rspirv::spirv::{FunctionControl, GLOp, LoopControl, SelectionControl, StorageClass, Word};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

enum Slot {
    Value { pointer: Word, ty: TypeRef },
    Resource { ty: TypeRef, bound: Option<ResourceVariable> },
}

/// State of the function being lowered
pub(crate) struct FunctionLowering<'c> {
    pub context: &'c mut CompilationContext,
    function: Word,
    assembly: Arc<NeslAssembly>,
    substitution: SubstitutionMap,
    slots: HashMap<u32, Slot>,
    labels: HashMap<u32, Word>,
    terminated: bool,
}

/// Lowers `method` into the function `id`
pub(crate) fn lower_function(context: &mut CompilationContext, method: &MethodRef, id: Word) -> Result<()> {
    let container = method
        .il()?
        .ok_or_else(|| Error::invalid_operation(format!("`{}` has no body", method.full_name())))?;
    debug!(method = %method.full_name(), instructions = container.len(), "lowering function");

    let parameter_types = method.il_parameter_types()?;
    let mut parameter_words = Vec::with_capacity(parameter_types.len());
    for ty in &parameter_types {
        if resource_of(ty).is_some() {
            return Err(unsupported(ty, "function parameters"));
        }
        parameter_words.push(context.module.value_type(ty)?);
    }
    let return_word = match method.return_type()? {
        Some(ty) => context.module.value_type(&ty)?,
        None => context.module.void(),
    };
    let function_type = context.module.function_type(return_word, parameter_words.clone());

    context
        .module
        .builder
        .begin_function(return_word, Some(id), FunctionControl::NONE, function_type)?;
    context.module.name(id, &method.full_name());
    let mut parameters = Vec::with_capacity(parameter_words.len());
    for word in &parameter_words {
        parameters.push(context.module.builder.function_parameter(*word)?);
    }
    context.module.builder.begin_block(None)?;

    let mut lowering = FunctionLowering {
        function: id,
        assembly: container.assembly()?,
        substitution: method.substitution(),
        slots: HashMap::new(),
        labels: HashMap::new(),
        terminated: false,
        context,
    };
    lowering.declare_variables(&container, &parameter_types)?;
    for (index, value) in parameters.into_iter().enumerate() {
        lowering.store(index as u32, value)?;
    }
    lowering.lower_body(&container)?;

    if !lowering.terminated {
        if method.return_type()?.is_some() {
            lowering.context.module.builder.unreachable()?;
        } else {
            lowering.context.module.builder.ret()?;
        }
    }
    lowering.context.module.builder.end_function()?;
    Ok(())
}

impl<'c> FunctionLowering<'c> {
    fn declare_variables(&mut self, container: &IlContainer, parameter_types: &[TypeRef]) -> Result<()> {
        for (index, ty) in parameter_types.iter().enumerate() {
            self.declare(index as u32, ty.clone())?;
        }
        for mut instruction in container.instructions() {
            if instruction.opcode() != OpCode::DefVariable {
                continue;
            }
            let variable = instruction.read_u32()?;
            let ty = container.get_type_by_id(instruction.read_u64()?)?;
            let ty = substitute_type(&ty, &self.substitution)?;
            self.declare(variable, ty)?;
        }
        Ok(())
    }

    fn declare(&mut self, variable: u32, ty: TypeRef) -> Result<()> {
        let slot = if resource_of(&ty).is_some() {
            Slot::Resource { ty, bound: None }
        } else {
            let value_type = self.context.module.value_type(&ty)?;
            let pointer_type = self.context.module.pointer(StorageClass::Function, value_type);
            let pointer = self
                .context
                .module
                .builder
                .variable(pointer_type, None, StorageClass::Function, None);
            Slot::Value { pointer, ty }
        };
        self.slots.insert(variable, slot);
        Ok(())
    }

    fn lower_body(&mut self, container: &IlContainer) -> Result<()> {
        for mut instruction in container.instructions() {
            let opcode = instruction.opcode();
            match opcode {
                OpCode::Nop | OpCode::DefVariable => continue,
                OpCode::Label => {
                    let label = self.label(instruction.read_u32()?);
                    if !self.terminated {
                        self.context.module.builder.branch(label)?;
                    }
                    self.context.module.builder.begin_block(Some(label))?;
                    self.terminated = false;
                    continue;
                }
                _ => {}
            }

            // code after a terminator lives in an unreachable block
            if self.terminated {
                self.context.module.builder.begin_block(None)?;
                self.terminated = false;
            }

            match opcode {
                OpCode::Load => {
                    let dst = instruction.read_u32()?;
                    let src = instruction.read_u32()?;
                    self.copy(dst, src)?;
                }
                OpCode::LoadUInt32 | OpCode::LoadInt32 => {
                    let dst = instruction.read_u32()?;
                    let bits = instruction.read_u32()?;
                    let ty = self.value_type_of(dst)?;
                    let constant = self.context.module.constant_bits(ty, bits);
                    self.store(dst, constant)?;
                }
                OpCode::LoadFloat32 => {
                    let dst = instruction.read_u32()?;
                    let value = instruction.read_f32()?;
                    let ty = self.value_type_of(dst)?;
                    let constant = self.context.module.constant_bits(ty, value.to_bits());
                    self.store(dst, constant)?;
                }
                OpCode::LoadBool => {
                    let dst = instruction.read_u32()?;
                    let value = instruction.read_u8()? != 0;
                    let constant = self.context.module.constant_bool(value);
                    self.store(dst, constant)?;
                }
                OpCode::LoadField => {
                    let dst = instruction.read_u32()?;
                    let object = instruction.read_u32()?;
                    let field = instruction.read_u32()?;
                    let pointer = self.field_pointer(object, field)?;
                    let ty = self.value_type_of(dst)?;
                    let value = self.context.module.builder.load(ty, None, pointer, None, [])?;
                    self.store(dst, value)?;
                }
                OpCode::SetField => {
                    let object = instruction.read_u32()?;
                    let field = instruction.read_u32()?;
                    let src = instruction.read_u32()?;
                    let pointer = self.field_pointer(object, field)?;
                    let value = self.load(src)?;
                    self.context.module.builder.store(pointer, value, None, [])?;
                }
                OpCode::LoadStaticField => {
                    let dst = instruction.read_u32()?;
                    let owner = self.type_operand(instruction.read_u64()?)?;
                    let field = instruction.read_u32()?;
                    self.load_static_field(dst, &owner, field)?;
                }
                OpCode::SetStaticField => {
                    let owner = self.type_operand(instruction.read_u64()?)?;
                    let field = instruction.read_u32()?;
                    let src = instruction.read_u32()?;
                    let (ty, variable) = self.static_variable(&owner, field)?;
                    if resource_of(&ty).is_some() {
                        return Err(Error::invalid_operation(format!(
                            "resource field #{} of `{}` cannot be assigned",
                            field, owner
                        )));
                    }
                    let value = self.load(src)?;
                    self.context.module.builder.store(variable, value, None, [])?;
                }
                OpCode::LoadElement => {
                    let dst = instruction.read_u32()?;
                    let object = instruction.read_u32()?;
                    let index = instruction.read_u32()?;
                    let pointer = self.element_pointer(object, index)?;
                    let ty = self.value_type_of(dst)?;
                    let value = self.context.module.builder.load(ty, None, pointer, None, [])?;
                    self.store(dst, value)?;
                }
                OpCode::SetElement => {
                    let object = instruction.read_u32()?;
                    let index = instruction.read_u32()?;
                    let src = instruction.read_u32()?;
                    let pointer = self.element_pointer(object, index)?;
                    let value = self.load(src)?;
                    self.context.module.builder.store(pointer, value, None, [])?;
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
                    let left = instruction.read_u32()?;
                    let right = instruction.read_u32()?;
                    let operand_type = self.variable_type(left)?;
                    let result_type = self.value_type_of(dst)?;
                    let left = self.load(left)?;
                    let right = self.load(right)?;
                    let value = self.binary_operation(opcode, &operand_type, result_type, left, right)?;
                    self.store(dst, value)?;
                }
                OpCode::Negate | OpCode::Not => {
                    let dst = instruction.read_u32()?;
                    let src = instruction.read_u32()?;
                    let operand_type = self.variable_type(src)?;
                    let result_type = self.value_type_of(dst)?;
                    let operand = self.load(src)?;
                    let value = self.unary_operation(opcode, &operand_type, result_type, operand)?;
                    self.store(dst, value)?;
                }
                OpCode::Call => {
                    let dst = instruction.read_u32()?;
                    let method = self.assembly.get_method_by_id(instruction.read_u64()?)?;
                    let arguments = instruction.read_variables()?;
                    let method = substitute_method(&method, &self.substitution)?;
                    self.call(dst, &method, &arguments)?;
                }
                OpCode::Return => {
                    self.context.module.builder.ret()?;
                }
                OpCode::ReturnValue => {
                    let value = self.load(instruction.read_u32()?)?;
                    self.context.module.builder.ret_value(value)?;
                }
                OpCode::Jump => {
                    let label = self.label(instruction.read_u32()?);
                    self.context.module.builder.branch(label)?;
                }
                OpCode::JumpIf => {
                    let condition = self.load(instruction.read_u32()?)?;
                    let on_true = self.label(instruction.read_u32()?);
                    let on_false = self.label(instruction.read_u32()?);
                    self.context
                        .module
                        .builder
                        .branch_conditional(condition, on_true, on_false, [])?;
                }
                OpCode::SelectionMerge => {
                    let merge = self.label(instruction.read_u32()?);
                    self.context
                        .module
                        .builder
                        .selection_merge(merge, SelectionControl::NONE)?;
                }
                OpCode::LoopMerge => {
                    let merge = self.label(instruction.read_u32()?);
                    let continue_target = self.label(instruction.read_u32()?);
                    self.context
                        .module
                        .builder
                        .loop_merge(merge, continue_target, LoopControl::NONE, [])?;
                }
                OpCode::Nop | OpCode::DefVariable | OpCode::Label => {}
            }
            self.terminated = opcode.is_terminator();
        }
        Ok(())
    }

    fn label(&mut self, label: u32) -> Word {
        if let Some(id) = self.labels.get(&label) {
            return *id;
        }
        let id = self.context.module.builder.id();
        self.labels.insert(label, id);
        id
    }

    fn type_operand(&self, id: u64) -> Result<TypeRef> {
        substitute_type(&self.assembly.get_type_by_id(id)?, &self.substitution)
    }

    fn slot(&self, variable: u32) -> Result<&Slot> {
        self.slots
            .get(&variable)
            .ok_or_else(|| Error::invalid_operation(format!("IL variable %{} is not defined", variable)))
    }

    fn pointer(&self, variable: u32) -> Result<Word> {
        match self.slot(variable)? {
            Slot::Value { pointer, .. } => Ok(*pointer),
            Slot::Resource { ty, .. } => Err(unsupported(ty, "value operations")),
        }
    }

    /// NESL type of an IL variable
    pub fn variable_type(&self, variable: u32) -> Result<TypeRef> {
        Ok(match self.slot(variable)? {
            Slot::Value { ty, .. } | Slot::Resource { ty, .. } => ty.clone(),
        })
    }

    fn value_type_of(&mut self, variable: u32) -> Result<Word> {
        let ty = self.variable_type(variable)?;
        self.context.module.value_type(&ty)
    }

    /// Current value of an IL variable
    pub fn load(&mut self, variable: u32) -> Result<Word> {
        let pointer = self.pointer(variable)?;
        let ty = self.value_type_of(variable)?;
        Ok(self.context.module.builder.load(ty, None, pointer, None, [])?)
    }

    /// Current values of several IL variables
    pub fn load_all(&mut self, variables: &[u32]) -> Result<Vec<Word>> {
        variables.iter().map(|variable| self.load(*variable)).collect()
    }

    /// Overwrites an IL variable
    pub fn store(&mut self, variable: u32, value: Word) -> Result<()> {
        let pointer = self.pointer(variable)?;
        self.context.module.builder.store(pointer, value, None, [])?;
        Ok(())
    }

    /// Descriptor variable an IL variable aliases
    pub fn resource(&self, variable: u32) -> Result<ResourceVariable> {
        match self.slot(variable)? {
            Slot::Resource { bound: Some(resource), .. } => Ok(resource.clone()),
            Slot::Resource { ty, bound: None } => Err(Error::invalid_operation(format!(
                "resource %{} of type `{}` is used before it is bound",
                variable, ty
            ))),
            Slot::Value { ty, .. } => Err(Error::invalid_operation(format!(
                "%{} of type `{}` is not a resource",
                variable, ty
            ))),
        }
    }

    /// Records that the function reads or writes an Input/Output variable
    pub fn use_interface(&mut self, variable: Word) {
        self.context.record_interface(self.function, variable);
    }

    fn copy(&mut self, dst: u32, src: u32) -> Result<()> {
        if let Slot::Resource { bound, .. } = self.slot(src)? {
            let bound = bound.clone();
            return match self.slots.get_mut(&dst) {
                Some(Slot::Resource { bound: target, .. }) => {
                    *target = bound;
                    Ok(())
                }
                _ => Err(Error::invalid_operation(format!(
                    "resource %{} copied into non-resource %{}",
                    src, dst
                ))),
            };
        }
        let value = self.load(src)?;
        self.store(dst, value)
    }

    fn field_pointer(&mut self, object: u32, field: u32) -> Result<Word> {
        let base = self.pointer(object)?;
        let (member, field_type) = self.variable_type(object)?.instance_member(field)?;
        let value_type = self.context.module.value_type(&field_type)?;
        let pointer_type = self.context.module.pointer(StorageClass::Function, value_type);
        let index = self.context.module.constant_uint(member);
        Ok(self
            .context
            .module
            .builder
            .access_chain(pointer_type, None, base, [index])?)
    }

    fn element_pointer(&mut self, object: u32, index: u32) -> Result<Word> {
        let base = self.pointer(object)?;
        let ty = self.variable_type(object)?;
        let element = match representation_of(&ty) {
            Some(Representation::Vector { element, .. }) => element,
            _ => return Err(unsupported(&ty, "element access")),
        };
        let value_type = self.context.module.scalar(element);
        let pointer_type = self.context.module.pointer(StorageClass::Function, value_type);
        let index = self.load(index)?;
        Ok(self
            .context
            .module
            .builder
            .access_chain(pointer_type, None, base, [index])?)
    }

    fn static_variable(&mut self, owner: &TypeRef, field: u32) -> Result<(TypeRef, Word)> {
        let fields = owner.fields()?;
        let ty = fields
            .get(field as usize)
            .map(|field| field.field_type().clone())
            .ok_or_else(|| Error::invalid_operation(format!("`{}` has no field #{}", owner, field)))?;
        if resource_of(&ty).is_some() {
            let resource = self.context.resource(owner, field)?;
            return Ok((ty, resource.variable));
        }
        self.context.static_field(owner, field)
    }

    fn load_static_field(&mut self, dst: u32, owner: &TypeRef, field: u32) -> Result<()> {
        let (ty, variable) = self.static_variable(owner, field)?;
        if resource_of(&ty).is_some() {
            let resource = self.context.resource(owner, field)?;
            return match self.slots.get_mut(&dst) {
                Some(Slot::Resource { bound, .. }) => {
                    *bound = Some(resource);
                    Ok(())
                }
                _ => Err(Error::invalid_operation(format!(
                    "resource `{}` loaded into non-resource %{}",
                    ty, dst
                ))),
            };
        }
        let value_type = self.context.module.value_type(&ty)?;
        let value = self
            .context
            .module
            .builder
            .load(value_type, None, variable, None, [])?;
        self.store(dst, value)
    }

    /// Emits a binary opcode, choosing the unsigned, signed or float form
    /// from the scalar kind of `operand_type`
    pub fn binary_operation(
        &mut self,
        opcode: OpCode,
        operand_type: &TypeRef,
        result_type: Word,
        left: Word,
        right: Word,
    ) -> Result<Word> {
        use ScalarKind::{Boolean, Float, SignedInteger as Signed, UnsignedInteger as Unsigned};

        let kind = representation_of(operand_type)
            .map(Representation::scalar)
            .ok_or_else(|| unsupported(operand_type, &format!("{:?}", opcode)))?;
        let builder = &mut self.context.module.builder;
        let value = match (opcode, kind) {
            (OpCode::Add, Unsigned | Signed) => builder.i_add(result_type, None, left, right)?,
            (OpCode::Add, Float) => builder.f_add(result_type, None, left, right)?,
            (OpCode::Subtract, Unsigned | Signed) => builder.i_sub(result_type, None, left, right)?,
            (OpCode::Subtract, Float) => builder.f_sub(result_type, None, left, right)?,
            (OpCode::Multiply, Unsigned | Signed) => builder.i_mul(result_type, None, left, right)?,
            (OpCode::Multiply, Float) => builder.f_mul(result_type, None, left, right)?,
            (OpCode::Divide, Unsigned) => builder.u_div(result_type, None, left, right)?,
            (OpCode::Divide, Signed) => builder.s_div(result_type, None, left, right)?,
            (OpCode::Divide, Float) => builder.f_div(result_type, None, left, right)?,
            (OpCode::Modulo, Unsigned) => builder.u_mod(result_type, None, left, right)?,
            (OpCode::Modulo, Signed) => builder.s_mod(result_type, None, left, right)?,
            (OpCode::Modulo, Float) => builder.f_mod(result_type, None, left, right)?,
            (OpCode::Remainder, Unsigned) => builder.u_mod(result_type, None, left, right)?,
            (OpCode::Remainder, Signed) => builder.s_rem(result_type, None, left, right)?,
            (OpCode::Remainder, Float) => builder.f_rem(result_type, None, left, right)?,
            (OpCode::Equal, Boolean) => builder.logical_equal(result_type, None, left, right)?,
            (OpCode::Equal, Unsigned | Signed) => builder.i_equal(result_type, None, left, right)?,
            (OpCode::Equal, Float) => builder.f_ord_equal(result_type, None, left, right)?,
            (OpCode::NotEqual, Boolean) => builder.logical_not_equal(result_type, None, left, right)?,
            (OpCode::NotEqual, Unsigned | Signed) => builder.i_not_equal(result_type, None, left, right)?,
            (OpCode::NotEqual, Float) => builder.f_ord_not_equal(result_type, None, left, right)?,
            (OpCode::Less, Unsigned) => builder.u_less_than(result_type, None, left, right)?,
            (OpCode::Less, Signed) => builder.s_less_than(result_type, None, left, right)?,
            (OpCode::Less, Float) => builder.f_ord_less_than(result_type, None, left, right)?,
            (OpCode::LessOrEqual, Unsigned) => builder.u_less_than_equal(result_type, None, left, right)?,
            (OpCode::LessOrEqual, Signed) => builder.s_less_than_equal(result_type, None, left, right)?,
            (OpCode::LessOrEqual, Float) => builder.f_ord_less_than_equal(result_type, None, left, right)?,
            (OpCode::Greater, Unsigned) => builder.u_greater_than(result_type, None, left, right)?,
            (OpCode::Greater, Signed) => builder.s_greater_than(result_type, None, left, right)?,
            (OpCode::Greater, Float) => builder.f_ord_greater_than(result_type, None, left, right)?,
            (OpCode::GreaterOrEqual, Unsigned) => {
                builder.u_greater_than_equal(result_type, None, left, right)?
            }
            (OpCode::GreaterOrEqual, Signed) => builder.s_greater_than_equal(result_type, None, left, right)?,
            (OpCode::GreaterOrEqual, Float) => {
                builder.f_ord_greater_than_equal(result_type, None, left, right)?
            }
            (OpCode::And, Boolean) => builder.logical_and(result_type, None, left, right)?,
            (OpCode::Or, Boolean) => builder.logical_or(result_type, None, left, right)?,
            _ => return Err(unsupported(operand_type, &format!("{:?}", opcode))),
        };
        Ok(value)
    }

    /// `Negate` or `Not`
    pub fn unary_operation(
        &mut self,
        opcode: OpCode,
        operand_type: &TypeRef,
        result_type: Word,
        operand: Word,
    ) -> Result<Word> {
        let kind = representation_of(operand_type)
            .map(Representation::scalar)
            .ok_or_else(|| unsupported(operand_type, &format!("{:?}", opcode)))?;
        let builder = &mut self.context.module.builder;
        let value = match (opcode, kind) {
            (OpCode::Negate, ScalarKind::SignedInteger) => builder.s_negate(result_type, None, operand)?,
            (OpCode::Negate, ScalarKind::Float) => builder.f_negate(result_type, None, operand)?,
            (OpCode::Not, ScalarKind::Boolean) => builder.logical_not(result_type, None, operand)?,
            _ => return Err(unsupported(operand_type, &format!("{:?}", opcode))),
        };
        Ok(value)
    }

    /// `pow(left, right)` through `GLSL.std.450`
    pub fn power(&mut self, operand_type: &TypeRef, result_type: Word, left: Word, right: Word) -> Result<Word> {
        if representation_of(operand_type).map(Representation::scalar) != Some(ScalarKind::Float) {
            return Err(unsupported(operand_type, "Power"));
        }
        let glsl = self.context.module.glsl();
        Ok(self.context.module.builder.ext_inst(
            result_type,
            None,
            glsl,
            GLOp::Pow as u32,
            [Operand::IdRef(left), Operand::IdRef(right)],
        )?)
    }

    fn call(&mut self, dst: u32, method: &MethodRef, arguments: &[u32]) -> Result<()> {
        if method.il()?.is_some() {
            let callee = self.context.function_id(method);
            self.context.record_call(self.function, callee);
            let values = self.load_all(arguments)?;
            let return_type = match method.return_type()? {
                Some(ty) => self.context.module.value_type(&ty)?,
                None => self.context.module.void(),
            };
            let result = self
                .context
                .module
                .builder
                .function_call(return_type, None, callee, values)?;
            if dst != NO_RESULT {
                self.store(dst, result)?;
            }
            return Ok(());
        }

        let intrinsic = INTRINSICS.get(method)?;
        trace!(method = %method.full_name(), "lowering intrinsic");
        let result = intrinsic(self, &IntrinsicCall { method, arguments })?;
        match (dst, result) {
            (NO_RESULT, _) => Ok(()),
            (dst, Some(value)) => self.store(dst, value),
            (dst, None) => Err(Error::invalid_operation(format!(
                "`{}` produced no value for %{}",
                method.full_name(),
                dst
            ))),
        }
    }
}
