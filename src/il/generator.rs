//! Incremental construction of method bodies

use super::container::IlContainer;
use super::opcode::{OpCode, Operand, NO_RESULT};
use crate::error::{Error, Result};
use crate::ir::{FieldRef, MethodRef, NeslAssembly, TypeRef};
use std::sync::Arc;

/// Builds an [`IlContainer`]. Variables `0..parameter_count` are the method
/// parameters; every further variable comes from [`IlGenerator::def_variable`].
pub struct IlGenerator {
    assembly: Arc<NeslAssembly>,
    tail: Vec<u8>,
    instructions: Vec<(OpCode, u32)>,
    variable_count: u32,
    label_count: u32,
    terminated: bool,
}

impl IlGenerator {
    /// Generator whose ids are local to `assembly`
    pub fn new(assembly: &Arc<NeslAssembly>, parameter_count: u32) -> Self {
        IlGenerator {
            assembly: assembly.clone(),
            tail: Vec::new(),
            instructions: Vec::new(),
            variable_count: parameter_count,
            label_count: 0,
            terminated: false,
        }
    }

    /// Number of variables, parameters included
    pub fn variable_count(&self) -> u32 {
        self.variable_count
    }

    /// Whether the last instruction ends its block
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Appends an instruction, checking the operands against the opcode table
    pub fn emit(&mut self, opcode: OpCode, operands: &[Operand]) -> Result<()> {
        let expected = opcode.operands();
        let matches = expected.len() == operands.len()
            && expected.iter().zip(operands).all(|(kind, operand)| operand.kind() == *kind);
        if !matches {
            return Err(Error::invalid_operation(format!(
                "operands {:?} do not fit {:?}",
                operands, opcode
            )));
        }

        let start = u32::try_from(self.tail.len())
            .map_err(|_| Error::invalid_operation("IL tail exceeds 4 GiB"))?;
        for operand in operands {
            if let Operand::Variables(variables) = operand {
                if variables.len() > u8::MAX as usize {
                    return Err(Error::invalid_operation("more than 255 call arguments"));
                }
            }
            operand.write(&mut self.tail);
        }
        self.instructions.push((opcode, start));
        self.terminated = opcode.is_terminator();
        Ok(())
    }

    /// Introduces a local of type `ty`
    pub fn def_variable(&mut self, ty: &TypeRef) -> Result<u32> {
        let variable = self.variable_count;
        let type_id = self.assembly.get_local_type_id(ty);
        self.emit(
            OpCode::DefVariable,
            &[Operand::Variable(variable), Operand::Type(type_id)],
        )?;
        self.variable_count += 1;
        Ok(variable)
    }

    /// Reserves a label for [`IlGenerator::mark_label`]
    pub fn new_label(&mut self) -> u32 {
        let label = self.label_count;
        self.label_count += 1;
        label
    }

    /// Starts the block `label`
    pub fn mark_label(&mut self, label: u32) -> Result<()> {
        self.emit(OpCode::Label, &[Operand::Label(label)])
    }

    /// `dst = src`
    pub fn load(&mut self, dst: u32, src: u32) -> Result<()> {
        self.emit(OpCode::Load, &[Operand::Variable(dst), Operand::Variable(src)])
    }

    /// `dst = value`
    pub fn load_uint32(&mut self, dst: u32, value: u32) -> Result<()> {
        self.emit(OpCode::LoadUInt32, &[Operand::Variable(dst), Operand::UInt32(value)])
    }

    /// `dst = value`
    pub fn load_int32(&mut self, dst: u32, value: i32) -> Result<()> {
        self.emit(
            OpCode::LoadInt32,
            &[Operand::Variable(dst), Operand::UInt32(value as u32)],
        )
    }

    /// `dst = value`
    pub fn load_float32(&mut self, dst: u32, value: f32) -> Result<()> {
        self.emit(OpCode::LoadFloat32, &[Operand::Variable(dst), Operand::Float32(value)])
    }

    /// `dst = value`
    pub fn load_bool(&mut self, dst: u32, value: bool) -> Result<()> {
        self.emit(
            OpCode::LoadBool,
            &[Operand::Variable(dst), Operand::UInt8(value as u8)],
        )
    }

    /// `dst = obj.field`
    pub fn load_field(&mut self, dst: u32, obj: u32, field: u32) -> Result<()> {
        self.emit(
            OpCode::LoadField,
            &[Operand::Variable(dst), Operand::Variable(obj), Operand::Field(field)],
        )
    }

    /// `obj.field = src`
    pub fn set_field(&mut self, obj: u32, field: u32, src: u32) -> Result<()> {
        self.emit(
            OpCode::SetField,
            &[Operand::Variable(obj), Operand::Field(field), Operand::Variable(src)],
        )
    }

    /// `dst = Owner.field`
    pub fn load_static_field(&mut self, dst: u32, owner: &TypeRef, field: u32) -> Result<()> {
        let owner = self.assembly.get_local_type_id(owner);
        self.emit(
            OpCode::LoadStaticField,
            &[Operand::Variable(dst), Operand::Type(owner), Operand::Field(field)],
        )
    }

    /// `Owner.field = src`
    pub fn set_static_field(&mut self, owner: &TypeRef, field: u32, src: u32) -> Result<()> {
        let owner = self.assembly.get_local_type_id(owner);
        self.emit(
            OpCode::SetStaticField,
            &[Operand::Type(owner), Operand::Field(field), Operand::Variable(src)],
        )
    }

    /// `dst = obj[index]`
    pub fn load_element(&mut self, dst: u32, obj: u32, index: u32) -> Result<()> {
        self.emit(
            OpCode::LoadElement,
            &[Operand::Variable(dst), Operand::Variable(obj), Operand::Variable(index)],
        )
    }

    /// `obj[index] = src`
    pub fn set_element(&mut self, obj: u32, index: u32, src: u32) -> Result<()> {
        self.emit(
            OpCode::SetElement,
            &[Operand::Variable(obj), Operand::Variable(index), Operand::Variable(src)],
        )
    }

    /// Binary instruction `dst = l op r`
    pub fn binary(&mut self, opcode: OpCode, dst: u32, left: u32, right: u32) -> Result<()> {
        self.emit(
            opcode,
            &[Operand::Variable(dst), Operand::Variable(left), Operand::Variable(right)],
        )
    }

    /// Unary instruction `dst = op src`
    pub fn unary(&mut self, opcode: OpCode, dst: u32, src: u32) -> Result<()> {
        self.emit(opcode, &[Operand::Variable(dst), Operand::Variable(src)])
    }

    /// Calls `method`; `dst` receives the result if there is one
    pub fn call(&mut self, dst: Option<u32>, method: &MethodRef, arguments: Vec<u32>) -> Result<()> {
        let method = self.assembly.get_local_method_id(method);
        self.emit(
            OpCode::Call,
            &[
                Operand::Variable(dst.unwrap_or(NO_RESULT)),
                Operand::Method(method),
                Operand::Variables(arguments),
            ],
        )
    }

    /// Returns from a void method
    pub fn ret(&mut self) -> Result<()> {
        self.emit(OpCode::Return, &[])
    }

    /// Returns `value`
    pub fn ret_value(&mut self, value: u32) -> Result<()> {
        self.emit(OpCode::ReturnValue, &[Operand::Variable(value)])
    }

    /// Unconditional branch
    pub fn jump(&mut self, label: u32) -> Result<()> {
        self.emit(OpCode::Jump, &[Operand::Label(label)])
    }

    /// Branch to `if_true` or `if_false`
    pub fn jump_if(&mut self, condition: u32, if_true: u32, if_false: u32) -> Result<()> {
        self.emit(
            OpCode::JumpIf,
            &[
                Operand::Variable(condition),
                Operand::Label(if_true),
                Operand::Label(if_false),
            ],
        )
    }

    /// Declares the merge block of the next conditional branch
    pub fn selection_merge(&mut self, merge: u32) -> Result<()> {
        self.emit(OpCode::SelectionMerge, &[Operand::Label(merge)])
    }

    /// Declares merge and continue blocks of the current loop header
    pub fn loop_merge(&mut self, merge: u32, continue_target: u32) -> Result<()> {
        self.emit(
            OpCode::LoopMerge,
            &[Operand::Label(merge), Operand::Label(continue_target)],
        )
    }

    /// Finishes the body
    pub fn build(self) -> IlContainer {
        IlContainer::new(Arc::downgrade(&self.assembly), self.tail, self.instructions)
    }
}

/// Position of `field` in its parent's field list
pub fn field_index(field: &FieldRef) -> Result<u32> {
    let parent = field
        .parent()
        .ok_or_else(|| Error::invalid_operation(format!("parent of `{}` was dropped", field.name())))?;
    parent
        .get_field(field.name())?
        .map(|(index, _)| index)
        .ok_or_else(|| Error::invalid_operation(format!("`{}` is not a field of `{}`", field.name(), parent)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Modifiers, NeslAssemblyBuilder, TypeKind};

    #[test]
    fn test_emit_and_read_back() {
        let builder = NeslAssemblyBuilder::new("Test", "", Vec::new());
        let uint = builder
            .define_type("System", "UInt32", TypeKind::Struct, Modifiers::PUBLIC, &[])
            .unwrap();

        let mut generator = IlGenerator::new(builder.assembly(), 2);
        let sum = generator.def_variable(&uint).unwrap();
        generator.binary(OpCode::Add, sum, 0, 1).unwrap();
        generator.load_float32(sum, 4.14359).unwrap();
        generator.ret_value(sum).unwrap();
        assert!(generator.is_terminated());
        let container = generator.build();

        assert_eq!(container.len(), 4);
        let mut def = container.instruction(0).unwrap();
        assert_eq!(def.opcode(), OpCode::DefVariable);
        assert_eq!(def.read_u32().unwrap(), 2);
        let type_id = def.read_u64().unwrap();
        assert!(Arc::ptr_eq(&builder.get_type_by_id(type_id).unwrap(), &uint));

        let mut load = container.instruction(2).unwrap();
        load.read_u32().unwrap();
        assert_eq!(load.read_f32().unwrap(), 4.14359);
        assert!(load.read_u8().is_err());
    }

    #[test]
    fn test_operand_mismatch_is_rejected() {
        let builder = NeslAssemblyBuilder::new("Test", "", Vec::new());
        let mut generator = IlGenerator::new(builder.assembly(), 0);
        assert!(generator.emit(OpCode::Load, &[Operand::Variable(0)]).is_err());
        assert!(generator
            .emit(OpCode::Jump, &[Operand::Variable(0)])
            .is_err());
    }

    #[test]
    fn test_disassemble_names_types() {
        let builder = NeslAssemblyBuilder::new("Test", "", Vec::new());
        let float = builder
            .define_type("System", "Float32", TypeKind::Struct, Modifiers::PUBLIC, &[])
            .unwrap();
        let mut generator = IlGenerator::new(builder.assembly(), 0);
        let value = generator.def_variable(&float).unwrap();
        generator.unary(OpCode::Negate, value, value).unwrap();
        generator.ret().unwrap();
        let listing = generator.build().disassemble().unwrap();

        assert!(listing.contains("DefVariable %0, System.Float32"));
        assert!(listing.contains("Negate %0, %0"));
        assert_eq!(listing.lines().count(), 3);
    }
}
