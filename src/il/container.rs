//! Compiled method bodies
//!
//! An [`IlContainer`] is a list of `(opcode, tail index)` pairs over one
//! contiguous operand buffer. Operands are positional and little-endian; an
//! [`Instruction`] cursor must read them in the order the table in
//! [`OpCode::operands`] gives.

use super::opcode::{OpCode, Operand, OperandKind};
use crate::error::{Error, Result};
use crate::ir::{NeslAssembly, TypeRef};
use std::fmt::{self, Write as _};
use std::sync::{Arc, Weak};

/// First type id that names an entry of the container's own type table
/// rather than one of the assembly's
pub const CONTAINER_TYPE_BASE: u64 = 1 << 63;

/// Body of one method
pub struct IlContainer {
    assembly: Weak<NeslAssembly>,
    tail: Vec<u8>,
    instructions: Vec<(OpCode, u32)>,
    local_types: Vec<TypeRef>,
}

impl IlContainer {
    /// Container over an encoded tail. Type and method ids in the tail are
    /// local ids of `assembly`.
    pub fn new(assembly: Weak<NeslAssembly>, tail: Vec<u8>, instructions: Vec<(OpCode, u32)>) -> Self {
        IlContainer {
            assembly,
            tail,
            instructions,
            local_types: Vec::new(),
        }
    }

    /// Container whose tail may also name `local_types`, as
    /// `CONTAINER_TYPE_BASE + index`. Generic substitution uses this so the
    /// assembly's id table stays untouched.
    pub fn with_local_types(
        assembly: Weak<NeslAssembly>,
        tail: Vec<u8>,
        instructions: Vec<(OpCode, u32)>,
        local_types: Vec<TypeRef>,
    ) -> Self {
        IlContainer {
            assembly,
            tail,
            instructions,
            local_types,
        }
    }

    /// Types only this container can name
    pub fn local_types(&self) -> &[TypeRef] {
        &self.local_types
    }

    /// Resolves a type operand against the container's table or the assembly's
    pub fn get_type_by_id(&self, id: u64) -> Result<TypeRef> {
        if id < CONTAINER_TYPE_BASE {
            return self.assembly()?.get_type_by_id(id);
        }
        usize::try_from(id - CONTAINER_TYPE_BASE)
            .ok()
            .and_then(|index| self.local_types.get(index).cloned())
            .ok_or_else(|| Error::TypeNotFound(format!("IL container type #{}", id - CONTAINER_TYPE_BASE)))
    }

    /// Assembly whose id tables the operands refer to
    pub fn assembly(&self) -> Result<Arc<NeslAssembly>> {
        self.assembly
            .upgrade()
            .ok_or_else(|| Error::invalid_operation("IL container outlived its assembly"))
    }

    /// Raw operand buffer
    pub fn tail(&self) -> &[u8] {
        &self.tail
    }

    /// `(opcode, tail index)` pairs
    pub fn instruction_pairs(&self) -> &[(OpCode, u32)] {
        &self.instructions
    }

    /// Number of instructions
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Whether the body is empty
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Cursor at instruction `index`
    pub fn instruction(&self, index: usize) -> Option<Instruction<'_>> {
        self.instructions
            .get(index)
            .map(|(opcode, start)| Instruction::new(*opcode, &self.tail, *start as usize))
    }

    /// Cursors over every instruction in order
    pub fn instructions(&self) -> impl Iterator<Item = Instruction<'_>> + '_ {
        self.instructions
            .iter()
            .map(move |(opcode, start)| Instruction::new(*opcode, &self.tail, *start as usize))
    }

    /// Human-readable listing, one instruction per line. Type and method ids
    /// are resolved to names while the assembly is alive.
    pub fn disassemble(&self) -> Result<String> {
        let assembly = self.assembly.upgrade();
        let mut listing = String::new();

        for (index, instruction) in self.instructions().enumerate() {
            let opcode = instruction.opcode();
            let operands = instruction.operands()?;
            let rendered: Vec<String> = operands
                .iter()
                .map(|operand| match (operand, &assembly) {
                    (Operand::Type(id), Some(_)) => self
                        .get_type_by_id(*id)
                        .map(|ty| ty.full_name().to_string())
                        .unwrap_or_else(|_| operand.to_string()),
                    (Operand::Method(id), Some(assembly)) => assembly
                        .get_method_by_id(*id)
                        .map(|method| method.full_name())
                        .unwrap_or_else(|_| operand.to_string()),
                    (Operand::Variable(super::NO_RESULT), _) if opcode == OpCode::Call => {
                        "_".to_string()
                    }
                    _ => operand.to_string(),
                })
                .collect();

            let _ = write!(listing, "{:4}: {:?}", index, opcode);
            if !rendered.is_empty() {
                let _ = write!(listing, " {}", rendered.join(", "));
            }
            listing.push('\n');
        }
        Ok(listing)
    }
}

impl fmt::Debug for IlContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IlContainer")
            .field("instructions", &self.instructions.len())
            .field("tail", &self.tail.len())
            .field("local_types", &self.local_types.len())
            .finish()
    }
}

/// Read cursor over the operands of one instruction
#[derive(Clone)]
pub struct Instruction<'a> {
    opcode: OpCode,
    tail: &'a [u8],
    start: usize,
    offset: usize,
}

impl<'a> Instruction<'a> {
    fn new(opcode: OpCode, tail: &'a [u8], start: usize) -> Self {
        Instruction {
            opcode,
            tail,
            start,
            offset: start,
        }
    }

    /// Opcode of the instruction
    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    /// Tail index of the first operand
    pub fn tail_index(&self) -> usize {
        self.start
    }

    /// Absolute tail offset of the next read
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let available = self.tail.len().saturating_sub(self.offset);
        let bytes = self
            .tail
            .get(self.offset..self.offset + N)
            .ok_or(Error::UnexpectedEndOfData { needed: N, available })?;
        self.offset += N;
        let mut array = [0u8; N];
        array.copy_from_slice(bytes);
        Ok(array)
    }

    /// Reads a byte
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take::<1>()?[0])
    }

    /// Reads a little-endian `u32`
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    /// Reads a little-endian `u64`
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take()?))
    }

    /// Reads a little-endian `f32`
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take()?))
    }

    /// Reads a variable list (`u8` count, then `u32` each)
    pub fn read_variables(&mut self) -> Result<Vec<u32>> {
        let count = self.read_u8()?;
        (0..count).map(|_| self.read_u32()).collect()
    }

    /// Reads one operand of the given kind
    pub fn read_operand(&mut self, kind: OperandKind) -> Result<Operand> {
        Ok(match kind {
            OperandKind::Variable => Operand::Variable(self.read_u32()?),
            OperandKind::Type => Operand::Type(self.read_u64()?),
            OperandKind::Method => Operand::Method(self.read_u64()?),
            OperandKind::Field => Operand::Field(self.read_u32()?),
            OperandKind::Label => Operand::Label(self.read_u32()?),
            OperandKind::UInt32 => Operand::UInt32(self.read_u32()?),
            OperandKind::Float32 => Operand::Float32(self.read_f32()?),
            OperandKind::UInt8 => Operand::UInt8(self.read_u8()?),
            OperandKind::Variables => Operand::Variables(self.read_variables()?),
        })
    }

    /// Decodes every operand from the start of the instruction. The cursor
    /// itself does not move.
    pub fn operands(&self) -> Result<Vec<Operand>> {
        let mut cursor = Instruction::new(self.opcode, self.tail, self.start);
        self.opcode
            .operands()
            .iter()
            .map(|kind| cursor.read_operand(*kind))
            .collect()
    }
}

impl fmt::Debug for Instruction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instruction")
            .field("opcode", &self.opcode)
            .field("offset", &self.offset)
            .finish()
    }
}
