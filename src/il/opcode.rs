//! Opcodes and their operand layout
//!
//! The `opcodes!` table is the single description of the tail format: the
//! generator validates against it and the disassembler decodes with it.

use std::fmt;

/// Kind of one operand in an instruction tail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    /// `u32` IL variable index
    Variable,
    /// `u64` local type id
    Type,
    /// `u64` local method id
    Method,
    /// `u32` field index within its type
    Field,
    /// `u32` label index
    Label,
    /// `u32` immediate
    UInt32,
    /// `f32` immediate
    Float32,
    /// `u8` immediate
    UInt8,
    /// `u8` count followed by that many `u32` variable indices
    Variables,
}

/// One decoded or to-be-encoded operand
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// IL variable index
    Variable(u32),
    /// Local type id
    Type(u64),
    /// Local method id
    Method(u64),
    /// Field index
    Field(u32),
    /// Label index
    Label(u32),
    /// 32-bit immediate
    UInt32(u32),
    /// Float immediate
    Float32(f32),
    /// Byte immediate
    UInt8(u8),
    /// Variable list
    Variables(Vec<u32>),
}

impl Operand {
    /// Kind of this operand
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::Variable(_) => OperandKind::Variable,
            Operand::Type(_) => OperandKind::Type,
            Operand::Method(_) => OperandKind::Method,
            Operand::Field(_) => OperandKind::Field,
            Operand::Label(_) => OperandKind::Label,
            Operand::UInt32(_) => OperandKind::UInt32,
            Operand::Float32(_) => OperandKind::Float32,
            Operand::UInt8(_) => OperandKind::UInt8,
            Operand::Variables(_) => OperandKind::Variables,
        }
    }

    /// Appends the little-endian encoding
    pub fn write(&self, out: &mut Vec<u8>) {
        match self {
            Operand::Variable(v) | Operand::Field(v) | Operand::Label(v) | Operand::UInt32(v) => {
                out.extend_from_slice(&v.to_le_bytes())
            }
            Operand::Type(id) | Operand::Method(id) => out.extend_from_slice(&id.to_le_bytes()),
            Operand::Float32(value) => out.extend_from_slice(&value.to_le_bytes()),
            Operand::UInt8(value) => out.push(*value),
            Operand::Variables(variables) => {
                out.push(variables.len() as u8);
                for variable in variables {
                    out.extend_from_slice(&variable.to_le_bytes());
                }
            }
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Variable(v) => write!(f, "%{}", v),
            Operand::Type(id) => write!(f, "type#{}", id),
            Operand::Method(id) => write!(f, "method#{}", id),
            Operand::Field(index) => write!(f, "field#{}", index),
            Operand::Label(label) => write!(f, "L{}", label),
            Operand::UInt32(value) => write!(f, "{}", value),
            Operand::Float32(value) => write!(f, "{:?}", value),
            Operand::UInt8(value) => write!(f, "{}", value),
            Operand::Variables(variables) => {
                let names: Vec<String> = variables.iter().map(|v| format!("%{}", v)).collect();
                write!(f, "({})", names.join(", "))
            }
        }
    }
}

macro_rules! opcodes {
    ($($(#[$doc:meta])* $name:ident = $value:literal [$($kind:ident),*],)*) => {
        /// IL opcode
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum OpCode {
            $($(#[$doc])* $name = $value,)*
        }

        impl OpCode {
            /// Every opcode
            pub const ALL: &'static [OpCode] = &[$(OpCode::$name,)*];

            /// Operand kinds in tail order
            pub fn operands(self) -> &'static [OperandKind] {
                match self {
                    $(OpCode::$name => &[$(OperandKind::$kind),*],)*
                }
            }

            /// Opcode with the numeric value `value`
            pub fn from_u16(value: u16) -> Option<OpCode> {
                match value {
                    $($value => Some(OpCode::$name),)*
                    _ => None,
                }
            }
        }
    };
}

opcodes! {
    /// Does nothing
    Nop = 0 [],
    /// Introduces a local variable of a type
    DefVariable = 1 [Variable, Type],
    /// Copies a variable
    Load = 2 [Variable, Variable],
    /// Loads an unsigned immediate
    LoadUInt32 = 3 [Variable, UInt32],
    /// Loads a signed immediate stored as its bits
    LoadInt32 = 4 [Variable, UInt32],
    /// Loads a float immediate
    LoadFloat32 = 5 [Variable, Float32],
    /// Loads a boolean immediate
    LoadBool = 6 [Variable, UInt8],
    /// dst = obj.field
    LoadField = 7 [Variable, Variable, Field],
    /// obj.field = src
    SetField = 8 [Variable, Field, Variable],
    /// dst = Type.field
    LoadStaticField = 9 [Variable, Type, Field],
    /// Type.field = src
    SetStaticField = 10 [Type, Field, Variable],
    /// dst = obj[index]
    LoadElement = 11 [Variable, Variable, Variable],
    /// obj[index] = src
    SetElement = 12 [Variable, Variable, Variable],
    /// dst = l + r
    Add = 13 [Variable, Variable, Variable],
    /// dst = l - r
    Subtract = 14 [Variable, Variable, Variable],
    /// dst = l * r
    Multiply = 15 [Variable, Variable, Variable],
    /// dst = l / r
    Divide = 16 [Variable, Variable, Variable],
    /// dst = l mod r, sign of the divisor
    Modulo = 17 [Variable, Variable, Variable],
    /// dst = l rem r, sign of the dividend
    Remainder = 18 [Variable, Variable, Variable],
    /// dst = -src
    Negate = 19 [Variable, Variable],
    /// dst = l == r
    Equal = 20 [Variable, Variable, Variable],
    /// dst = l != r
    NotEqual = 21 [Variable, Variable, Variable],
    /// dst = l < r
    Less = 22 [Variable, Variable, Variable],
    /// dst = l <= r
    LessOrEqual = 23 [Variable, Variable, Variable],
    /// dst = l > r
    Greater = 24 [Variable, Variable, Variable],
    /// dst = l >= r
    GreaterOrEqual = 25 [Variable, Variable, Variable],
    /// dst = l && r
    And = 26 [Variable, Variable, Variable],
    /// dst = l || r
    Or = 27 [Variable, Variable, Variable],
    /// dst = !src
    Not = 28 [Variable, Variable],
    /// dst = method(args); dst is `NO_RESULT` for void calls
    Call = 29 [Variable, Method, Variables],
    /// Returns from a void method
    Return = 30 [],
    /// Returns a value
    ReturnValue = 31 [Variable],
    /// Starts a basic block
    Label = 32 [Label],
    /// Unconditional branch
    Jump = 33 [Label],
    /// Two-way branch on a boolean
    JumpIf = 34 [Variable, Label, Label],
    /// Declares the merge block of the following `JumpIf`
    SelectionMerge = 35 [Label],
    /// Declares merge and continue blocks of a loop header
    LoopMerge = 36 [Label, Label],
}

impl OpCode {
    /// Opcode an extern operator method named `name` lowers to
    pub fn from_operator_method(name: &str) -> Option<OpCode> {
        match name {
            "Add" => Some(OpCode::Add),
            "Subtract" => Some(OpCode::Subtract),
            "Multiply" => Some(OpCode::Multiply),
            "Divide" => Some(OpCode::Divide),
            "Modulo" => Some(OpCode::Modulo),
            "Remainder" => Some(OpCode::Remainder),
            "Negate" => Some(OpCode::Negate),
            _ => None,
        }
    }

    /// Whether control never falls through this instruction
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            OpCode::Return | OpCode::ReturnValue | OpCode::Jump | OpCode::JumpIf
        )
    }
}

/// Destination operand of a `Call` without result
pub const NO_RESULT: u32 = u32::MAX;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_u16_covers_all() {
        for opcode in OpCode::ALL {
            assert_eq!(OpCode::from_u16(*opcode as u16), Some(*opcode));
        }
        assert_eq!(OpCode::from_u16(9999), None);
    }

    #[test]
    fn test_operand_table() {
        assert_eq!(
            OpCode::DefVariable.operands(),
            &[OperandKind::Variable, OperandKind::Type]
        );
        assert!(OpCode::Return.operands().is_empty());
    }
}
