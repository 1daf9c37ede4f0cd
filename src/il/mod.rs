//! Compact bytecode of method bodies
//!
//! Each instruction is an [`OpCode`] plus an index into a shared operand
//! buffer (the tail). [`IlGenerator`] writes bodies, [`Instruction`] reads
//! them back.

pub mod container;
pub mod generator;
pub mod opcode;

pub use container::{IlContainer, Instruction, CONTAINER_TYPE_BASE};
pub use generator::{field_index, IlGenerator};
pub use opcode::{OpCode, Operand, OperandKind, NO_RESULT};
