//! Binary form of [`IlContainer`]
//!
//! `i32` tail length, tail bytes, `i32` instruction count, then
//! `(u16 opcode, u32 tail index)` per instruction. The tail itself is copied
//! verbatim; only the framing follows the writer's byte order.

use super::binary::{SerializationReader, SerializationWriter};
use crate::error::{Error, Result};
use crate::il::{IlContainer, OpCode};
use std::sync::Arc;

/// Writes `container`
pub fn serialize_il(writer: &mut SerializationWriter, container: &IlContainer) -> Result<()> {
    if !container.local_types().is_empty() {
        return Err(Error::serialization(
            "IL of a generic instantiation names types outside its assembly",
        ));
    }
    writer.write_bytes(container.tail())?;
    writer.write_len(container.len())?;
    for (opcode, tail_index) in container.instruction_pairs() {
        writer.write_u16(*opcode as u16);
        writer.write_u32(*tail_index);
    }
    Ok(())
}

/// Reads a container bound to the storage's current assembly
pub fn deserialize_il(reader: &mut SerializationReader<'_>) -> Result<IlContainer> {
    let assembly = reader.storage()?.current()?;

    let tail = reader.read_bytes()?;
    let count = reader.read_len()?;
    let mut instructions = Vec::with_capacity(count.min(reader.remaining() / 6));
    for _ in 0..count {
        let raw = reader.read_u16()?;
        let opcode = OpCode::from_u16(raw)
            .ok_or_else(|| Error::serialization(format!("unknown opcode {}", raw)))?;
        let tail_index = reader.read_u32()?;
        if tail_index as usize > tail.len() {
            return Err(Error::serialization(format!(
                "tail index {} beyond tail of {} bytes",
                tail_index,
                tail.len()
            )));
        }
        instructions.push((opcode, tail_index));
    }

    Ok(IlContainer::new(Arc::downgrade(&assembly), tail, instructions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::IlGenerator;
    use crate::ir::{Modifiers, NeslAssemblyBuilder, TypeKind};
    use crate::serialization::{Endianness, ObjectStorage};

    #[test]
    fn test_round_trip_is_byte_identical() {
        let builder = NeslAssemblyBuilder::new("Kernels", "", Vec::new());
        let uint = builder
            .define_type("System", "UInt32", TypeKind::Struct, Modifiers::PUBLIC, &[])
            .unwrap();
        let mut generator = IlGenerator::new(builder.assembly(), 1);
        let value = generator.def_variable(&uint).unwrap();
        generator.load_uint32(value, 5).unwrap();
        generator.binary(OpCode::Add, value, value, 0).unwrap();
        generator.ret_value(value).unwrap();
        let container = generator.build();

        let storage = Arc::new(ObjectStorage::new());
        storage.register(builder.assembly().clone());
        storage.set_current(Some(builder.assembly().clone()));

        for endianness in [Endianness::Little, Endianness::Big] {
            let mut writer = SerializationWriter::with_endianness(endianness);
            serialize_il(&mut writer, &container).unwrap();
            let bytes = writer.into_bytes();

            let mut reader = SerializationReader::new(&bytes)
                .with_endianness(endianness)
                .with_storage(storage.clone());
            let loaded = deserialize_il(&mut reader).unwrap();
            assert_eq!(loaded.instruction_pairs(), container.instruction_pairs());
            assert_eq!(loaded.tail(), container.tail());

            let mut again = SerializationWriter::with_endianness(endianness);
            serialize_il(&mut again, &loaded).unwrap();
            assert_eq!(again.into_bytes(), bytes);
        }
    }

    #[test]
    fn test_missing_current_assembly() {
        let mut writer = SerializationWriter::new();
        writer.write_bytes(&[]).unwrap();
        writer.write_len(0).unwrap();
        let bytes = writer.into_bytes();
        let mut reader =
            SerializationReader::new(&bytes).with_storage(Arc::new(ObjectStorage::new()));
        assert!(matches!(
            deserialize_il(&mut reader),
            Err(Error::AssemblyNotFound(_))
        ));
    }
}
