//! Type and constant interning
//!
//! Every NESL type maps to exactly one SPIR-V id for the lifetime of a
//! [`SpirVModule`]. User structs carry std430 member offsets so the same id
//! can sit in function memory and inside a storage buffer.

use crate::error::{Error, Result};
use crate::ir::{identity_key, representation_of, resource_of, Representation, ScalarKind, TypeRef};
use rspirv::dr::{Builder, Operand};
use rspirv::spirv::{self, Decoration, Dim, ImageFormat, StorageClass, Word};
use std::collections::{HashMap, HashSet};

/// std430 size and alignment in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Size in bytes
    pub size: u32,
    /// Alignment in bytes
    pub align: u32,
}

impl Layout {
    /// Size rounded up to the alignment, the stride of an array element
    pub fn stride(self) -> u32 {
        round_up(self.size, self.align)
    }
}

fn round_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}

/// Builder plus the interning tables of one compilation run
pub struct SpirVModule {
    pub(crate) builder: Builder,
    emit_debug_names: bool,
    types: HashMap<usize, (TypeRef, Word)>,
    layouts: HashMap<usize, Layout>,
    pointers: HashMap<(Word, StorageClass), Word>,
    functions: HashMap<(Word, Vec<Word>), Word>,
    constants: HashMap<(Word, u32), Word>,
    booleans: HashMap<bool, Word>,
    buffer_blocks: HashMap<Word, Word>,
    images: HashMap<(Word, u32), Word>,
    decorated: HashSet<Word>,
    glsl: Option<Word>,
}

impl SpirVModule {
    /// Module with the `Shader` capability and the Logical/GLSL450 model
    pub fn new(version: (u8, u8), emit_debug_names: bool) -> Self {
        let mut builder = Builder::new();
        builder.set_version(version.0, version.1);
        builder.capability(spirv::Capability::Shader);
        builder.memory_model(spirv::AddressingModel::Logical, spirv::MemoryModel::GLSL450);

        SpirVModule {
            builder,
            emit_debug_names,
            types: HashMap::new(),
            layouts: HashMap::new(),
            pointers: HashMap::new(),
            functions: HashMap::new(),
            constants: HashMap::new(),
            booleans: HashMap::new(),
            buffer_blocks: HashMap::new(),
            images: HashMap::new(),
            decorated: HashSet::new(),
            glsl: None,
        }
    }

    /// `OpName` when debug names are on
    pub fn name(&mut self, id: Word, name: &str) {
        if self.emit_debug_names {
            self.builder.name(id, name);
        }
    }

    /// The `GLSL.std.450` instruction set
    pub fn glsl(&mut self) -> Word {
        match self.glsl {
            Some(id) => id,
            None => {
                let id = self.builder.ext_inst_import("GLSL.std.450");
                self.glsl = Some(id);
                id
            }
        }
    }

    pub fn void(&mut self) -> Word {
        self.builder.type_void()
    }

    /// Type of one scalar kind
    pub fn scalar(&mut self, kind: ScalarKind) -> Word {
        match kind {
            ScalarKind::Boolean => self.builder.type_bool(),
            ScalarKind::UnsignedInteger => self.builder.type_int(32, 0),
            ScalarKind::SignedInteger => self.builder.type_int(32, 1),
            ScalarKind::Float => self.builder.type_float(32),
        }
    }

    pub fn uint(&mut self) -> Word {
        self.scalar(ScalarKind::UnsignedInteger)
    }

    pub fn float(&mut self) -> Word {
        self.scalar(ScalarKind::Float)
    }

    pub fn vector(&mut self, kind: ScalarKind, size: u32) -> Word {
        let element = self.scalar(kind);
        self.builder.type_vector(element, size)
    }

    /// Value type of `ty`. Generic placeholders and resources have none.
    pub fn value_type(&mut self, ty: &TypeRef) -> Result<Word> {
        if let Some((_, id)) = self.types.get(&identity_key(ty)) {
            return Ok(*id);
        }

        let id = match representation_of(ty) {
            Some(Representation::Scalar(kind)) => self.scalar(kind),
            Some(Representation::Vector { element, size }) => self.vector(element, size),
            None => self.struct_type(ty)?,
        };
        self.types.insert(identity_key(ty), (ty.clone(), id));
        Ok(id)
    }

    fn struct_type(&mut self, ty: &TypeRef) -> Result<Word> {
        if !ty.is_fully_constructed() {
            return Err(Error::invalid_operation(format!(
                "`{}` has unbound generic parameters and no SPIR-V type",
                ty
            )));
        }
        if resource_of(ty).is_some() {
            return Err(Error::invalid_operation(format!(
                "`{}` is a resource and has no value representation",
                ty
            )));
        }

        let fields: Vec<_> = ty.fields()?.into_iter().filter(|field| !field.is_static()).collect();
        let mut members = Vec::with_capacity(fields.len());
        for field in &fields {
            members.push(self.value_type(field.field_type())?);
        }
        let offsets = self.member_offsets(ty)?;

        let id = self.builder.type_struct(members);
        if self.decorated.insert(id) {
            for (member, offset) in offsets.iter().enumerate() {
                self.builder.member_decorate(
                    id,
                    member as u32,
                    Decoration::Offset,
                    [Operand::LiteralBit32(*offset)],
                );
            }
            if self.emit_debug_names {
                self.builder.name(id, ty.full_name());
                for (member, field) in fields.iter().enumerate() {
                    self.builder.member_name(id, member as u32, field.name());
                }
            }
        }
        Ok(id)
    }

    /// std430 layout of `ty`
    pub fn layout(&mut self, ty: &TypeRef) -> Result<Layout> {
        if let Some(layout) = self.layouts.get(&identity_key(ty)) {
            return Ok(*layout);
        }

        let layout = match representation_of(ty) {
            Some(Representation::Scalar(_)) => Layout { size: 4, align: 4 },
            Some(Representation::Vector { size, .. }) => Layout {
                size: 4 * size,
                align: if size == 2 { 8 } else { 16 },
            },
            None => {
                let mut offset = 0;
                let mut align = 4;
                for field in ty.fields()?.into_iter().filter(|field| !field.is_static()) {
                    let member = self.layout(field.field_type())?;
                    offset = round_up(offset, member.align) + member.size;
                    align = align.max(member.align);
                }
                Layout {
                    size: round_up(offset, align),
                    align,
                }
            }
        };
        self.layouts.insert(identity_key(ty), layout);
        Ok(layout)
    }

    fn member_offsets(&mut self, ty: &TypeRef) -> Result<Vec<u32>> {
        let mut offsets = Vec::new();
        let mut offset = 0;
        for field in ty.fields()?.into_iter().filter(|field| !field.is_static()) {
            let member = self.layout(field.field_type())?;
            offset = round_up(offset, member.align);
            offsets.push(offset);
            offset += member.size;
        }
        Ok(offsets)
    }

    pub fn pointer(&mut self, class: StorageClass, pointee: Word) -> Word {
        if let Some(id) = self.pointers.get(&(pointee, class)) {
            return *id;
        }
        let id = self.builder.type_pointer(None, class, pointee);
        self.pointers.insert((pointee, class), id);
        id
    }

    pub fn function_type(&mut self, return_type: Word, parameters: Vec<Word>) -> Word {
        let key = (return_type, parameters);
        if let Some(id) = self.functions.get(&key) {
            return *id;
        }
        let id = self.builder.type_function(return_type, key.1.iter().copied());
        self.functions.insert(key, id);
        id
    }

    /// `BufferBlock` struct wrapping a runtime array of `element`
    pub fn buffer_block(&mut self, element: &TypeRef) -> Result<(Word, Layout)> {
        let element_type = self.value_type(element)?;
        let layout = self.layout(element)?;
        if let Some(id) = self.buffer_blocks.get(&element_type) {
            return Ok((*id, layout));
        }

        let array = self.builder.type_runtime_array(element_type);
        if self.decorated.insert(array) {
            self.builder.decorate(
                array,
                Decoration::ArrayStride,
                [Operand::LiteralBit32(layout.stride())],
            );
        }
        let block = self.builder.type_struct([array]);
        if self.decorated.insert(block) {
            self.builder.decorate(block, Decoration::BufferBlock, []);
            self.builder.member_decorate(block, 0, Decoration::Offset, [Operand::LiteralBit32(0)]);
        }
        self.buffer_blocks.insert(element_type, block);
        Ok((block, layout))
    }

    /// Storage image type for texels of type `texel`
    pub fn image(&mut self, texel: &TypeRef) -> Result<Word> {
        let (kind, components) = match representation_of(texel) {
            Some(Representation::Scalar(kind)) => (kind, 1),
            Some(Representation::Vector { element, size: 4 }) => (element, 4),
            _ => return Err(unsupported(texel, "Texture2D")),
        };
        let format = match (kind, components) {
            (ScalarKind::Float, 1) => ImageFormat::R32f,
            (ScalarKind::Float, _) => ImageFormat::Rgba32f,
            (ScalarKind::UnsignedInteger, 1) => ImageFormat::R32ui,
            (ScalarKind::UnsignedInteger, _) => ImageFormat::Rgba32ui,
            (ScalarKind::SignedInteger, 1) => ImageFormat::R32i,
            (ScalarKind::SignedInteger, _) => ImageFormat::Rgba32i,
            (ScalarKind::Boolean, _) => return Err(unsupported(texel, "Texture2D")),
        };

        let sampled = self.scalar(kind);
        let key = (sampled, components);
        if let Some(id) = self.images.get(&key) {
            return Ok(*id);
        }
        let id = self.builder.type_image(sampled, Dim::Dim2D, 0, 0, 0, 2, format, None);
        self.images.insert(key, id);
        Ok(id)
    }

    /// 32-bit constant of type `ty`, deduplicated by value and type
    pub fn constant_bits(&mut self, ty: Word, bits: u32) -> Word {
        if let Some(id) = self.constants.get(&(ty, bits)) {
            return *id;
        }
        let id = self.builder.constant_bit32(ty, bits);
        self.constants.insert((ty, bits), id);
        id
    }

    pub fn constant_uint(&mut self, value: u32) -> Word {
        let ty = self.uint();
        self.constant_bits(ty, value)
    }

    pub fn constant_float(&mut self, value: f32) -> Word {
        let ty = self.float();
        self.constant_bits(ty, value.to_bits())
    }

    pub fn constant_bool(&mut self, value: bool) -> Word {
        if let Some(id) = self.booleans.get(&value) {
            return *id;
        }
        let ty = self.builder.type_bool();
        let id = if value {
            self.builder.constant_true(ty)
        } else {
            self.builder.constant_false(ty)
        };
        self.booleans.insert(value, id);
        id
    }

    /// Finishes the module
    pub fn assemble(self) -> Vec<u32> {
        use rspirv::binary::Assemble;
        self.builder.module().assemble()
    }
}

/// Error for a type an instruction cannot operate on
pub(crate) fn unsupported(ty: &TypeRef, instruction: &str) -> Error {
    Error::invalid_operation(format!("type `{}` is not supported in {}", ty, instruction))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::default_library;
    use crate::ir::representation::{FLOAT32, UINT32};

    fn library_type(name: &str) -> TypeRef {
        default_library().unwrap().get_type(name).unwrap()
    }

    #[test]
    fn test_value_types_are_interned() {
        let mut module = SpirVModule::new((1, 0), false);
        let uint = library_type(UINT32);
        let first = module.value_type(&uint).unwrap();
        let second = module.value_type(&uint).unwrap();
        assert_eq!(first, second);
        assert_eq!(module.uint(), first);
    }

    #[test]
    fn test_vector_layout() {
        let mut module = SpirVModule::new((1, 0), false);
        let float = library_type(FLOAT32);
        let float3 = library_type("System.Vector3").make_generic(&[float]).unwrap();
        let layout = module.layout(&float3).unwrap();
        assert_eq!(layout, Layout { size: 12, align: 16 });
        assert_eq!(layout.stride(), 16);
    }

    #[test]
    fn test_constants_are_deduplicated() {
        let mut module = SpirVModule::new((1, 0), false);
        assert_eq!(module.constant_uint(5), module.constant_uint(5));
        assert_ne!(module.constant_uint(5), module.constant_uint(3));
        assert_eq!(module.constant_bool(true), module.constant_bool(true));
    }

    #[test]
    fn test_generic_definition_has_no_type() {
        let mut module = SpirVModule::new((1, 0), false);
        let vector = library_type("System.Vector3");
        assert!(module.value_type(&vector).is_err());
    }
}
