//! Binary form of a whole assembly
//!
//! Layout:
//!
//! ```text
//! header       name, path, dependency names
//! shells       per type: namespace, name, kind, modifiers, generic
//!              parameter names, method shells (name, modifiers, generic
//!              parameter names)
//! type table   descriptors in local id order
//! method table descriptors in local id order
//! bodies       attributes, constraints, interfaces, fields, signatures, IL
//! ```
//!
//! The id tables are written in full so the ids embedded in IL tails stay
//! valid after loading without rewriting any tail.

use super::binary::{ObjectStorage, SerializationReader, SerializationWriter};
use super::il::{deserialize_il, serialize_il};
use crate::error::{Error, Result};
use crate::ir::{
    AttributeTargets, GenericParameterOwner, MethodRef, MethodSignature, Modifiers, NeslAssembly,
    NeslAssemblyBuilder, NeslAttribute, NeslParameter, TypeKind, TypeRef,
};
use std::sync::Arc;
use tracing::debug;

const TYPE_LOCAL: u8 = 0;
const TYPE_EXTERNAL: u8 = 1;
const TYPE_CONSTRUCTED: u8 = 2;
const TYPE_GENERIC_PARAMETER: u8 = 3;
const METHOD_GENERIC_PARAMETER: u8 = 4;

const METHOD_MEMBER: u8 = 0;
const METHOD_CONSTRUCTED: u8 = 1;

enum TypeDescriptor {
    Local(usize),
    External { assembly: String, full_name: String },
    Constructed { definition: u64, arguments: Vec<u64> },
    TypeGenericParameter { owner: u64, index: usize },
    MethodGenericParameter { owner: u64, index: usize },
}

enum MethodDescriptor {
    Member { owner: u64, index: usize },
    Constructed { source: u64, arguments: Vec<u64> },
}

impl NeslAssembly {
    /// Serializes the assembly. Dependencies are stored by name only.
    pub fn get_raw_bytes(&self) -> Result<Vec<u8>> {
        let types = self.types();

        // Bodies go first so every id they mention is in the tables.
        let mut bodies = SerializationWriter::new();
        for ty in &types {
            self.write_body(&mut bodies, ty)?;
        }

        let mut type_table = SerializationWriter::new();
        let mut method_table = SerializationWriter::new();
        let (mut written_types, mut written_methods) = (0, 0);
        loop {
            while written_types < self.type_table_len() {
                let ty = self.get_type_by_id(written_types as u64)?;
                self.write_type_descriptor(&mut type_table, &ty, &types)?;
                written_types += 1;
            }
            while written_methods < self.method_table_len() {
                let method = self.get_method_by_id(written_methods as u64)?;
                self.write_method_descriptor(&mut method_table, &method)?;
                written_methods += 1;
            }
            if written_types == self.type_table_len() && written_methods == self.method_table_len() {
                break;
            }
        }

        let mut writer = SerializationWriter::new();
        writer.write_string(self.name())?;
        writer.write_string(self.path())?;
        writer.write_len(self.dependencies().len())?;
        for dependency in self.dependencies() {
            writer.write_string(dependency.name())?;
        }

        writer.write_len(types.len())?;
        for ty in &types {
            write_shell(&mut writer, ty)?;
        }

        writer.write_len(written_types)?;
        writer.write_raw(&type_table.into_bytes());
        writer.write_len(written_methods)?;
        writer.write_raw(&method_table.into_bytes());
        writer.write_raw(&bodies.into_bytes());

        debug!(
            assembly = %self.name(),
            types = types.len(),
            type_ids = written_types,
            method_ids = written_methods,
            bytes = writer.len(),
            "serialized assembly"
        );
        Ok(writer.into_bytes())
    }

    /// Loads an assembly whose dependencies are the built-in library only or
    /// were loaded into the same process through `storage` before.
    pub fn load(bytes: &[u8]) -> Result<Arc<NeslAssembly>> {
        Self::load_with(bytes, &Arc::new(ObjectStorage::with_default_library()?))
    }

    /// Loads an assembly, resolving dependencies by name through `storage`.
    /// The loaded assembly is registered in `storage` as well.
    pub fn load_with(bytes: &[u8], storage: &Arc<ObjectStorage>) -> Result<Arc<NeslAssembly>> {
        let mut reader = SerializationReader::new(bytes).with_storage(storage.clone());

        let name = reader.read_string()?;
        let path = reader.read_string()?;
        let dependency_count = reader.read_len()?;
        let dependencies = (0..dependency_count)
            .map(|_| storage.get(&reader.read_string()?))
            .collect::<Result<Vec<_>>>()?;
        let builder = NeslAssemblyBuilder::new(&name, &path, dependencies);

        let type_count = reader.read_len()?;
        let mut types = Vec::with_capacity(type_count.min(reader.remaining()));
        for _ in 0..type_count {
            types.push(read_shell(&mut reader, &builder)?);
        }

        let type_descriptors = (0..reader.read_len()?)
            .map(|_| read_type_descriptor(&mut reader))
            .collect::<Result<Vec<_>>>()?;
        let method_descriptors = (0..reader.read_len()?)
            .map(|_| read_method_descriptor(&mut reader))
            .collect::<Result<Vec<_>>>()?;

        let mut resolver = Resolver {
            assembly: builder.assembly(),
            types: &types,
            type_descriptors: &type_descriptors,
            method_descriptors: &method_descriptors,
            resolved_types: vec![None; type_descriptors.len()],
            resolved_methods: vec![None; method_descriptors.len()],
        };
        for id in 0..type_descriptors.len() {
            let ty = resolver.resolve_type(id as u64)?;
            if builder.get_local_type_id(&ty) != id as u64 {
                return Err(Error::serialization(format!("duplicate type table entry {}", ty)));
            }
        }
        for id in 0..method_descriptors.len() {
            let method = resolver.resolve_method(id as u64)?;
            if builder.get_local_method_id(&method) != id as u64 {
                return Err(Error::serialization(format!(
                    "duplicate method table entry {}",
                    method.full_name()
                )));
            }
        }

        let assembly = builder.finish();
        storage.register(assembly.clone());
        storage.set_current(Some(assembly.clone()));

        let filled = types
            .iter()
            .try_for_each(|ty| read_body(&mut reader, &assembly, ty));
        storage.set_current(None);
        filled?;

        if reader.remaining() != 0 {
            return Err(Error::serialization(format!(
                "{} trailing bytes after assembly `{}`",
                reader.remaining(),
                assembly.name()
            )));
        }
        debug!(assembly = %assembly.name(), types = types.len(), "loaded assembly");
        Ok(assembly)
    }

    fn type_id(&self, ty: &TypeRef) -> u64 {
        self.get_local_type_id(ty)
    }

    fn write_type_descriptor(
        &self,
        writer: &mut SerializationWriter,
        ty: &TypeRef,
        local_types: &[TypeRef],
    ) -> Result<()> {
        if let Some((owner, index)) = ty.generic_parameter_position() {
            match owner {
                GenericParameterOwner::Type(owner) => {
                    let owner = owner.upgrade().ok_or_else(|| dropped(ty))?;
                    writer.write_u8(TYPE_GENERIC_PARAMETER);
                    writer.write_u64(self.type_id(&owner));
                }
                GenericParameterOwner::Method(owner) => {
                    let owner = owner.upgrade().ok_or_else(|| dropped(ty))?;
                    writer.write_u8(METHOD_GENERIC_PARAMETER);
                    writer.write_u64(self.get_local_method_id(&owner));
                }
            }
            writer.write_len(index)?;
            return Ok(());
        }

        if let Some(definition) = ty.generic_definition() {
            writer.write_u8(TYPE_CONSTRUCTED);
            writer.write_u64(self.type_id(definition));
            writer.write_len(ty.generic_arguments().len())?;
            for argument in ty.generic_arguments() {
                writer.write_u64(self.type_id(argument));
            }
            return Ok(());
        }

        if let Some(index) = local_types.iter().position(|local| Arc::ptr_eq(local, ty)) {
            writer.write_u8(TYPE_LOCAL);
            writer.write_len(index)?;
            return Ok(());
        }

        let assembly = ty.assembly().ok_or_else(|| dropped(ty))?;
        writer.write_u8(TYPE_EXTERNAL);
        writer.write_string(assembly.name())?;
        writer.write_string(ty.full_name())
    }

    fn write_method_descriptor(&self, writer: &mut SerializationWriter, method: &MethodRef) -> Result<()> {
        if !method.generic_arguments().is_empty() {
            let source = method
                .source()
                .ok_or_else(|| Error::invalid_operation("instantiated method without source"))?;
            writer.write_u8(METHOD_CONSTRUCTED);
            writer.write_u64(self.get_local_method_id(source));
            writer.write_len(method.generic_arguments().len())?;
            for argument in method.generic_arguments() {
                writer.write_u64(self.type_id(argument));
            }
            return Ok(());
        }

        let owner = method.owner()?;
        let index = owner
            .methods()?
            .iter()
            .position(|candidate| Arc::ptr_eq(candidate, method))
            .ok_or_else(|| Error::MethodNotFound(method.full_name()))?;
        writer.write_u8(METHOD_MEMBER);
        writer.write_u64(self.type_id(&owner));
        writer.write_len(index)
    }

    fn write_body(&self, writer: &mut SerializationWriter, ty: &TypeRef) -> Result<()> {
        write_attributes(writer, &ty.attributes()?)?;
        self.write_generic_parameters(writer, ty.generic_parameters())?;
        self.write_type_list(writer, &ty.interfaces()?)?;

        let fields = ty.fields()?;
        writer.write_len(fields.len())?;
        for field in &fields {
            writer.write_string(field.name())?;
            writer.write_u64(self.type_id(field.field_type()));
            writer.write_u16(field.modifiers().bits());
            write_attributes(writer, field.attributes())?;
            match field.default_data() {
                Some(data) => {
                    writer.write_bool(true);
                    writer.write_bytes(data)?;
                }
                None => writer.write_bool(false),
            }
        }

        for method in ty.methods()? {
            self.write_generic_parameters(writer, method.generic_parameters())?;
            let signature = method.signature()?;
            match &signature.return_type {
                Some(return_type) => {
                    writer.write_bool(true);
                    writer.write_u64(self.type_id(return_type));
                }
                None => writer.write_bool(false),
            }
            writer.write_len(signature.parameters.len())?;
            for parameter in &signature.parameters {
                writer.write_string(&parameter.name)?;
                writer.write_u64(self.type_id(&parameter.parameter_type));
                write_attributes(writer, &parameter.attributes)?;
            }
            write_attributes(writer, &signature.attributes)?;
            write_attributes(writer, &signature.return_attributes)?;

            match method.il()? {
                Some(container) => {
                    writer.write_bool(true);
                    serialize_il(writer, &container)?;
                }
                None => writer.write_bool(false),
            }
        }
        Ok(())
    }

    fn write_generic_parameters(&self, writer: &mut SerializationWriter, parameters: &[TypeRef]) -> Result<()> {
        for parameter in parameters {
            self.write_type_list(writer, &parameter.interfaces()?)?;
            write_attributes(writer, &parameter.attributes()?)?;
        }
        Ok(())
    }

    fn write_type_list(&self, writer: &mut SerializationWriter, types: &[TypeRef]) -> Result<()> {
        writer.write_len(types.len())?;
        for ty in types {
            writer.write_u64(self.type_id(ty));
        }
        Ok(())
    }
}

fn dropped(ty: &TypeRef) -> Error {
    Error::invalid_operation(format!("owner of `{}` was dropped", ty.full_name()))
}

fn write_names(writer: &mut SerializationWriter, parameters: &[TypeRef]) -> Result<()> {
    writer.write_len(parameters.len())?;
    for parameter in parameters {
        writer.write_string(parameter.name())?;
    }
    Ok(())
}

fn read_names(reader: &mut SerializationReader<'_>) -> Result<Vec<String>> {
    (0..reader.read_len()?).map(|_| reader.read_string()).collect()
}

fn write_shell(writer: &mut SerializationWriter, ty: &TypeRef) -> Result<()> {
    writer.write_string(ty.namespace())?;
    writer.write_string(ty.name())?;
    writer.write_u8(ty.kind().to_u8());
    writer.write_u16(ty.modifiers().bits());
    write_names(writer, ty.generic_parameters())?;

    let methods = ty.methods()?;
    writer.write_len(methods.len())?;
    for method in &methods {
        writer.write_string(method.name())?;
        writer.write_u16(method.modifiers().bits());
        write_names(writer, method.generic_parameters())?;
    }
    Ok(())
}

fn read_shell(reader: &mut SerializationReader<'_>, builder: &NeslAssemblyBuilder) -> Result<TypeRef> {
    let namespace = reader.read_string()?;
    let name = reader.read_string()?;
    let tag = reader.read_u8()?;
    let kind = TypeKind::from_u8(tag)
        .ok_or_else(|| Error::serialization(format!("unknown type kind {}", tag)))?;
    let modifiers = Modifiers::from_bits_truncate(reader.read_u16()?);
    let generic_parameters = read_names(reader)?;
    let ty = builder.define_type(&namespace, &name, kind, modifiers, &generic_parameters)?;

    for _ in 0..reader.read_len()? {
        let method_name = reader.read_string()?;
        let method_modifiers = Modifiers::from_bits_truncate(reader.read_u16()?);
        let method_generics = read_names(reader)?;
        ty.define_method(&method_name, method_modifiers, &method_generics)?;
    }
    Ok(ty)
}

fn write_attributes(writer: &mut SerializationWriter, attributes: &[NeslAttribute]) -> Result<()> {
    writer.write_len(attributes.len())?;
    for attribute in attributes {
        writer.write_string(attribute.full_name())?;
        writer.write_u8(attribute.targets().bits());
        writer.write_bytes(attribute.bytes())?;
    }
    Ok(())
}

fn read_attributes(reader: &mut SerializationReader<'_>) -> Result<Vec<NeslAttribute>> {
    (0..reader.read_len()?)
        .map(|_| {
            let full_name = reader.read_string()?;
            let targets = AttributeTargets::from_bits_truncate(reader.read_u8()?);
            let bytes = reader.read_bytes()?;
            Ok(NeslAttribute::create(&full_name, targets, bytes))
        })
        .collect()
}

fn read_type_descriptor(reader: &mut SerializationReader<'_>) -> Result<TypeDescriptor> {
    Ok(match reader.read_u8()? {
        TYPE_LOCAL => TypeDescriptor::Local(reader.read_len()?),
        TYPE_EXTERNAL => TypeDescriptor::External {
            assembly: reader.read_string()?,
            full_name: reader.read_string()?,
        },
        TYPE_CONSTRUCTED => {
            let definition = reader.read_u64()?;
            let arguments = (0..reader.read_len()?)
                .map(|_| reader.read_u64())
                .collect::<Result<Vec<_>>>()?;
            TypeDescriptor::Constructed { definition, arguments }
        }
        TYPE_GENERIC_PARAMETER => TypeDescriptor::TypeGenericParameter {
            owner: reader.read_u64()?,
            index: reader.read_len()?,
        },
        METHOD_GENERIC_PARAMETER => TypeDescriptor::MethodGenericParameter {
            owner: reader.read_u64()?,
            index: reader.read_len()?,
        },
        other => return Err(Error::serialization(format!("unknown type descriptor {}", other))),
    })
}

fn read_method_descriptor(reader: &mut SerializationReader<'_>) -> Result<MethodDescriptor> {
    Ok(match reader.read_u8()? {
        METHOD_MEMBER => MethodDescriptor::Member {
            owner: reader.read_u64()?,
            index: reader.read_len()?,
        },
        METHOD_CONSTRUCTED => {
            let source = reader.read_u64()?;
            let arguments = (0..reader.read_len()?)
                .map(|_| reader.read_u64())
                .collect::<Result<Vec<_>>>()?;
            MethodDescriptor::Constructed { source, arguments }
        }
        other => return Err(Error::serialization(format!("unknown method descriptor {}", other))),
    })
}

/// Resolves table descriptors recursively, each at most once
struct Resolver<'a> {
    assembly: &'a Arc<NeslAssembly>,
    types: &'a [TypeRef],
    type_descriptors: &'a [TypeDescriptor],
    method_descriptors: &'a [MethodDescriptor],
    resolved_types: Vec<Option<TypeRef>>,
    resolved_methods: Vec<Option<MethodRef>>,
}

impl Resolver<'_> {
    fn resolve_type(&mut self, id: u64) -> Result<TypeRef> {
        let index = id as usize;
        if let Some(Some(existing)) = self.resolved_types.get(index) {
            return Ok(existing.clone());
        }
        let descriptor = self
            .type_descriptors
            .get(index)
            .ok_or_else(|| Error::TypeNotFound(format!("{}#{}", self.assembly.name(), id)))?;

        let ty = match descriptor {
            TypeDescriptor::Local(local) => self
                .types
                .get(*local)
                .cloned()
                .ok_or_else(|| Error::serialization(format!("local type {} out of range", local)))?,
            TypeDescriptor::External { assembly, full_name } => self
                .assembly
                .find_assembly(assembly)
                .ok_or_else(|| Error::AssemblyNotFound(assembly.clone()))?
                .get_local_type(full_name)
                .ok_or_else(|| Error::TypeNotFound(format!("{}::{}", assembly, full_name)))?,
            TypeDescriptor::Constructed { definition, arguments } => {
                let definition = self.resolve_type(*definition)?;
                let arguments = arguments
                    .iter()
                    .map(|argument| self.resolve_type(*argument))
                    .collect::<Result<Vec<_>>>()?;
                definition.make_generic(&arguments)?
            }
            TypeDescriptor::TypeGenericParameter { owner, index } => {
                let owner = self.resolve_type(*owner)?;
                owner.generic_parameters().get(*index).cloned().ok_or_else(|| {
                    Error::serialization(format!("`{}` has no generic parameter {}", owner, index))
                })?
            }
            TypeDescriptor::MethodGenericParameter { owner, index } => {
                let owner = self.resolve_method(*owner)?;
                owner.generic_parameters().get(*index).cloned().ok_or_else(|| {
                    Error::serialization(format!(
                        "`{}` has no generic parameter {}",
                        owner.full_name(),
                        index
                    ))
                })?
            }
        };

        self.resolved_types[index] = Some(ty.clone());
        Ok(ty)
    }

    fn resolve_method(&mut self, id: u64) -> Result<MethodRef> {
        let index = id as usize;
        if let Some(Some(existing)) = self.resolved_methods.get(index) {
            return Ok(existing.clone());
        }
        let descriptor = self
            .method_descriptors
            .get(index)
            .ok_or_else(|| Error::MethodNotFound(format!("{}#{}", self.assembly.name(), id)))?;

        let method = match descriptor {
            MethodDescriptor::Member { owner, index } => {
                let owner = self.resolve_type(*owner)?;
                owner.methods()?.get(*index).cloned().ok_or_else(|| {
                    Error::MethodNotFound(format!("{}#{}", owner.full_name(), index))
                })?
            }
            MethodDescriptor::Constructed { source, arguments } => {
                let source = self.resolve_method(*source)?;
                let arguments = arguments
                    .iter()
                    .map(|argument| self.resolve_type(*argument))
                    .collect::<Result<Vec<_>>>()?;
                source.make_generic(&arguments)?
            }
        };

        self.resolved_methods[index] = Some(method.clone());
        Ok(method)
    }
}

fn read_type_list(reader: &mut SerializationReader<'_>, assembly: &NeslAssembly) -> Result<Vec<TypeRef>> {
    (0..reader.read_len()?)
        .map(|_| assembly.get_type_by_id(reader.read_u64()?))
        .collect()
}

fn read_generic_parameters(
    reader: &mut SerializationReader<'_>,
    assembly: &NeslAssembly,
    parameters: &[TypeRef],
) -> Result<()> {
    for parameter in parameters {
        for constraint in read_type_list(reader, assembly)? {
            parameter.add_constraint(constraint)?;
        }
        for attribute in read_attributes(reader)? {
            parameter.add_attribute(attribute)?;
        }
    }
    Ok(())
}

fn read_body(reader: &mut SerializationReader<'_>, assembly: &Arc<NeslAssembly>, ty: &TypeRef) -> Result<()> {
    for attribute in read_attributes(reader)? {
        ty.add_attribute(attribute)?;
    }
    read_generic_parameters(reader, assembly, ty.generic_parameters())?;
    for interface in read_type_list(reader, assembly)? {
        ty.add_interface(interface)?;
    }

    for _ in 0..reader.read_len()? {
        let name = reader.read_string()?;
        let field_type = assembly.get_type_by_id(reader.read_u64()?)?;
        let modifiers = Modifiers::from_bits_truncate(reader.read_u16()?);
        let attributes = read_attributes(reader)?;
        let default_data = if reader.read_bool()? {
            Some(reader.read_bytes()?)
        } else {
            None
        };
        ty.add_field(&name, field_type, modifiers, attributes, default_data)?;
    }

    for method in ty.methods()? {
        read_generic_parameters(reader, assembly, method.generic_parameters())?;
        let return_type = if reader.read_bool()? {
            Some(assembly.get_type_by_id(reader.read_u64()?)?)
        } else {
            None
        };
        let parameters = (0..reader.read_len()?)
            .map(|_| {
                Ok(NeslParameter {
                    name: reader.read_string()?,
                    parameter_type: assembly.get_type_by_id(reader.read_u64()?)?,
                    attributes: read_attributes(reader)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let attributes = read_attributes(reader)?;
        let return_attributes = read_attributes(reader)?;
        method.set_signature(MethodSignature {
            return_type,
            parameters,
            attributes,
            return_attributes,
        })?;

        if reader.read_bool()? {
            method.set_il(Arc::new(deserialize_il(reader)?))?;
        }
    }
    Ok(())
}
