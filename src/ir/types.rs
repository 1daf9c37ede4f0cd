//! Types of the IR
//!
//! A [`NeslType`] is one of three variants: a definition declared in an
//! assembly (possibly generic), a generic parameter placeholder, or a generic
//! instantiation produced by [`NeslType::make_generic`]. Identity matters:
//! two references denote the same type only if they are the same `Arc`.

use super::assembly::NeslAssembly;
use super::attribute::NeslAttribute;
use super::field::NeslField;
use super::generics::{identity_key, owning_assembly, substitute_type, SubstitutionMap};
use super::method::NeslMethod;
use super::modifiers::Modifiers;
use crate::error::{Error, Result};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

/// Shared handle to a type
pub type TypeRef = Arc<NeslType>;
/// Shared handle to a field
pub type FieldRef = Arc<NeslField>;
/// Shared handle to a method
pub type MethodRef = Arc<NeslMethod>;

/// Declaration kind of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Value type
    Struct,
    /// Reference type
    Class,
    /// Interface
    Interface,
}

impl TypeKind {
    /// Keyword that declares this kind
    pub fn from_keyword(keyword: &str) -> Option<TypeKind> {
        match keyword {
            "struct" => Some(TypeKind::Struct),
            "class" => Some(TypeKind::Class),
            "interface" => Some(TypeKind::Interface),
            _ => None,
        }
    }

    /// Compact tag used by the binary assembly format
    pub fn to_u8(self) -> u8 {
        match self {
            TypeKind::Struct => 0,
            TypeKind::Class => 1,
            TypeKind::Interface => 2,
        }
    }

    /// Inverse of [`TypeKind::to_u8`]
    pub fn from_u8(tag: u8) -> Option<TypeKind> {
        match tag {
            0 => Some(TypeKind::Struct),
            1 => Some(TypeKind::Class),
            2 => Some(TypeKind::Interface),
            _ => None,
        }
    }
}

/// Declaration a generic parameter belongs to
#[derive(Clone)]
pub enum GenericParameterOwner {
    /// Parameter of a generic type definition
    Type(Weak<NeslType>),
    /// Parameter of a generic method definition
    Method(Weak<NeslMethod>),
}

#[derive(Default)]
struct Members {
    attributes: Vec<NeslAttribute>,
    fields: Vec<FieldRef>,
    methods: Vec<MethodRef>,
    interfaces: Vec<TypeRef>,
}

struct DefinitionData {
    generic_parameters: Vec<TypeRef>,
    members: RwLock<Members>,
    instantiations: DashMap<Vec<usize>, TypeRef>,
}

struct GenericParameterData {
    owner: GenericParameterOwner,
    index: usize,
    constraints: RwLock<Vec<TypeRef>>,
    attributes: RwLock<Vec<NeslAttribute>>,
}

struct ConstructedData {
    definition: TypeRef,
    home: Weak<NeslAssembly>,
    arguments: Vec<TypeRef>,
    substitution: SubstitutionMap,
    attributes: OnceLock<Vec<NeslAttribute>>,
    fields: OnceLock<Vec<FieldRef>>,
    methods: OnceLock<Vec<MethodRef>>,
    interfaces: OnceLock<Vec<TypeRef>>,
}

enum TypeVariant {
    Definition(DefinitionData),
    GenericParameter(GenericParameterData),
    Constructed(ConstructedData),
}

/// A type of the IR
pub struct NeslType {
    this: Weak<NeslType>,
    assembly: Weak<NeslAssembly>,
    namespace: String,
    name: String,
    full_name: String,
    kind: TypeKind,
    modifiers: Modifiers,
    variant: TypeVariant,
}

fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", namespace, name)
    }
}

/// Materializes a lazily substituted member list exactly once
fn materialize<T: Clone>(
    cell: &OnceLock<Vec<T>>,
    build: impl FnOnce() -> Result<Vec<T>>,
) -> Result<Vec<T>> {
    if let Some(existing) = cell.get() {
        return Ok(existing.clone());
    }
    let built = build()?;
    Ok(cell.get_or_init(|| built).clone())
}

impl NeslType {
    /// Creates a type definition owned by `assembly`. Generic parameter
    /// placeholders are created for `generic_parameter_names`.
    pub(crate) fn new_definition(
        assembly: &Arc<NeslAssembly>,
        namespace: &str,
        name: &str,
        kind: TypeKind,
        modifiers: Modifiers,
        generic_parameter_names: &[String],
    ) -> TypeRef {
        let assembly = Arc::downgrade(assembly);
        Arc::new_cyclic(|this: &Weak<NeslType>| {
            let generic_parameters = generic_parameter_names
                .iter()
                .enumerate()
                .map(|(index, parameter)| {
                    NeslType::new_generic_parameter(
                        assembly.clone(),
                        GenericParameterOwner::Type(this.clone()),
                        index,
                        parameter,
                    )
                })
                .collect();

            NeslType {
                this: this.clone(),
                assembly,
                namespace: namespace.to_string(),
                name: name.to_string(),
                full_name: qualify(namespace, name),
                kind,
                modifiers,
                variant: TypeVariant::Definition(DefinitionData {
                    generic_parameters,
                    members: RwLock::new(Members::default()),
                    instantiations: DashMap::new(),
                }),
            }
        })
    }

    /// Creates a generic parameter placeholder
    pub(crate) fn new_generic_parameter(
        assembly: Weak<NeslAssembly>,
        owner: GenericParameterOwner,
        index: usize,
        name: &str,
    ) -> TypeRef {
        Arc::new_cyclic(|this| NeslType {
            this: this.clone(),
            assembly,
            namespace: String::new(),
            name: name.to_string(),
            full_name: name.to_string(),
            kind: TypeKind::Struct,
            modifiers: Modifiers::NONE,
            variant: TypeVariant::GenericParameter(GenericParameterData {
                owner,
                index,
                constraints: RwLock::new(Vec::new()),
                attributes: RwLock::new(Vec::new()),
            }),
        })
    }

    fn new_constructed(definition: TypeRef, arguments: Vec<TypeRef>, home: Weak<NeslAssembly>) -> TypeRef {
        let argument_names: Vec<&str> = arguments.iter().map(|a| a.full_name()).collect();
        let joined = argument_names.join(",");
        let substitution = SubstitutionMap::from_pairs(
            definition.generic_parameters().iter().cloned().zip(arguments.iter().cloned()),
        );

        Arc::new_cyclic(|this| NeslType {
            this: this.clone(),
            assembly: definition.assembly.clone(),
            namespace: definition.namespace.clone(),
            name: format!("{}<{}>", definition.name, joined),
            full_name: format!("{}<{}>", definition.full_name, joined),
            kind: definition.kind,
            modifiers: definition.modifiers,
            variant: TypeVariant::Constructed(ConstructedData {
                definition: definition.clone(),
                home,
                arguments,
                substitution,
                attributes: OnceLock::new(),
                fields: OnceLock::new(),
                methods: OnceLock::new(),
                interfaces: OnceLock::new(),
            }),
        })
    }

    // Identity and naming

    /// Simple name; instantiations include their argument list
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace, empty for generic parameters
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Namespace-qualified name, unique within the owning assembly
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// `assembly::Full.Name`
    pub fn full_name_with_assembly(&self) -> String {
        match self.assembly() {
            Some(assembly) => format!("{}::{}", assembly.name(), self.full_name),
            None => self.full_name.clone(),
        }
    }

    /// Assembly the type (or its definition) belongs to
    pub fn assembly(&self) -> Option<Arc<NeslAssembly>> {
        self.assembly.upgrade()
    }

    /// Assembly whose lifetime bounds the type: the caching assembly for
    /// instantiations, [`NeslType::assembly`] otherwise
    pub fn home_assembly(&self) -> Option<Arc<NeslAssembly>> {
        match &self.variant {
            TypeVariant::Constructed(data) => data.home.upgrade(),
            _ => self.assembly(),
        }
    }

    /// Declaration kind
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// Declaration modifiers
    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// Whether values of this type are copied on assignment
    pub fn is_value_type(&self) -> bool {
        self.kind == TypeKind::Struct
    }

    /// Whether this is an interface
    pub fn is_interface(&self) -> bool {
        self.kind == TypeKind::Interface
    }

    /// Whether this is a placeholder of a generic declaration
    pub fn is_generic_parameter(&self) -> bool {
        matches!(self.variant, TypeVariant::GenericParameter(_))
    }

    /// Whether this is a definition with unbound generic parameters
    pub fn is_generic_definition(&self) -> bool {
        matches!(&self.variant, TypeVariant::Definition(data) if !data.generic_parameters.is_empty())
    }

    /// Whether this was produced by `make_generic`
    pub fn is_constructed(&self) -> bool {
        matches!(self.variant, TypeVariant::Constructed(_))
    }

    /// Whether no generic parameter occurs anywhere in the type
    pub fn is_fully_constructed(&self) -> bool {
        match &self.variant {
            TypeVariant::Definition(data) => data.generic_parameters.is_empty(),
            TypeVariant::GenericParameter(_) => false,
            TypeVariant::Constructed(data) => data.arguments.iter().all(|a| a.is_fully_constructed()),
        }
    }

    // Generics

    /// Generic parameters of a definition; instantiations report their definition's
    pub fn generic_parameters(&self) -> &[TypeRef] {
        match &self.variant {
            TypeVariant::Definition(data) => &data.generic_parameters,
            TypeVariant::Constructed(data) => data.definition.generic_parameters(),
            TypeVariant::GenericParameter(_) => &[],
        }
    }

    /// Type arguments of an instantiation
    pub fn generic_arguments(&self) -> &[TypeRef] {
        match &self.variant {
            TypeVariant::Constructed(data) => &data.arguments,
            _ => &[],
        }
    }

    /// Definition an instantiation was made from
    pub fn generic_definition(&self) -> Option<&TypeRef> {
        match &self.variant {
            TypeVariant::Constructed(data) => Some(&data.definition),
            _ => None,
        }
    }

    /// Parameter → argument map of an instantiation, empty otherwise
    pub fn substitution(&self) -> SubstitutionMap {
        match &self.variant {
            TypeVariant::Constructed(data) => data.substitution.clone(),
            _ => SubstitutionMap::default(),
        }
    }

    /// Owner and position of a generic parameter
    pub fn generic_parameter_position(&self) -> Option<(GenericParameterOwner, usize)> {
        match &self.variant {
            TypeVariant::GenericParameter(data) => Some((data.owner.clone(), data.index)),
            _ => None,
        }
    }

    /// Instantiates a generic definition. The same arguments always yield the
    /// same object. The instance is cached in the assembly that depends on
    /// the definition and every argument.
    pub fn make_generic(&self, arguments: &[TypeRef]) -> Result<TypeRef> {
        let data = match &self.variant {
            TypeVariant::Definition(data) => data,
            _ => {
                return Err(Error::invalid_operation(format!(
                    "`{}` is not a generic type definition",
                    self.full_name
                )))
            }
        };

        if data.generic_parameters.is_empty() || arguments.len() != data.generic_parameters.len() {
            return Err(Error::ArgumentOutOfRange {
                parameter: "arguments",
                message: format!(
                    "`{}` takes {} type arguments, {} given",
                    self.full_name,
                    data.generic_parameters.len(),
                    arguments.len()
                ),
            });
        }

        let definition = self.this.upgrade().ok_or_else(|| {
            Error::invalid_operation(format!("`{}` is being dropped", self.full_name))
        })?;

        let key: Vec<usize> = arguments.iter().map(identity_key).collect();
        let participants =
            std::iter::once(self.assembly()).chain(arguments.iter().map(|argument| argument.home_assembly()));
        let instance = match owning_assembly(participants) {
            Some(home) => home
                .instantiated_types
                .entry((identity_key(&definition), key))
                .or_insert_with(|| NeslType::new_constructed(definition, arguments.to_vec(), Arc::downgrade(&home)))
                .value()
                .clone(),
            None => data
                .instantiations
                .entry(key)
                .or_insert_with(|| NeslType::new_constructed(definition, arguments.to_vec(), self.assembly.clone()))
                .value()
                .clone(),
        };
        Ok(instance)
    }

    /// Instantiations of this definition cached in its own assembly. Those
    /// over types of a downstream assembly live in that assembly's
    /// [`NeslAssembly::instantiations`].
    pub fn instantiations(&self) -> Vec<TypeRef> {
        let data = match &self.variant {
            TypeVariant::Definition(data) => data,
            _ => return Vec::new(),
        };
        let mut instances: Vec<TypeRef> = data.instantiations.iter().map(|entry| entry.value().clone()).collect();
        if let Some(assembly) = self.assembly() {
            instances.extend(assembly.instantiations().into_iter().filter(|instance| {
                instance
                    .generic_definition()
                    .is_some_and(|definition| std::ptr::eq(Arc::as_ptr(definition), self))
            }));
        }
        instances
    }

    // Members

    /// Attributes of the type
    pub fn attributes(&self) -> Result<Vec<NeslAttribute>> {
        match &self.variant {
            TypeVariant::Definition(data) => Ok(data.members.read().attributes.clone()),
            TypeVariant::GenericParameter(data) => Ok(data.attributes.read().clone()),
            TypeVariant::Constructed(data) => {
                materialize(&data.attributes, || data.definition.attributes())
            }
        }
    }

    /// Fields in declaration order
    pub fn fields(&self) -> Result<Vec<FieldRef>> {
        match &self.variant {
            TypeVariant::Definition(data) => Ok(data.members.read().fields.clone()),
            TypeVariant::GenericParameter(_) => Err(self.placeholder_error("fields")),
            TypeVariant::Constructed(data) => materialize(&data.fields, || {
                data.definition
                    .fields()?
                    .iter()
                    .map(|field| {
                        Ok(Arc::new(NeslField::new(
                            self.this.clone(),
                            field.name(),
                            substitute_type(field.field_type(), &data.substitution)?,
                            field.modifiers(),
                            field.attributes().to_vec(),
                            field.default_data().map(<[u8]>::to_vec),
                        )))
                    })
                    .collect()
            }),
        }
    }

    /// Methods in declaration order
    pub fn methods(&self) -> Result<Vec<MethodRef>> {
        match &self.variant {
            TypeVariant::Definition(data) => Ok(data.members.read().methods.clone()),
            TypeVariant::GenericParameter(_) => Err(self.placeholder_error("methods")),
            TypeVariant::Constructed(data) => materialize(&data.methods, || {
                Ok(data
                    .definition
                    .methods()?
                    .iter()
                    .map(|method| {
                        NeslMethod::new_substituted(
                            self.this.clone(),
                            method.clone(),
                            data.substitution.clone(),
                            Vec::new(),
                        )
                    })
                    .collect())
            }),
        }
    }

    /// Implemented interfaces; the constraints of a generic parameter
    pub fn interfaces(&self) -> Result<Vec<TypeRef>> {
        match &self.variant {
            TypeVariant::Definition(data) => Ok(data.members.read().interfaces.clone()),
            TypeVariant::GenericParameter(data) => Ok(data.constraints.read().clone()),
            TypeVariant::Constructed(data) => materialize(&data.interfaces, || {
                data.definition
                    .interfaces()?
                    .iter()
                    .map(|interface| substitute_type(interface, &data.substitution))
                    .collect()
            }),
        }
    }

    /// Forces every lazily substituted member list of an instantiation
    pub fn materialize_members(&self) -> Result<()> {
        if self.is_constructed() {
            self.attributes()?;
            self.fields()?;
            self.methods()?;
            self.interfaces()?;
        }
        Ok(())
    }

    /// Field by name with its position
    pub fn get_field(&self, name: &str) -> Result<Option<(u32, FieldRef)>> {
        Ok(self
            .fields()?
            .into_iter()
            .enumerate()
            .find(|(_, field)| field.name() == name)
            .map(|(index, field)| (index as u32, field)))
    }

    /// Position of field `index` among the instance fields, and its type.
    /// IL field operands count static fields too; value layouts do not.
    pub fn instance_member(&self, index: u32) -> Result<(u32, TypeRef)> {
        let fields = self.fields()?;
        let field = fields.get(index as usize).ok_or_else(|| {
            Error::invalid_operation(format!("`{}` has no field #{}", self.full_name, index))
        })?;
        if field.is_static() {
            return Err(Error::invalid_operation(format!(
                "`{}.{}` is static",
                self.full_name,
                field.name()
            )));
        }
        let member = fields[..index as usize]
            .iter()
            .filter(|other| !other.is_static())
            .count();
        Ok((member as u32, field.field_type().clone()))
    }

    /// Methods named `name`
    pub fn get_methods(&self, name: &str) -> Result<Vec<MethodRef>> {
        Ok(self
            .methods()?
            .into_iter()
            .filter(|method| method.name() == name)
            .collect())
    }

    /// Whether `interface` (by identity) is implemented
    pub fn implements(&self, interface: &TypeRef) -> Result<bool> {
        Ok(self.interfaces()?.iter().any(|i| Arc::ptr_eq(i, interface)))
    }

    // Mutation while the assembly is being built

    fn definition_members(&self) -> Result<&RwLock<Members>> {
        match &self.variant {
            TypeVariant::Definition(data) => Ok(&data.members),
            _ => Err(Error::invalid_operation(format!(
                "`{}` is not a type definition and cannot be modified",
                self.full_name
            ))),
        }
    }

    /// Appends an attribute
    pub fn add_attribute(&self, attribute: NeslAttribute) -> Result<()> {
        match &self.variant {
            TypeVariant::GenericParameter(data) => data.attributes.write().push(attribute),
            _ => self.definition_members()?.write().attributes.push(attribute),
        }
        Ok(())
    }

    /// Appends a field; names must be unique
    pub fn add_field(
        &self,
        name: &str,
        field_type: TypeRef,
        modifiers: Modifiers,
        attributes: Vec<NeslAttribute>,
        default_data: Option<Vec<u8>>,
    ) -> Result<FieldRef> {
        let members = self.definition_members()?;
        let mut members = members.write();
        if members.fields.iter().any(|field| field.name() == name) {
            return Err(Error::invalid_operation(format!(
                "field `{}` already exists in `{}`",
                name, self.full_name
            )));
        }

        let field = Arc::new(NeslField::new(
            self.this.clone(),
            name,
            field_type,
            modifiers,
            attributes,
            default_data,
        ));
        members.fields.push(field.clone());
        Ok(field)
    }

    /// Declares a method; its signature is supplied later with
    /// [`NeslMethod::set_signature`]
    pub fn define_method(
        &self,
        name: &str,
        modifiers: Modifiers,
        generic_parameter_names: &[String],
    ) -> Result<MethodRef> {
        let members = self.definition_members()?;
        let method = NeslMethod::new_definition(
            self.this.clone(),
            self.assembly.clone(),
            name,
            modifiers,
            generic_parameter_names,
        );
        members.write().methods.push(method.clone());
        Ok(method)
    }

    /// Appends an implemented interface
    pub fn add_interface(&self, interface: TypeRef) -> Result<()> {
        self.definition_members()?.write().interfaces.push(interface);
        Ok(())
    }

    /// Appends a constraint to a generic parameter
    pub fn add_constraint(&self, constraint: TypeRef) -> Result<()> {
        match &self.variant {
            TypeVariant::GenericParameter(data) => {
                data.constraints.write().push(constraint);
                Ok(())
            }
            _ => Err(Error::invalid_operation(format!(
                "`{}` is not a generic parameter",
                self.full_name
            ))),
        }
    }

    fn placeholder_error(&self, what: &str) -> Error {
        Error::invalid_operation(format!(
            "generic parameter `{}` has no {}",
            self.full_name, what
        ))
    }
}

impl fmt::Debug for NeslType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NeslType({})", self.full_name_with_assembly())
    }
}

impl fmt::Display for NeslType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name)
    }
}
