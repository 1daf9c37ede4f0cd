//! Methods of the IR

use super::assembly::NeslAssembly;
use super::attribute::NeslAttribute;
use super::generics::{identity_key, owning_assembly, substitute_il, substitute_type, SubstitutionMap};
use super::modifiers::Modifiers;
use super::types::{GenericParameterOwner, MethodRef, NeslType, TypeRef};
use crate::error::{Error, Result};
use crate::il::IlContainer;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

/// Compiler-synthesized method names
pub struct NeslOperators;

impl NeslOperators {
    /// Prefix of property getters (`'pGName`)
    pub const PROPERTY_GET: &'static str = "'pG";
    /// Prefix of property setters (`'pSName`)
    pub const PROPERTY_SET: &'static str = "'pS";
    /// Indexer getter
    pub const INDEXER_GET: &'static str = "'iG";
    /// Indexer setter
    pub const INDEXER_SET: &'static str = "'iS";
    /// Constructor
    pub const CONSTRUCTOR: &'static str = "'ctor";

    /// Getter name of property `name`
    pub fn property_get(name: &str) -> String {
        format!("{}{}", Self::PROPERTY_GET, name)
    }

    /// Setter name of property `name`
    pub fn property_set(name: &str) -> String {
        format!("{}{}", Self::PROPERTY_SET, name)
    }
}

/// Parameter of a method signature
#[derive(Debug, Clone)]
pub struct NeslParameter {
    /// Parameter name
    pub name: String,
    /// Parameter type
    pub parameter_type: TypeRef,
    /// Attributes of the parameter
    pub attributes: Vec<NeslAttribute>,
}

impl NeslParameter {
    /// Parameter without attributes
    pub fn new(name: impl Into<String>, parameter_type: TypeRef) -> Self {
        NeslParameter {
            name: name.into(),
            parameter_type,
            attributes: Vec::new(),
        }
    }
}

/// Signature and attributes of a method
#[derive(Debug, Clone, Default)]
pub struct MethodSignature {
    /// `None` for `void`
    pub return_type: Option<TypeRef>,
    /// Declared parameters, `this` excluded
    pub parameters: Vec<NeslParameter>,
    /// Attributes of the method
    pub attributes: Vec<NeslAttribute>,
    /// Attributes of the return value
    pub return_attributes: Vec<NeslAttribute>,
}

impl MethodSignature {
    fn substitute(&self, map: &SubstitutionMap) -> Result<MethodSignature> {
        let return_type = match &self.return_type {
            Some(ty) => Some(substitute_type(ty, map)?),
            None => None,
        };
        let parameters = self
            .parameters
            .iter()
            .map(|parameter| {
                Ok(NeslParameter {
                    name: parameter.name.clone(),
                    parameter_type: substitute_type(&parameter.parameter_type, map)?,
                    attributes: parameter.attributes.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(MethodSignature {
            return_type,
            parameters,
            attributes: self.attributes.clone(),
            return_attributes: self.return_attributes.clone(),
        })
    }
}

enum MethodVariant {
    Definition {
        signature: RwLock<MethodSignature>,
        il: RwLock<Option<Arc<IlContainer>>>,
    },
    Substituted {
        source: MethodRef,
        substitution: SubstitutionMap,
        generic_arguments: Vec<TypeRef>,
        signature: OnceLock<MethodSignature>,
        il: OnceLock<Option<Arc<IlContainer>>>,
    },
}

/// A method of the IR
pub struct NeslMethod {
    this: Weak<NeslMethod>,
    owner: Weak<NeslType>,
    name: String,
    modifiers: Modifiers,
    generic_parameters: Vec<TypeRef>,
    instantiations: DashMap<Vec<usize>, MethodRef>,
    variant: MethodVariant,
}

impl NeslMethod {
    pub(crate) fn new_definition(
        owner: Weak<NeslType>,
        assembly: Weak<NeslAssembly>,
        name: &str,
        modifiers: Modifiers,
        generic_parameter_names: &[String],
    ) -> MethodRef {
        Arc::new_cyclic(|this: &Weak<NeslMethod>| {
            let generic_parameters = generic_parameter_names
                .iter()
                .enumerate()
                .map(|(index, parameter)| {
                    NeslType::new_generic_parameter(
                        assembly.clone(),
                        GenericParameterOwner::Method(this.clone()),
                        index,
                        parameter,
                    )
                })
                .collect();

            NeslMethod {
                this: this.clone(),
                owner,
                name: name.to_string(),
                modifiers,
                generic_parameters,
                instantiations: DashMap::new(),
                variant: MethodVariant::Definition {
                    signature: RwLock::new(MethodSignature::default()),
                    il: RwLock::new(None),
                },
            }
        })
    }

    /// Member of an instantiated type (`generic_arguments` empty) or an
    /// instantiated generic method.
    pub(crate) fn new_substituted(
        owner: Weak<NeslType>,
        source: MethodRef,
        substitution: SubstitutionMap,
        generic_arguments: Vec<TypeRef>,
    ) -> MethodRef {
        let generic_parameters = if generic_arguments.is_empty() {
            source.generic_parameters.clone()
        } else {
            Vec::new()
        };

        Arc::new_cyclic(|this| NeslMethod {
            this: this.clone(),
            owner,
            name: source.name.clone(),
            modifiers: source.modifiers,
            generic_parameters,
            instantiations: DashMap::new(),
            variant: MethodVariant::Substituted {
                source,
                substitution,
                generic_arguments,
                signature: OnceLock::new(),
                il: OnceLock::new(),
            },
        })
    }

    /// Method name, possibly a synthesized [`NeslOperators`] name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declaring type
    pub fn owner(&self) -> Result<TypeRef> {
        self.owner
            .upgrade()
            .ok_or_else(|| Error::invalid_operation(format!("owner of `{}` was dropped", self.name)))
    }

    /// Declaration modifiers
    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// Whether the method has no `this`
    pub fn is_static(&self) -> bool {
        self.modifiers.contains(Modifiers::STATIC)
    }

    /// Whether the method has no body by declaration
    pub fn is_abstract(&self) -> bool {
        self.modifiers.contains(Modifiers::ABSTRACT)
    }

    /// Whether the backend supplies the body
    pub fn is_extern(&self) -> bool {
        self.modifiers.contains(Modifiers::EXTERN)
    }

    /// Unbound generic parameters
    pub fn generic_parameters(&self) -> &[TypeRef] {
        &self.generic_parameters
    }

    /// Method-level type arguments of an instantiated generic method
    pub fn generic_arguments(&self) -> &[TypeRef] {
        match &self.variant {
            MethodVariant::Substituted { generic_arguments, .. } => generic_arguments,
            MethodVariant::Definition { .. } => &[],
        }
    }

    /// Method this one was substituted from
    pub fn source(&self) -> Option<&MethodRef> {
        match &self.variant {
            MethodVariant::Substituted { source, .. } => Some(source),
            MethodVariant::Definition { .. } => None,
        }
    }

    /// The declaration this method ultimately derives from
    pub fn definition(&self) -> Result<MethodRef> {
        match self.source() {
            Some(source) => source.definition(),
            None => self.this.upgrade().ok_or_else(|| {
                Error::invalid_operation(format!("`{}` is being dropped", self.name))
            }),
        }
    }

    /// Generic substitution applied to the source, empty for definitions
    pub fn substitution(&self) -> SubstitutionMap {
        match &self.variant {
            MethodVariant::Substituted { substitution, .. } => substitution.clone(),
            MethodVariant::Definition { .. } => SubstitutionMap::default(),
        }
    }

    /// `Owner.Full.Name.Method<Args>`
    pub fn full_name(&self) -> String {
        let owner = self
            .owner
            .upgrade()
            .map(|owner| owner.full_name().to_string())
            .unwrap_or_default();
        let arguments = self.generic_arguments();
        if arguments.is_empty() {
            format!("{}.{}", owner, self.name)
        } else {
            let names: Vec<&str> = arguments.iter().map(|a| a.full_name()).collect();
            format!("{}.{}<{}>", owner, self.name, names.join(","))
        }
    }

    /// Signature and attributes
    pub fn signature(&self) -> Result<MethodSignature> {
        match &self.variant {
            MethodVariant::Definition { signature, .. } => Ok(signature.read().clone()),
            MethodVariant::Substituted {
                source,
                substitution,
                signature,
                ..
            } => {
                if let Some(existing) = signature.get() {
                    return Ok(existing.clone());
                }
                let built = source.signature()?.substitute(substitution)?;
                Ok(signature.get_or_init(|| built).clone())
            }
        }
    }

    /// Return type, `None` for `void`
    pub fn return_type(&self) -> Result<Option<TypeRef>> {
        Ok(self.signature()?.return_type)
    }

    /// Declared parameter types, `this` excluded
    pub fn parameter_types(&self) -> Result<Vec<TypeRef>> {
        Ok(self
            .signature()?
            .parameters
            .into_iter()
            .map(|parameter| parameter.parameter_type)
            .collect())
    }

    /// Types of IL variables `0..n`: `this` first for instance methods
    pub fn il_parameter_types(&self) -> Result<Vec<TypeRef>> {
        let mut types = Vec::new();
        if !self.is_static() {
            types.push(self.owner()?);
        }
        types.extend(self.parameter_types()?);
        Ok(types)
    }

    /// Attributes of the method
    pub fn attributes(&self) -> Result<Vec<NeslAttribute>> {
        Ok(self.signature()?.attributes)
    }

    /// Compiled body; `None` for abstract and backend-provided methods
    pub fn il(&self) -> Result<Option<Arc<IlContainer>>> {
        match &self.variant {
            MethodVariant::Definition { il, .. } => Ok(il.read().clone()),
            MethodVariant::Substituted {
                source,
                substitution,
                il,
                ..
            } => {
                if let Some(existing) = il.get() {
                    return Ok(existing.clone());
                }
                let built = match source.il()? {
                    Some(container) => Some(substitute_il(&container, substitution)?),
                    None => None,
                };
                Ok(il.get_or_init(|| built).clone())
            }
        }
    }

    /// Sets signature and attributes of a definition
    pub fn set_signature(&self, new_signature: MethodSignature) -> Result<()> {
        match &self.variant {
            MethodVariant::Definition { signature, .. } => {
                *signature.write() = new_signature;
                Ok(())
            }
            MethodVariant::Substituted { .. } => Err(self.substituted_error()),
        }
    }

    /// Sets the compiled body of a definition
    pub fn set_il(&self, container: Arc<IlContainer>) -> Result<()> {
        match &self.variant {
            MethodVariant::Definition { il, .. } => {
                *il.write() = Some(container);
                Ok(())
            }
            MethodVariant::Substituted { .. } => Err(self.substituted_error()),
        }
    }

    /// Instantiates a generic method. The owning type's own parameters must
    /// already be bound; the same arguments always yield the same object.
    pub fn make_generic(&self, arguments: &[TypeRef]) -> Result<MethodRef> {
        if self.generic_parameters.is_empty() || arguments.len() != self.generic_parameters.len() {
            return Err(Error::ArgumentOutOfRange {
                parameter: "arguments",
                message: format!(
                    "`{}` takes {} type arguments, {} given",
                    self.full_name(),
                    self.generic_parameters.len(),
                    arguments.len()
                ),
            });
        }

        let owner = self.owner()?;
        if owner.is_generic_definition() {
            return Err(Error::invalid_operation(format!(
                "generic parameters of `{}` must be bound before those of `{}`",
                owner.full_name(),
                self.name
            )));
        }

        let source = self.this.upgrade().ok_or_else(|| {
            Error::invalid_operation(format!("`{}` is being dropped", self.name))
        })?;

        let build = || {
            let substitution = self.substitution().extended(
                self.generic_parameters.iter().cloned().zip(arguments.iter().cloned()),
            );
            NeslMethod::new_substituted(self.owner.clone(), source.clone(), substitution, arguments.to_vec())
        };

        let key: Vec<usize> = arguments.iter().map(identity_key).collect();
        let participants =
            std::iter::once(owner.home_assembly()).chain(arguments.iter().map(|argument| argument.home_assembly()));
        let instance = match owning_assembly(participants) {
            Some(home) => home
                .instantiated_methods
                .entry((identity_key(&source), key))
                .or_insert_with(build)
                .value()
                .clone(),
            None => self.instantiations.entry(key).or_insert_with(build).value().clone(),
        };
        Ok(instance)
    }

    fn substituted_error(&self) -> Error {
        Error::invalid_operation(format!(
            "`{}` is a generic instantiation and cannot be modified",
            self.full_name()
        ))
    }
}

impl fmt::Debug for NeslMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NeslMethod({})", self.full_name())
    }
}
