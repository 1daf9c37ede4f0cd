//! Assemblies: named type collections with dependencies
//!
//! Besides its declared types, every assembly keeps an append-only reference
//! table per item kind. The position in that table is the compact local id
//! the IL stores instead of names. The tables may name types and methods of
//! dependencies as well as generic instantiations.
//!
//! Instantiations whose arguments come from an assembly are cached in that
//! assembly rather than on the generic definition, so they are released
//! together with the assembly that asked for them.

use super::generics::identity_key;
use super::modifiers::Modifiers;
use super::types::{MethodRef, NeslType, TypeKind, TypeRef};
use crate::error::{Error, Result};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

/// Append-only identity → id table
pub(crate) struct IdTable<T> {
    entries: Vec<Arc<T>>,
    ids: HashMap<usize, u64>,
}

impl<T> Default for IdTable<T> {
    fn default() -> Self {
        IdTable {
            entries: Vec::new(),
            ids: HashMap::new(),
        }
    }
}

impl<T> IdTable<T> {
    fn get_or_insert(&mut self, item: &Arc<T>) -> u64 {
        let key = identity_key(item);
        if let Some(id) = self.ids.get(&key) {
            return *id;
        }
        let id = self.entries.len() as u64;
        self.entries.push(item.clone());
        self.ids.insert(key, id);
        id
    }

    fn get(&self, id: u64) -> Option<Arc<T>> {
        usize::try_from(id).ok().and_then(|index| self.entries.get(index).cloned())
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Compiled unit of NESL code
pub struct NeslAssembly {
    this: Weak<NeslAssembly>,
    name: String,
    path: String,
    dependencies: Vec<Arc<NeslAssembly>>,
    types: RwLock<Vec<TypeRef>>,
    types_by_name: RwLock<HashMap<String, TypeRef>>,
    type_ids: RwLock<IdTable<NeslType>>,
    method_ids: RwLock<IdTable<super::NeslMethod>>,
    pub(crate) instantiated_types: DashMap<InstantiationKey, TypeRef>,
    pub(crate) instantiated_methods: DashMap<InstantiationKey, MethodRef>,
}

/// Definition identity plus argument identities
pub(crate) type InstantiationKey = (usize, Vec<usize>);

impl NeslAssembly {
    pub(crate) fn new(name: &str, path: &str, dependencies: Vec<Arc<NeslAssembly>>) -> Arc<Self> {
        Arc::new_cyclic(|this| NeslAssembly {
            this: this.clone(),
            name: name.to_string(),
            path: path.to_string(),
            dependencies,
            types: RwLock::new(Vec::new()),
            types_by_name: RwLock::new(HashMap::new()),
            type_ids: RwLock::new(IdTable::default()),
            method_ids: RwLock::new(IdTable::default()),
            instantiated_types: DashMap::new(),
            instantiated_methods: DashMap::new(),
        })
    }

    /// Assembly name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path the assembly was compiled from
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Direct dependencies
    pub fn dependencies(&self) -> &[Arc<NeslAssembly>] {
        &self.dependencies
    }

    /// Declared types in declaration order
    pub fn types(&self) -> Vec<TypeRef> {
        self.types.read().clone()
    }

    /// Looks a type up by full name, locally first and then through the
    /// dependencies. `assembly::Full.Name` restricts the search to one assembly.
    pub fn get_type(&self, full_name: &str) -> Option<TypeRef> {
        if let Some((assembly, name)) = full_name.split_once("::") {
            return self
                .find_assembly(assembly)
                .and_then(|assembly| assembly.get_local_type(name));
        }

        self.get_local_type(full_name).or_else(|| {
            self.dependencies
                .iter()
                .find_map(|dependency| dependency.get_type(full_name))
        })
    }

    /// Type declared in this assembly
    pub fn get_local_type(&self, full_name: &str) -> Option<TypeRef> {
        self.types_by_name.read().get(full_name).cloned()
    }

    /// This assembly or a transitive dependency named `name`
    pub fn find_assembly(&self, name: &str) -> Option<Arc<NeslAssembly>> {
        if self.name == name {
            return self.this.upgrade();
        }
        self.dependencies
            .iter()
            .find_map(|dependency| dependency.find_assembly(name))
    }

    /// Whether `other` is this assembly or one of its transitive dependencies
    pub fn depends_on(&self, other: &NeslAssembly) -> bool {
        std::ptr::eq(self, other)
            || self
                .dependencies
                .iter()
                .any(|dependency| dependency.depends_on(other))
    }

    /// Generic type instantiations owned by this assembly
    pub fn instantiations(&self) -> Vec<TypeRef> {
        self.instantiated_types
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Whether any namespace of this assembly or its dependencies equals
    /// or starts with `namespace`
    pub fn has_namespace(&self, namespace: &str) -> bool {
        let prefix = format!("{}.", namespace);
        self.types.read().iter().any(|ty| {
            ty.namespace() == namespace || ty.namespace().starts_with(&prefix)
        }) || self
            .dependencies
            .iter()
            .any(|dependency| dependency.has_namespace(namespace))
    }

    /// Compact id of `ty` relative to this assembly
    pub fn get_local_type_id(&self, ty: &TypeRef) -> u64 {
        self.type_ids.write().get_or_insert(ty)
    }

    /// Inverse of [`NeslAssembly::get_local_type_id`]
    pub fn get_type_by_id(&self, id: u64) -> Result<TypeRef> {
        self.type_ids
            .read()
            .get(id)
            .ok_or_else(|| Error::TypeNotFound(format!("{}#{}", self.name, id)))
    }

    /// Compact id of `method` relative to this assembly
    pub fn get_local_method_id(&self, method: &MethodRef) -> u64 {
        self.method_ids.write().get_or_insert(method)
    }

    /// Inverse of [`NeslAssembly::get_local_method_id`]
    pub fn get_method_by_id(&self, id: u64) -> Result<MethodRef> {
        self.method_ids
            .read()
            .get(id)
            .ok_or_else(|| Error::MethodNotFound(format!("{}#{}", self.name, id)))
    }

    pub(crate) fn type_table_len(&self) -> usize {
        self.type_ids.read().len()
    }

    pub(crate) fn method_table_len(&self) -> usize {
        self.method_ids.read().len()
    }

    /// Declares a type; full names must be unique
    pub(crate) fn define_type(
        &self,
        namespace: &str,
        name: &str,
        kind: TypeKind,
        modifiers: Modifiers,
        generic_parameter_names: &[String],
    ) -> Result<TypeRef> {
        let this = self
            .this
            .upgrade()
            .ok_or_else(|| Error::invalid_operation("assembly is being dropped"))?;
        let ty = NeslType::new_definition(
            &this,
            namespace,
            name,
            kind,
            modifiers,
            generic_parameter_names,
        );

        let mut by_name = self.types_by_name.write();
        if by_name.contains_key(ty.full_name()) {
            return Err(Error::invalid_operation(format!(
                "type `{}` already exists in `{}`",
                ty.full_name(),
                self.name
            )));
        }
        by_name.insert(ty.full_name().to_string(), ty.clone());
        self.types.write().push(ty.clone());
        Ok(ty)
    }
}

impl fmt::Debug for NeslAssembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NeslAssembly")
            .field("name", &self.name)
            .field("types", &self.types.read().len())
            .field(
                "dependencies",
                &self.dependencies.iter().map(|d| d.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Mutable view of an assembly while it is being built
pub struct NeslAssemblyBuilder {
    assembly: Arc<NeslAssembly>,
}

impl NeslAssemblyBuilder {
    /// Starts an empty assembly
    pub fn new(name: &str, path: &str, dependencies: Vec<Arc<NeslAssembly>>) -> Self {
        NeslAssemblyBuilder {
            assembly: NeslAssembly::new(name, path, dependencies),
        }
    }

    /// Declares a type; fails if the full name is taken
    pub fn define_type(
        &self,
        namespace: &str,
        name: &str,
        kind: TypeKind,
        modifiers: Modifiers,
        generic_parameter_names: &[String],
    ) -> Result<TypeRef> {
        self.assembly
            .define_type(namespace, name, kind, modifiers, generic_parameter_names)
    }

    /// Shared handle to the assembly under construction
    pub fn assembly(&self) -> &Arc<NeslAssembly> {
        &self.assembly
    }

    /// Ends construction
    pub fn finish(self) -> Arc<NeslAssembly> {
        self.assembly
    }
}

impl Deref for NeslAssemblyBuilder {
    type Target = NeslAssembly;

    fn deref(&self) -> &NeslAssembly {
        &self.assembly
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_through_dependencies() {
        let core = NeslAssemblyBuilder::new("Core", "", Vec::new());
        core.define_type("Core", "Value", TypeKind::Struct, Modifiers::PUBLIC, &[])
            .unwrap();
        let core = core.finish();

        let app = NeslAssemblyBuilder::new("App", "", vec![core.clone()]);
        app.define_type("App", "Shader", TypeKind::Struct, Modifiers::PUBLIC, &[])
            .unwrap();
        let app = app.finish();

        assert!(app.get_type("App.Shader").is_some());
        assert!(app.get_type("Core.Value").is_some());
        assert!(app.get_type("Core::Core.Value").is_some());
        assert!(app.get_type("App::Core.Value").is_none());
        assert_eq!(
            app.get_type("Core.Value").unwrap().full_name_with_assembly(),
            "Core::Core.Value"
        );
    }

    #[test]
    fn test_depends_on_is_transitive() {
        let core = NeslAssemblyBuilder::new("Core", "", Vec::new()).finish();
        let lib = NeslAssemblyBuilder::new("Lib", "", vec![core.clone()]).finish();
        let app = NeslAssemblyBuilder::new("App", "", vec![lib.clone()]).finish();

        assert!(app.depends_on(&core));
        assert!(app.depends_on(&app));
        assert!(!core.depends_on(&app));
    }

    #[test]
    fn test_duplicate_type_is_rejected() {
        let builder = NeslAssemblyBuilder::new("A", "", Vec::new());
        builder.define_type("A", "T", TypeKind::Struct, Modifiers::NONE, &[]).unwrap();
        assert!(builder.define_type("A", "T", TypeKind::Class, Modifiers::NONE, &[]).is_err());
    }

    #[test]
    fn test_local_ids_are_stable() {
        let builder = NeslAssemblyBuilder::new("A", "", Vec::new());
        let first = builder.define_type("A", "X", TypeKind::Struct, Modifiers::NONE, &[]).unwrap();
        let second = builder.define_type("A", "Y", TypeKind::Struct, Modifiers::NONE, &[]).unwrap();

        let first_id = builder.get_local_type_id(&first);
        let second_id = builder.get_local_type_id(&second);
        assert_ne!(first_id, second_id);
        assert_eq!(builder.get_local_type_id(&first), first_id);
        assert!(Arc::ptr_eq(&builder.get_type_by_id(second_id).unwrap(), &second));
        assert!(builder.get_type_by_id(99).is_err());
    }
}
