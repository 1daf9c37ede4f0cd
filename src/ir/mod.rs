//! Typed IR object model
//!
//! ```text
//! NeslAssembly ──owns──▶ NeslType ──owns──▶ NeslField / NeslMethod ──▶ IlContainer
//!       │                    │
//!       └─ dependencies      └─ make_generic ──▶ cached instantiations
//! ```
//!
//! Types and methods are shared as `Arc`s and compared by identity.

pub mod assembly;
pub mod attribute;
pub mod field;
pub mod generics;
pub mod method;
pub mod modifiers;
pub mod representation;
pub mod types;

pub use assembly::{NeslAssembly, NeslAssemblyBuilder};
pub use attribute::{
    AttributeTargets, FragmentShaderAttribute, KernelAttribute, NeslAttribute, PositionAttribute,
    TypedAttribute, VertexShaderAttribute,
};
pub use field::NeslField;
pub use generics::{identity_key, substitute_method, substitute_type, SubstitutionMap};
pub use method::{MethodSignature, NeslMethod, NeslOperators, NeslParameter};
pub use modifiers::Modifiers;
pub use representation::{representation_of, resource_of, Representation, ResourceKind, ScalarKind};
pub use types::{FieldRef, GenericParameterOwner, MethodRef, NeslType, TypeKind, TypeRef};
