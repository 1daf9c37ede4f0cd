//! Built-in value representations
//!
//! Lowering strategies for arithmetic depend on whether a type is one of the
//! built-in scalars or vectors. The classification is a table keyed by the
//! canonical full name of the type (or of its generic definition).

use super::types::NeslType;
use lazy_static::lazy_static;
use std::collections::HashMap;

/// Scalar classes with distinct arithmetic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// `System.Boolean`
    Boolean,
    /// `System.UInt32`
    UnsignedInteger,
    /// `System.Int32`
    SignedInteger,
    /// `System.Float32`
    Float,
}

impl ScalarKind {
    /// Whether arithmetic operators apply
    pub fn is_numeric(self) -> bool {
        !matches!(self, ScalarKind::Boolean)
    }
}

/// How a built-in type is represented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Representation {
    /// One scalar
    Scalar(ScalarKind),
    /// `size` scalars of the same kind
    Vector {
        /// Component kind
        element: ScalarKind,
        /// Component count
        size: u32,
    },
}

impl Representation {
    /// Scalar kind of the type or of its components
    pub fn scalar(self) -> ScalarKind {
        match self {
            Representation::Scalar(kind) => kind,
            Representation::Vector { element, .. } => element,
        }
    }
}

/// Full name of the 32-bit unsigned integer type
pub const UINT32: &str = "System.UInt32";
/// Full name of the 32-bit signed integer type
pub const INT32: &str = "System.Int32";
/// Full name of the 32-bit float type
pub const FLOAT32: &str = "System.Float32";
/// Full name of the boolean type
pub const BOOLEAN: &str = "System.Boolean";

/// Full name of the storage buffer definition
pub const RW_BUFFER: &str = "System.RwBuffer";
/// Full name of the storage image definition
pub const TEXTURE_2D: &str = "System.Texture2D";

/// Full name of the compute built-in accessors
pub const COMPUTE_UTILS: &str = "System.ComputeUtils";
/// Full name of the vertex built-in accessors
pub const VERTEX_UTILS: &str = "System.VertexUtils";

/// Descriptor-bound types with no value representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// `RwBuffer<T>`
    Buffer,
    /// `Texture2D<T>`
    Texture2D,
}

lazy_static! {
    static ref SCALARS: HashMap<&'static str, ScalarKind> = {
        let mut table = HashMap::new();
        table.insert(BOOLEAN, ScalarKind::Boolean);
        table.insert(UINT32, ScalarKind::UnsignedInteger);
        table.insert(INT32, ScalarKind::SignedInteger);
        table.insert(FLOAT32, ScalarKind::Float);
        table
    };
    static ref VECTORS: HashMap<&'static str, u32> = {
        let mut table = HashMap::new();
        table.insert("System.Vector2", 2);
        table.insert("System.Vector3", 3);
        table.insert("System.Vector4", 4);
        table
    };
}

/// Representation of `ty`, or `None` if it is not a built-in value type
pub fn representation_of(ty: &NeslType) -> Option<Representation> {
    if let Some(kind) = SCALARS.get(ty.full_name()) {
        return Some(Representation::Scalar(*kind));
    }

    let definition = ty.generic_definition()?;
    let size = *VECTORS.get(definition.full_name())?;
    match representation_of(ty.generic_arguments().first()?)? {
        Representation::Scalar(element) => Some(Representation::Vector { element, size }),
        Representation::Vector { .. } => None,
    }
}

/// Scalar kind of `ty` if it is a numeric scalar or vector
pub fn numeric_kind_of(ty: &NeslType) -> Option<ScalarKind> {
    representation_of(ty)
        .map(Representation::scalar)
        .filter(|kind| kind.is_numeric())
}

/// Resource kind of an instantiated `RwBuffer<T>` or `Texture2D<T>`
pub fn resource_of(ty: &NeslType) -> Option<ResourceKind> {
    match ty.generic_definition()?.full_name() {
        RW_BUFFER => Some(ResourceKind::Buffer),
        TEXTURE_2D => Some(ResourceKind::Texture2D),
        _ => None,
    }
}

/// Component count of a built-in vector definition such as `System.Vector3`
pub fn vector_size_of_definition(full_name: &str) -> Option<u32> {
    VECTORS.get(full_name).copied()
}
