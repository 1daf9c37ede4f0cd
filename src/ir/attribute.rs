//! Attributes attached to IR items
//!
//! An attribute is a full name, the kind of item it sits on and an opaque
//! payload. Strongly typed views are obtained with [`NeslAttribute::cast`] and
//! [`NeslAttribute::try_cast`].

use crate::error::{Error, Result};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

/// Items an attribute may be applied to
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AttributeTargets(u8);

impl AttributeTargets {
    /// Type declarations
    pub const TYPE: AttributeTargets = AttributeTargets(1);
    /// Fields
    pub const FIELD: AttributeTargets = AttributeTargets(1 << 1);
    /// Methods
    pub const METHOD: AttributeTargets = AttributeTargets(1 << 2);
    /// Method parameters
    pub const PARAMETER: AttributeTargets = AttributeTargets(1 << 3);
    /// Method return values
    pub const RETURN_VALUE: AttributeTargets = AttributeTargets(1 << 4);
    /// Generic type parameters
    pub const GENERIC_TYPE_PARAMETER: AttributeTargets = AttributeTargets(1 << 5);
    /// Everything
    pub const ALL: AttributeTargets = AttributeTargets(0b11_1111);

    /// Raw bits
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Rebuilds a mask from raw bits, dropping unknown ones
    pub const fn from_bits_truncate(bits: u8) -> Self {
        AttributeTargets(bits & Self::ALL.0)
    }

    /// Whether every bit of `other` is set
    pub const fn contains(self, other: AttributeTargets) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no bit is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for AttributeTargets {
    type Output = AttributeTargets;

    fn bitor(self, rhs: AttributeTargets) -> AttributeTargets {
        AttributeTargets(self.0 | rhs.0)
    }
}

impl BitOrAssign for AttributeTargets {
    fn bitor_assign(&mut self, rhs: AttributeTargets) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for AttributeTargets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AttributeTargets({:#08b})", self.0)
    }
}

/// Serialized attribute: full name, targets and raw payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeslAttribute {
    full_name: Arc<str>,
    targets: AttributeTargets,
    bytes: Arc<[u8]>,
}

impl NeslAttribute {
    /// Creates an attribute from its parts
    pub fn create(full_name: &str, targets: AttributeTargets, bytes: Vec<u8>) -> Self {
        NeslAttribute {
            full_name: Arc::from(full_name),
            targets,
            bytes: Arc::from(bytes),
        }
    }

    /// Full name of the attribute type
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Items the attribute is applied to
    pub fn targets(&self) -> AttributeTargets {
        self.targets
    }

    /// Raw payload
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether this attribute has the full name of `T`
    pub fn is<T: TypedAttribute>(&self) -> bool {
        self.full_name() == T::FULL_NAME
    }

    /// Strongly typed view, or `None` if the shape does not match
    pub fn try_cast<T: TypedAttribute>(&self) -> Option<T> {
        let valid = self.is::<T>()
            && !self.targets.is_empty()
            && T::TARGETS.contains(self.targets)
            && self.bytes.len() == T::SIZE;
        if valid {
            Some(T::read(&self.bytes))
        } else {
            None
        }
    }

    /// Strongly typed view; fails if the shape does not match
    pub fn cast<T: TypedAttribute>(&self) -> Result<T> {
        self.try_cast().ok_or_else(|| {
            Error::invalid_operation(format!(
                "attribute `{}` ({:?}, {} bytes) is not a valid `{}`",
                self.full_name,
                self.targets,
                self.bytes.len(),
                T::FULL_NAME
            ))
        })
    }
}

/// Attribute with a fixed payload shape
pub trait TypedAttribute: Sized {
    /// Full name of the attribute type
    const FULL_NAME: &'static str;
    /// Items the attribute may be applied to
    const TARGETS: AttributeTargets;
    /// Payload length in bytes
    const SIZE: usize;

    /// Decodes a payload of exactly `SIZE` bytes
    fn read(bytes: &[u8]) -> Self;

    /// Encodes the payload
    fn write(&self, out: &mut Vec<u8>);

    /// Serialized form applied to `target`
    fn to_attribute(&self, target: AttributeTargets) -> NeslAttribute {
        let mut bytes = Vec::with_capacity(Self::SIZE);
        self.write(&mut bytes);
        NeslAttribute::create(Self::FULL_NAME, target, bytes)
    }
}

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(word)
}

/// Marks a compute kernel and carries its work group size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelAttribute {
    /// Local size X
    pub x: u32,
    /// Local size Y
    pub y: u32,
    /// Local size Z
    pub z: u32,
}

impl TypedAttribute for KernelAttribute {
    const FULL_NAME: &'static str = "System.KernelAttribute";
    const TARGETS: AttributeTargets = AttributeTargets::METHOD;
    const SIZE: usize = 12;

    fn read(bytes: &[u8]) -> Self {
        KernelAttribute {
            x: u32_at(bytes, 0),
            y: u32_at(bytes, 4),
            z: u32_at(bytes, 8),
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.x.to_le_bytes());
        out.extend_from_slice(&self.y.to_le_bytes());
        out.extend_from_slice(&self.z.to_le_bytes());
    }
}

macro_rules! marker_attribute {
    ($(#[$doc:meta])* $name:ident, $full_name:literal, $targets:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name;

        impl TypedAttribute for $name {
            const FULL_NAME: &'static str = $full_name;
            const TARGETS: AttributeTargets = $targets;
            const SIZE: usize = 0;

            fn read(_bytes: &[u8]) -> Self {
                $name
            }

            fn write(&self, _out: &mut Vec<u8>) {}
        }
    };
}

marker_attribute!(
    /// Marks a vertex stage entry point
    VertexShaderAttribute,
    "System.VertexShaderAttribute",
    AttributeTargets::METHOD
);

marker_attribute!(
    /// Marks a fragment stage entry point
    FragmentShaderAttribute,
    "System.FragmentShaderAttribute",
    AttributeTargets::METHOD
);

marker_attribute!(
    /// Vertex output field holding the clip-space position
    PositionAttribute,
    "System.PositionAttribute",
    AttributeTargets::FIELD
);

/// First attribute of type `T` in `attributes`
pub fn find<T: TypedAttribute>(attributes: &[NeslAttribute]) -> Option<T> {
    attributes.iter().find_map(|attribute| attribute.try_cast::<T>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_cast() {
        let attribute = KernelAttribute { x: 8, y: 4, z: 1 }.to_attribute(AttributeTargets::METHOD);
        assert_eq!(attribute.bytes().len(), 12);
        assert_eq!(attribute.cast::<KernelAttribute>().unwrap(), KernelAttribute { x: 8, y: 4, z: 1 });
    }

    #[test]
    fn test_other_attribute_is_not_a_kernel() {
        let bytes: Vec<u8> = [8u32, 4, 1].iter().flat_map(|value| value.to_le_bytes()).collect();
        let attribute = NeslAttribute::create("System.Other", AttributeTargets::METHOD, bytes);
        assert!(attribute.try_cast::<KernelAttribute>().is_none());
        assert!(matches!(attribute.cast::<KernelAttribute>(), Err(Error::InvalidOperation(_))));
        assert!(find::<KernelAttribute>(&[attribute]).is_none());
    }

    #[test]
    fn test_wrong_target_is_rejected() {
        let attribute = NeslAttribute::create("System.KernelAttribute", AttributeTargets::FIELD, vec![0; 12]);
        assert!(attribute.try_cast::<KernelAttribute>().is_none());
    }

    #[test]
    fn test_wrong_length_is_rejected() {
        let attribute = NeslAttribute::create("System.KernelAttribute", AttributeTargets::METHOD, vec![0; 8]);
        assert!(attribute.try_cast::<KernelAttribute>().is_none());
        assert!(matches!(attribute.cast::<KernelAttribute>(), Err(Error::InvalidOperation(_))));
    }
}
