use super::attribute::NeslAttribute;
use super::modifiers::Modifiers;
use super::types::{NeslType, TypeRef};
use std::fmt;
use std::sync::Weak;

/// Field of a type
pub struct NeslField {
    parent: Weak<NeslType>,
    name: String,
    field_type: TypeRef,
    modifiers: Modifiers,
    attributes: Vec<NeslAttribute>,
    default_data: Option<Vec<u8>>,
}

impl NeslField {
    pub(crate) fn new(
        parent: Weak<NeslType>,
        name: &str,
        field_type: TypeRef,
        modifiers: Modifiers,
        attributes: Vec<NeslAttribute>,
        default_data: Option<Vec<u8>>,
    ) -> Self {
        NeslField {
            parent,
            name: name.to_string(),
            field_type,
            modifiers,
            attributes,
            default_data,
        }
    }

    /// Field name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declaring type
    pub fn parent(&self) -> Option<TypeRef> {
        self.parent.upgrade()
    }

    /// Type of the stored value
    pub fn field_type(&self) -> &TypeRef {
        &self.field_type
    }

    /// Declaration modifiers
    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// Whether the field belongs to the type rather than to instances
    pub fn is_static(&self) -> bool {
        self.modifiers.contains(Modifiers::STATIC)
    }

    /// Attributes of the field
    pub fn attributes(&self) -> &[NeslAttribute] {
        &self.attributes
    }

    /// Raw little-endian initial value
    pub fn default_data(&self) -> Option<&[u8]> {
        self.default_data.as_deref()
    }
}

impl fmt::Debug for NeslField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NeslField({}: {})", self.name, self.field_type.full_name())
    }
}
