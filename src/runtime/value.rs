use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::ir::{representation_of, resource_of, Representation, ScalarKind, TypeRef};

/// Runtime value representation
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Result of a void call; also the content of an unbound resource slot
    Void,
    /// `bool`
    Bool(bool),
    /// `uint`
    UInt(u32),
    /// `int`
    Int(i32),
    /// `float`
    Float(f32),
    /// Vector components or instance fields, in declaration order
    Composite(Vec<Value>),
    /// Storage buffer or image bound to a static field
    Resource(Resource),
}

/// Host-visible storage behind an `RwBuffer<T>` or `Texture2D<T>` field
#[derive(Debug, Clone)]
pub struct Resource {
    name: Arc<str>,
    /// Row length of a texture; `None` for buffers
    width: Option<u32>,
    data: Arc<Mutex<Vec<Value>>>,
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl Resource {
    pub(crate) fn buffer(name: &str, values: Vec<Value>) -> Self {
        Resource {
            name: name.into(),
            width: None,
            data: Arc::new(Mutex::new(values)),
        }
    }

    pub(crate) fn texture(name: &str, width: u32, texels: Vec<Value>) -> Self {
        Resource {
            name: name.into(),
            width: Some(width),
            data: Arc::new(Mutex::new(texels)),
        }
    }

    /// Binding name, `Namespace.Type.Field`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> Vec<Value> {
        self.data.lock().clone()
    }

    /// Element count
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    /// Whether the resource holds no elements
    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }

    fn offset(&self, index: &Value) -> Result<usize> {
        let offset = match (self.width, index) {
            (None, index) => index.as_uint()? as usize,
            (Some(width), Value::Composite(position)) if position.len() == 2 => {
                let x = position[0].as_uint()?;
                let y = position[1].as_uint()?;
                if x >= width {
                    return Err(Error::runtime(format!(
                        "texel ({}, {}) outside of `{}` with width {}",
                        x, y, self.name, width
                    )));
                }
                y as usize * width as usize + x as usize
            }
            (Some(_), other) => {
                return Err(Error::runtime(format!(
                    "expected a texel position, got {}",
                    other.type_name()
                )))
            }
        };
        Ok(offset)
    }

    /// Element at `index`: a `uint` for buffers, a `Vector2<uint>` for textures
    pub fn get(&self, index: &Value) -> Result<Value> {
        let offset = self.offset(index)?;
        let data = self.data.lock();
        data.get(offset).cloned().ok_or_else(|| {
            Error::runtime(format!(
                "index {} out of bounds of `{}` with length {}",
                offset,
                self.name,
                data.len()
            ))
        })
    }

    /// Overwrites the element at `index`
    pub fn set(&self, index: &Value, value: Value) -> Result<()> {
        let offset = self.offset(index)?;
        let mut data = self.data.lock();
        let length = data.len();
        match data.get_mut(offset) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(Error::runtime(format!(
                "index {} out of bounds of `{}` with length {}",
                offset, self.name, length
            ))),
        }
    }
}

impl Value {
    /// Zero value of `ty`: `false`, `0`, `0.0`, or a composite of zeros.
    /// Resource types start out as [`Value::Void`] until a static field
    /// is loaded into them.
    pub fn zero(ty: &TypeRef) -> Result<Value> {
        if resource_of(ty).is_some() {
            return Ok(Value::Void);
        }
        match representation_of(ty) {
            Some(Representation::Scalar(kind)) => Ok(Value::zero_scalar(kind)),
            Some(Representation::Vector { element, size }) => {
                Ok(Value::Composite(vec![Value::zero_scalar(element); size as usize]))
            }
            None => {
                if ty.is_generic_parameter() || ty.is_generic_definition() {
                    return Err(Error::runtime(format!("`{}` has no runtime representation", ty)));
                }
                let mut members = Vec::new();
                for field in ty.fields()? {
                    if !field.is_static() {
                        members.push(Value::zero(field.field_type())?);
                    }
                }
                Ok(Value::Composite(members))
            }
        }
    }

    fn zero_scalar(kind: ScalarKind) -> Value {
        match kind {
            ScalarKind::Boolean => Value::Bool(false),
            ScalarKind::UnsignedInteger => Value::UInt(0),
            ScalarKind::SignedInteger => Value::Int(0),
            ScalarKind::Float => Value::Float(0.0),
        }
    }

    /// Value encoded in a field default: 4 little-endian bytes for numeric
    /// scalars, one byte for `bool`
    pub fn from_default_data(ty: &TypeRef, bytes: &[u8]) -> Option<Value> {
        let kind = match representation_of(ty)? {
            Representation::Scalar(kind) => kind,
            Representation::Vector { .. } => return None,
        };
        if kind == ScalarKind::Boolean {
            return match bytes {
                [flag] => Some(Value::Bool(*flag != 0)),
                _ => None,
            };
        }
        let bits = u32::from_le_bytes(bytes.try_into().ok()?);
        Some(match kind {
            ScalarKind::UnsignedInteger => Value::UInt(bits),
            ScalarKind::SignedInteger => Value::Int(bits as i32),
            _ => Value::Float(f32::from_bits(bits)),
        })
    }

    /// Short name of the variant for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Bool(_) => "bool",
            Value::UInt(_) => "uint",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Composite(_) => "composite",
            Value::Resource(_) => "resource",
        }
    }

    fn mismatch(&self, expected: &str) -> Error {
        Error::runtime(format!("expected {}, got {}", expected, self.type_name()))
    }

    /// The `bool` payload
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(value) => Ok(*value),
            _ => Err(self.mismatch("bool")),
        }
    }

    /// The `uint` payload
    pub fn as_uint(&self) -> Result<u32> {
        match self {
            Value::UInt(value) => Ok(*value),
            _ => Err(self.mismatch("uint")),
        }
    }

    /// The `int` payload
    pub fn as_int(&self) -> Result<i32> {
        match self {
            Value::Int(value) => Ok(*value),
            _ => Err(self.mismatch("int")),
        }
    }

    /// The `float` payload
    pub fn as_float(&self) -> Result<f32> {
        match self {
            Value::Float(value) => Ok(*value),
            _ => Err(self.mismatch("float")),
        }
    }

    /// Members of a composite
    pub fn as_composite(&self) -> Result<&[Value]> {
        match self {
            Value::Composite(members) => Ok(members),
            _ => Err(self.mismatch("composite")),
        }
    }

    /// Mutable members of a composite
    pub fn as_composite_mut(&mut self) -> Result<&mut Vec<Value>> {
        match self {
            Value::Composite(members) => Ok(members),
            _ => Err(self.mismatch("composite")),
        }
    }

    /// The bound resource
    pub fn as_resource(&self) -> Result<&Resource> {
        match self {
            Value::Resource(resource) => Ok(resource),
            Value::Void => Err(Error::runtime("resource used before it was bound")),
            _ => Err(self.mismatch("resource")),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::UInt(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::Bool(value) => write!(f, "{}", value),
            Value::UInt(value) => write!(f, "{}u", value),
            Value::Int(value) => write!(f, "{}", value),
            Value::Float(value) => write!(f, "{:?}f", value),
            Value::Composite(members) => {
                let members: Vec<String> = members.iter().map(ToString::to_string).collect();
                write!(f, "({})", members.join(", "))
            }
            Value::Resource(resource) => write!(f, "<{}>", resource.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::default_library;

    #[test]
    fn test_zero_of_vector() {
        let library = default_library().unwrap();
        let float = library.get_type("System.Float32").unwrap();
        let float3 = library
            .get_type("System.Vector3")
            .unwrap()
            .make_generic(&[float])
            .unwrap();
        assert_eq!(
            Value::zero(&float3).unwrap(),
            Value::Composite(vec![Value::Float(0.0); 3])
        );
    }

    #[test]
    fn test_default_data() {
        let library = default_library().unwrap();
        let int = library.get_type("System.Int32").unwrap();
        let boolean = library.get_type("System.Boolean").unwrap();
        assert_eq!(
            Value::from_default_data(&int, &(-7i32).to_le_bytes()),
            Some(Value::Int(-7))
        );
        assert_eq!(Value::from_default_data(&boolean, &[1]), Some(Value::Bool(true)));
        assert_eq!(Value::from_default_data(&int, &[1, 2]), None);
    }

    #[test]
    fn test_texture_offsets() {
        let texture = Resource::texture("Test.Image", 2, (0..4u32).map(Value::UInt).collect());
        let position = Value::Composite(vec![Value::UInt(1), Value::UInt(1)]);
        assert_eq!(texture.get(&position).unwrap(), Value::UInt(3));

        let outside = Value::Composite(vec![Value::UInt(2), Value::UInt(0)]);
        assert!(texture.get(&outside).is_err());
    }

    #[test]
    fn test_buffer_bounds() {
        let buffer = Resource::buffer("Test.Data", vec![Value::Float(1.0)]);
        buffer.set(&Value::UInt(0), Value::Float(2.0)).unwrap();
        assert_eq!(buffer.snapshot(), vec![Value::Float(2.0)]);
        assert!(buffer.get(&Value::UInt(1)).is_err());
    }

    #[test]
    fn test_display() {
        let value = Value::Composite(vec![Value::UInt(1), Value::Float(0.5), Value::Bool(true)]);
        assert_eq!(value.to_string(), "(1u, 0.5f, true)");
    }
}
