//! The built-in `System` assembly
//!
//! Every compilation depends on it implicitly. It declares the scalar and
//! vector types, the operator interfaces the body parser resolves `+ - * / %
//! **` through, the attribute types and the backend-provided utility types.
//! None of its methods has an IL body: the SPIR-V backend and the interpreter
//! supply them as intrinsics.

use crate::error::Result;
use crate::ir::{
    MethodRef, MethodSignature, Modifiers, NeslAssembly, NeslAssemblyBuilder, NeslOperators,
    NeslParameter, TypeKind, TypeRef,
};
use lazy_static::lazy_static;
use std::sync::Arc;

/// Name of the built-in assembly
pub const DEFAULT_LIBRARY_NAME: &str = "System";

const NAMESPACE: &str = "System";

lazy_static! {
    static ref DEFAULT_LIBRARY: Result<Arc<NeslAssembly>> = build();
}

/// The shared built-in assembly, built on first use
pub fn default_library() -> Result<Arc<NeslAssembly>> {
    DEFAULT_LIBRARY.clone()
}

const BINARY_OPERATORS: [(&str, &str); 7] = [
    ("IAdd", "Add"),
    ("ISubtract", "Subtract"),
    ("IMultiply", "Multiply"),
    ("IDivide", "Divide"),
    ("IModulo", "Modulo"),
    ("IRemainder", "Remainder"),
    ("IPower", "Power"),
];

fn static_extern() -> Modifiers {
    Modifiers::PUBLIC | Modifiers::STATIC | Modifiers::EXTERN
}

fn instance_extern() -> Modifiers {
    Modifiers::PUBLIC | Modifiers::EXTERN
}

struct LibraryBuilder {
    builder: NeslAssemblyBuilder,
}

impl LibraryBuilder {
    fn define(&self, name: &str, kind: TypeKind, generic_parameters: &[&str]) -> Result<TypeRef> {
        let names: Vec<String> = generic_parameters.iter().map(|name| name.to_string()).collect();
        self.builder
            .define_type(NAMESPACE, name, kind, Modifiers::PUBLIC, &names)
    }

    fn method(
        &self,
        owner: &TypeRef,
        name: &str,
        modifiers: Modifiers,
        return_type: Option<TypeRef>,
        parameters: &[(&str, TypeRef)],
    ) -> Result<MethodRef> {
        let method = owner.define_method(name, modifiers, &[])?;
        method.set_signature(MethodSignature {
            return_type,
            parameters: parameters
                .iter()
                .map(|(name, ty)| NeslParameter::new(*name, ty.clone()))
                .collect(),
            ..MethodSignature::default()
        })?;
        Ok(method)
    }

    /// `I<Op><TLeft, TRight, TResult>` with `static abstract TResult Op(TLeft, TRight)`
    fn binary_interface(&self, name: &str, method: &str) -> Result<TypeRef> {
        let interface = self.define(name, TypeKind::Interface, &["TLeft", "TRight", "TResult"])?;
        let parameters = interface.generic_parameters().to_vec();
        self.method(
            &interface,
            method,
            Modifiers::PUBLIC | Modifiers::STATIC | Modifiers::ABSTRACT,
            Some(parameters[2].clone()),
            &[("left", parameters[0].clone()), ("right", parameters[1].clone())],
        )?;
        Ok(interface)
    }

    /// Implements `operators` on `ty` with extern static methods over `ty`
    fn implement_operators(
        &self,
        ty: &TypeRef,
        operators: &[(TypeRef, &str)],
        negate: Option<&TypeRef>,
    ) -> Result<()> {
        for (interface, method) in operators {
            ty.add_interface(interface.make_generic(&[ty.clone(), ty.clone(), ty.clone()])?)?;
            self.method(
                ty,
                method,
                static_extern(),
                Some(ty.clone()),
                &[("left", ty.clone()), ("right", ty.clone())],
            )?;
        }
        if let Some(negate) = negate {
            ty.add_interface(negate.make_generic(&[ty.clone(), ty.clone()])?)?;
            self.method(ty, "Negate", static_extern(), Some(ty.clone()), &[("value", ty.clone())])?;
        }
        Ok(())
    }

    fn attribute(&self, name: &str, fields: &[&str], uint: &TypeRef) -> Result<TypeRef> {
        let attribute = self.define(name, TypeKind::Class, &[])?;
        for field in fields {
            attribute.add_field(field, uint.clone(), Modifiers::PUBLIC, Vec::new(), None)?;
        }
        Ok(attribute)
    }
}

fn build() -> Result<Arc<NeslAssembly>> {
    let library = LibraryBuilder {
        builder: NeslAssemblyBuilder::new(DEFAULT_LIBRARY_NAME, "", Vec::new()),
    };

    library.define("Boolean", TypeKind::Struct, &[])?;
    let uint = library.define("UInt32", TypeKind::Struct, &[])?;
    let int = library.define("Int32", TypeKind::Struct, &[])?;
    let float = library.define("Float32", TypeKind::Struct, &[])?;

    let mut binary = Vec::with_capacity(BINARY_OPERATORS.len());
    for (interface, method) in BINARY_OPERATORS {
        binary.push((library.binary_interface(interface, method)?, method));
    }
    let negate = library.define("INegate", TypeKind::Interface, &["TValue", "TResult"])?;
    {
        let parameters = negate.generic_parameters().to_vec();
        library.method(
            &negate,
            "Negate",
            Modifiers::PUBLIC | Modifiers::STATIC | Modifiers::ABSTRACT,
            Some(parameters[1].clone()),
            &[("value", parameters[0].clone())],
        )?;
    }

    // Add .. Remainder; Power is float only
    let integer_operators = &binary[..6];
    library.implement_operators(&uint, integer_operators, None)?;
    library.implement_operators(&int, integer_operators, Some(&negate))?;
    library.implement_operators(&float, &binary, Some(&negate))?;

    let mut vectors = Vec::new();
    for (name, components) in [
        ("Vector2", &["X", "Y"][..]),
        ("Vector3", &["X", "Y", "Z"][..]),
        ("Vector4", &["X", "Y", "Z", "W"][..]),
    ] {
        let vector = library.define(name, TypeKind::Struct, &["T"])?;
        let element = vector.generic_parameters()[0].clone();
        let this = vector.make_generic(&[element.clone()])?;
        for component in components {
            vector.add_field(component, element.clone(), Modifiers::PUBLIC, Vec::new(), None)?;
        }
        let parameters: Vec<(String, TypeRef)> = components
            .iter()
            .map(|component| (component.to_lowercase(), element.clone()))
            .collect();
        let parameters: Vec<(&str, TypeRef)> = parameters
            .iter()
            .map(|(name, ty)| (name.as_str(), ty.clone()))
            .collect();
        library.method(
            &vector,
            NeslOperators::CONSTRUCTOR,
            static_extern(),
            Some(this.clone()),
            &parameters,
        )?;

        for (interface, method) in &binary[..4] {
            vector.add_interface(interface.make_generic(&[this.clone(), this.clone(), this.clone()])?)?;
            library.method(
                &vector,
                method,
                static_extern(),
                Some(this.clone()),
                &[("left", this.clone()), ("right", this.clone())],
            )?;
        }
        vector.add_interface(negate.make_generic(&[this.clone(), this.clone()])?)?;
        library.method(&vector, "Negate", static_extern(), Some(this.clone()), &[("value", this)])?;
        vectors.push(vector);
    }

    let uint3 = vectors[1].make_generic(&[uint.clone()])?;
    let uint2 = vectors[0].make_generic(&[uint.clone()])?;
    let float3 = vectors[1].make_generic(&[float.clone()])?;
    let float4 = vectors[2].make_generic(&[float.clone()])?;

    let compute = library.define("ComputeUtils", TypeKind::Class, &[])?;
    for property in ["GlobalInvocation3", "LocalInvocation3", "WorkGroup3"] {
        library.method(
            &compute,
            &NeslOperators::property_get(property),
            static_extern(),
            Some(uint3.clone()),
            &[],
        )?;
    }

    let vertex = library.define("VertexUtils", TypeKind::Class, &[])?;
    library.method(
        &vertex,
        "ObjectToClipPos",
        static_extern(),
        Some(float4),
        &[("position", float3)],
    )?;
    library.method(
        &vertex,
        &NeslOperators::property_get("Index"),
        static_extern(),
        Some(uint.clone()),
        &[],
    )?;

    let buffer = library.define("RwBuffer", TypeKind::Class, &["T"])?;
    {
        let element = buffer.generic_parameters()[0].clone();
        library.method(
            &buffer,
            NeslOperators::INDEXER_GET,
            instance_extern(),
            Some(element.clone()),
            &[("index", uint.clone())],
        )?;
        library.method(
            &buffer,
            NeslOperators::INDEXER_SET,
            instance_extern(),
            None,
            &[("index", uint.clone()), ("value", element)],
        )?;
        library.method(
            &buffer,
            &NeslOperators::property_get("Length"),
            instance_extern(),
            Some(uint.clone()),
            &[],
        )?;
    }

    let texture = library.define("Texture2D", TypeKind::Class, &["T"])?;
    {
        let element = texture.generic_parameters()[0].clone();
        library.method(
            &texture,
            NeslOperators::INDEXER_GET,
            instance_extern(),
            Some(element.clone()),
            &[("position", uint2.clone())],
        )?;
        library.method(
            &texture,
            NeslOperators::INDEXER_SET,
            instance_extern(),
            None,
            &[("position", uint2), ("value", element)],
        )?;
    }

    library.attribute("KernelAttribute", &["X", "Y", "Z"], &uint)?;
    library.attribute("VertexShaderAttribute", &[], &uint)?;
    library.attribute("FragmentShaderAttribute", &[], &uint)?;
    library.attribute("PositionAttribute", &[], &uint)?;

    Ok(library.builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::representation::{FLOAT32, UINT32};

    #[test]
    fn test_library_is_shared() {
        let first = default_library().unwrap();
        let second = default_library().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.name(), DEFAULT_LIBRARY_NAME);
    }

    #[test]
    fn test_scalar_operators() {
        let library = default_library().unwrap();
        let uint = library.get_type(UINT32).unwrap();
        let add = library.get_type("System.IAdd").unwrap();
        let expected = add.make_generic(&[uint.clone(), uint.clone(), uint.clone()]).unwrap();
        assert!(uint.implements(&expected).unwrap());
        assert_eq!(uint.get_methods("Modulo").unwrap().len(), 1);
        assert!(uint.get_methods("Negate").unwrap().is_empty());

        let float = library.get_type(FLOAT32).unwrap();
        assert_eq!(float.get_methods("Power").unwrap().len(), 1);
    }

    #[test]
    fn test_vector_members() {
        let library = default_library().unwrap();
        let vector = library.get_type("System.Vector3").unwrap();
        let float = library.get_type(FLOAT32).unwrap();
        let float3 = vector.make_generic(&[float.clone()]).unwrap();

        let (index, field) = float3.get_field("Z").unwrap().unwrap();
        assert_eq!(index, 2);
        assert!(Arc::ptr_eq(field.field_type(), &float));

        let constructor = &float3.get_methods(NeslOperators::CONSTRUCTOR).unwrap()[0];
        assert!(Arc::ptr_eq(&constructor.return_type().unwrap().unwrap(), &float3));
        assert_eq!(constructor.parameter_types().unwrap().len(), 3);
    }

    #[test]
    fn test_buffer_indexer() {
        let library = default_library().unwrap();
        let buffer = library.get_type("System.RwBuffer").unwrap();
        let uint = library.get_type(UINT32).unwrap();
        let uint_buffer = buffer.make_generic(&[uint.clone()]).unwrap();
        let getter = &uint_buffer.get_methods(NeslOperators::INDEXER_GET).unwrap()[0];
        assert!(!getter.is_static());
        assert!(Arc::ptr_eq(&getter.return_type().unwrap().unwrap(), &uint));
    }
}
