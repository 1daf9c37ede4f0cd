//! IR integration tests: generic instantiation, substitution and typed
//! attributes read back from compiled sources

use nesl::compiler::default_library;
use nesl::ir::attribute::find;
use nesl::ir::{
    substitute_method, substitute_type, KernelAttribute, NeslOperators, PositionAttribute,
    SubstitutionMap, VertexShaderAttribute,
};
use nesl::{Error, NeslCompiler, SourceFile};
use std::sync::Arc;

#[test]
fn test_make_generic_is_memoized() {
    let library = default_library().unwrap();
    let float = library.get_type("System.Float32").unwrap();
    let uint = library.get_type("System.UInt32").unwrap();
    let vector = library.get_type("System.Vector4").unwrap();

    let first = vector.make_generic(&[float.clone()]).unwrap();
    let second = vector.make_generic(&[float.clone()]).unwrap();
    let other = vector.make_generic(&[uint]).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(!Arc::ptr_eq(&first, &other));
    assert_eq!(first.full_name(), "System.Vector4<System.Float32>");
    assert!(first.is_fully_constructed());
}

#[test]
fn test_wrong_argument_count_is_rejected() {
    let library = default_library().unwrap();
    let float = library.get_type("System.Float32").unwrap();
    let vector = library.get_type("System.Vector2").unwrap();
    assert!(matches!(
        vector.make_generic(&[]),
        Err(Error::ArgumentOutOfRange { .. })
    ));
    assert!(vector.make_generic(&[float.clone(), float.clone()]).is_err());
    assert!(float.make_generic(&[float.clone()]).is_err());
}

#[test]
fn test_substitute_type_reuses_instantiations() {
    let library = default_library().unwrap();
    let float = library.get_type("System.Float32").unwrap();
    let vector = library.get_type("System.Vector2").unwrap();
    let buffer = library.get_type("System.RwBuffer").unwrap();

    let parameter = vector.generic_parameters()[0].clone();
    let open = buffer
        .make_generic(&[vector.make_generic(&[parameter.clone()]).unwrap()])
        .unwrap();
    assert!(!open.is_fully_constructed());

    let map = SubstitutionMap::from_pairs([(parameter, float.clone())]);
    let closed = substitute_type(&open, &map).unwrap();
    let expected = buffer
        .make_generic(&[vector.make_generic(&[float]).unwrap()])
        .unwrap();
    assert!(Arc::ptr_eq(&closed, &expected));

    assert!(Arc::ptr_eq(&substitute_type(&expected, &map).unwrap(), &expected));
}

#[test]
fn test_substituted_fields_follow_arguments() {
    let library = default_library().unwrap();
    let int = library.get_type("System.Int32").unwrap();
    let int3 = library
        .get_type("System.Vector3")
        .unwrap()
        .make_generic(&[int.clone()])
        .unwrap();

    let fields = int3.fields().unwrap();
    assert_eq!(fields.len(), 3);
    assert!(fields.iter().all(|field| Arc::ptr_eq(field.field_type(), &int)));
    assert!(Arc::ptr_eq(&fields[0].parent().unwrap(), &int3));
}

#[test]
fn test_interface_method_resolves_to_scalar_operator() {
    let library = default_library().unwrap();
    let uint = library.get_type("System.UInt32").unwrap();
    let add = library.get_type("System.IAdd").unwrap();
    let parameter = library.get_type("System.Vector2").unwrap().generic_parameters()[0].clone();

    let open = add
        .make_generic(&[parameter.clone(), parameter.clone(), parameter.clone()])
        .unwrap();
    let abstract_add = open.get_methods("Add").unwrap()[0].clone();
    assert!(abstract_add.is_abstract());

    let map = SubstitutionMap::from_pairs([(parameter, uint.clone())]);
    let resolved = substitute_method(&abstract_add, &map).unwrap();
    let expected = uint.get_methods("Add").unwrap()[0].clone();
    assert!(Arc::ptr_eq(&resolved, &expected));
    assert!(resolved.is_extern());
}

#[test]
fn test_generic_method_instantiation() {
    let assembly = NeslCompiler::default()
        .compile(
            "Shaders",
            "shaders.nesl",
            &[SourceFile::new(
                "Shaders/Math.nesl",
                "using System;\n\
                 public static class Math {\n\
                     public static T Sum<T>(T a, T b) where T : IAdd<T, T, T> { return a + b; }\n\
                 }",
            )],
            &[],
        )
        .unwrap();
    let library = default_library().unwrap();
    let float = library.get_type("System.Float32").unwrap();
    let sum = assembly.get_type("Shaders.Math").unwrap().get_methods("Sum").unwrap()[0].clone();

    let first = sum.make_generic(&[float.clone()]).unwrap();
    let second = sum.make_generic(&[float.clone()]).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(first.source().unwrap(), &sum));
    assert!(Arc::ptr_eq(&first.return_type().unwrap().unwrap(), &float));
    assert!(first.il().unwrap().is_some());
}

#[test]
fn test_attributes_from_source() {
    let assembly = NeslCompiler::default()
        .compile(
            "Shaders",
            "shaders.nesl",
            &[SourceFile::new(
                "Shaders/Stages.nesl",
                "using System;\n\
                 public struct Output {\n\
                     [Position] public Vector4<float> Clip;\n\
                     [VertexShader] public static Output Vertex(Vector3<float> position) {\n\
                         Output result;\n\
                         result.Clip = VertexUtils.ObjectToClipPos(position);\n\
                         return result;\n\
                     }\n\
                 }\n\
                 public static class Compute {\n\
                     [Kernel(8, 4, 2)] public static void Main() { }\n\
                 }",
            )],
            &[],
        )
        .unwrap();

    let main = assembly.get_type("Shaders.Compute").unwrap().get_methods("Main").unwrap()[0].clone();
    let kernel = find::<KernelAttribute>(&main.attributes().unwrap()).unwrap();
    assert_eq!(kernel, KernelAttribute { x: 8, y: 4, z: 2 });

    let output = assembly.get_type("Shaders.Output").unwrap();
    let vertex = output.get_methods("Vertex").unwrap()[0].clone();
    assert!(find::<VertexShaderAttribute>(&vertex.attributes().unwrap()).is_some());
    assert!(find::<KernelAttribute>(&vertex.attributes().unwrap()).is_none());

    let (_, clip) = output.get_field("Clip").unwrap().unwrap();
    assert!(find::<PositionAttribute>(clip.attributes()).is_some());
}

#[test]
fn test_operator_names() {
    assert_eq!(NeslOperators::property_get("Length"), "'pGLength");
    assert_eq!(NeslOperators::property_set("Length"), "'pSLength");
}

#[test]
fn test_client_instantiations_are_released_with_the_client() {
    const SOURCE: &str = "using System;\n\
        public struct Particle { public float Mass; }\n\
        public static class Emitter { public static RwBuffer<Particle> Particles; }";

    let buffer = default_library().unwrap().get_type("System.RwBuffer").unwrap();
    let mut particles = Vec::new();
    for _ in 0..3 {
        let assembly = NeslCompiler::default()
            .compile("Emitter", "emitter.nesl", &[SourceFile::new("Emitter/Emitter.nesl", SOURCE)], &[])
            .unwrap();
        assert!(assembly
            .instantiations()
            .iter()
            .any(|ty| ty.full_name() == "System.RwBuffer<Emitter.Particle>"));
        particles.push(Arc::downgrade(&assembly.get_type("Emitter.Particle").unwrap()));
    }

    assert!(particles.iter().all(|particle| particle.upgrade().is_none()));
    assert!(buffer
        .instantiations()
        .iter()
        .all(|ty| !ty.full_name().contains("Emitter.Particle")));
}
