//! Assembly serialization: saved bytes load back into an equivalent
//! assembly that runs and lowers the same way

use nesl::serialization::ObjectStorage;
use nesl::{Interpreter, NeslAssembly, NeslCompiler, SourceFile, SpirVCompiler, Value};
use std::sync::Arc;

const SOURCE: &str = "using System;\n\
public struct Particle {\n\
    public Vector2<float> Position;\n\
    public Vector2<float> Velocity;\n\
    public static uint Count = 3;\n\
}\n\
public static class Physics {\n\
    public static RwBuffer<uint> Values;\n\
    public static T Twice<T>(T value) where T : IAdd<T, T, T> { return value + value; }\n\
    [Kernel(4, 1, 1)]\n\
    public static void Main() {\n\
        uint index = ComputeUtils.GlobalInvocation3.X;\n\
        if (index < Values.Length) {\n\
            Values[index] = Twice<uint>(Values[index]) + Particle.Count;\n\
        }\n\
    }\n\
}";

fn compile() -> Arc<NeslAssembly> {
    NeslCompiler::default()
        .compile(
            "Physics",
            "physics.nesl",
            &[SourceFile::new("Physics/Physics.nesl", SOURCE)],
            &[],
        )
        .unwrap()
}

fn names(assembly: &NeslAssembly) -> Vec<String> {
    assembly
        .types()
        .iter()
        .map(|ty| ty.full_name_with_assembly())
        .collect()
}

fn run(assembly: &NeslAssembly) -> Vec<Value> {
    let main = assembly
        .get_type("Physics.Physics")
        .unwrap()
        .get_methods("Main")
        .unwrap()[0]
        .clone();
    let mut interpreter = Interpreter::default();
    interpreter.bind_buffer("Physics.Physics.Values", (1..=6u32).map(Value::UInt).collect());
    interpreter.dispatch(&main, [2, 1, 1]).unwrap();
    interpreter.read_buffer("Physics.Physics.Values").unwrap()
}

#[test]
fn test_round_trip_preserves_types() {
    let original = compile();
    let loaded = NeslAssembly::load(&original.get_raw_bytes().unwrap()).unwrap();

    assert_eq!(loaded.name(), "Physics");
    assert_eq!(loaded.path(), "physics.nesl");
    assert_eq!(names(&loaded), names(&original));

    let particle = loaded.get_type("Physics.Particle").unwrap();
    let fields = particle.fields().unwrap();
    assert_eq!(fields.len(), 3);
    assert_eq!(fields[0].field_type().full_name(), "System.Vector2<System.Float32>");
    assert!(fields[2].is_static());
    assert_eq!(fields[2].default_data(), Some(&3u32.to_le_bytes()[..]));
}

#[test]
fn test_loaded_types_share_the_default_library() {
    let loaded = NeslAssembly::load(&compile().get_raw_bytes().unwrap()).unwrap();
    let library = nesl::compiler::default_library().unwrap();
    let field = loaded
        .get_type("Physics.Particle")
        .unwrap()
        .get_field("Position")
        .unwrap()
        .unwrap()
        .1;
    let float = library.get_type("System.Float32").unwrap();
    let expected = library
        .get_type("System.Vector2")
        .unwrap()
        .make_generic(&[float])
        .unwrap();
    assert!(Arc::ptr_eq(field.field_type(), &expected));
}

#[test]
fn test_loaded_kernel_runs_identically() {
    let original = compile();
    let loaded = NeslAssembly::load(&original.get_raw_bytes().unwrap()).unwrap();

    let expected: Vec<Value> = (1..=6u32).map(|value| Value::UInt(value * 2 + 3)).collect();
    assert_eq!(run(&original), expected);
    assert_eq!(run(&loaded), expected);
}

#[test]
fn test_loaded_assembly_lowers_to_the_same_module() {
    let original = compile();
    let loaded = NeslAssembly::load(&original.get_raw_bytes().unwrap()).unwrap();

    let before = SpirVCompiler::default().compile(&original).unwrap();
    let after = SpirVCompiler::default().compile(&loaded).unwrap();
    assert_eq!(before.words, after.words);
    assert_eq!(before.bindings, after.bindings);
}

#[test]
fn test_bytes_are_stable() {
    let original = compile();
    let bytes = original.get_raw_bytes().unwrap();
    let loaded = NeslAssembly::load(&bytes).unwrap();
    assert_eq!(loaded.get_raw_bytes().unwrap(), bytes);
}

#[test]
fn test_dependent_assembly_loads_through_storage() {
    let base = compile();
    let client = NeslCompiler::default()
        .compile(
            "Client",
            "client.nesl",
            &[SourceFile::new(
                "Client/Swarm.nesl",
                "using Physics;\npublic struct Swarm { public Particle Leader; }",
            )],
            &[base.clone()],
        )
        .unwrap();

    let storage = Arc::new(ObjectStorage::with_default_library().unwrap());
    let base_loaded = NeslAssembly::load_with(&base.get_raw_bytes().unwrap(), &storage).unwrap();
    let client_loaded = NeslAssembly::load_with(&client.get_raw_bytes().unwrap(), &storage).unwrap();

    let leader = client_loaded
        .get_type("Client.Swarm")
        .unwrap()
        .get_field("Leader")
        .unwrap()
        .unwrap()
        .1;
    let particle = base_loaded.get_type("Physics.Particle").unwrap();
    assert!(Arc::ptr_eq(leader.field_type(), &particle));
}

#[test]
fn test_missing_dependency_is_reported() {
    let base = compile();
    let client = NeslCompiler::default()
        .compile(
            "Client",
            "client.nesl",
            &[SourceFile::new(
                "Client/Swarm.nesl",
                "using Physics;\npublic struct Swarm { public Particle Leader; }",
            )],
            &[base],
        )
        .unwrap();
    let error = NeslAssembly::load(&client.get_raw_bytes().unwrap()).unwrap_err();
    assert!(matches!(error, nesl::Error::AssemblyNotFound(name) if name == "Physics"));
}

#[test]
fn test_truncated_bytes_fail() {
    let bytes = compile().get_raw_bytes().unwrap();
    assert!(NeslAssembly::load(&bytes[..bytes.len() / 2]).is_err());
}

const UTILITIES: &str = "public static class Util {\n\
    public static T Keep<T>(T value) { T kept = value; return kept; }\n\
}";

#[test]
fn test_client_instantiation_leaves_the_library_unchanged() {
    let library = NeslCompiler::default()
        .compile(
            "Lib",
            "lib.nesl",
            &[SourceFile::new("Lib/Util.nesl", UTILITIES)],
            &[],
        )
        .unwrap();
    let saved = library.get_raw_bytes().unwrap();

    let client = NeslCompiler::default()
        .compile(
            "App",
            "app.nesl",
            &[SourceFile::new("App/Item.nesl", "public struct Item { public uint Id; }")],
            &[library.clone()],
        )
        .unwrap();
    let item = client.get_type("App.Item").unwrap();
    let keep = library.get_type("Lib.Util").unwrap().get_methods("Keep").unwrap()[0]
        .make_generic(&[item])
        .unwrap();
    let listing = keep.il().unwrap().unwrap().disassemble().unwrap();
    assert!(listing.contains("DefVariable %1, App.Item"));

    assert_eq!(library.get_raw_bytes().unwrap(), saved);
    let reloaded = NeslAssembly::load(&library.get_raw_bytes().unwrap()).unwrap();
    assert_eq!(reloaded.name(), "Lib");
}
