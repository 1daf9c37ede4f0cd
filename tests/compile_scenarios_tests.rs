//! End-to-end compilation scenarios: a vertex/fragment pair lowered to
//! SPIR-V, and diagnostics reported for broken sources

use nesl::ir::attribute::find;
use nesl::ir::{FragmentShaderAttribute, VertexShaderAttribute};
use nesl::spirv::ShaderStage;
use nesl::{CompilationErrorType, Error, NeslCompiler, Severity, SourceFile, SpirVCompiler};

const SHADER: &str = "using System;\n\
public struct VertexData {\n\
    [Position] public Vector4<float> ClipPosition;\n\
    public Vector3<float> Color;\n\
    [VertexShader]\n\
    public static VertexData Vertex(Vector3<float> position, Vector3<float> color) {\n\
        VertexData output;\n\
        output.ClipPosition = VertexUtils.ObjectToClipPos(position);\n\
        output.Color = color;\n\
        return output;\n\
    }\n\
}\n\
public struct FragmentData {\n\
    public Vector4<float> Color;\n\
    [FragmentShader]\n\
    public static FragmentData Fragment(VertexData input) {\n\
        FragmentData output;\n\
        output.Color = new Vector4<float>(input.Color.X, input.Color.Y, input.Color.Z, 1.0f);\n\
        return output;\n\
    }\n\
}\n";

fn compile_shader() -> std::sync::Arc<nesl::NeslAssembly> {
    NeslCompiler::default()
        .compile(
            "Shaders",
            "shaders.nesl",
            &[SourceFile::new("Shaders/Shader.nesl", SHADER)],
            &[],
        )
        .unwrap()
}

#[test]
fn test_vertex_fragment_assembly_shape() {
    let assembly = compile_shader();
    let types = assembly.types();
    assert_eq!(types.len(), 2);

    let vertex_data = assembly.get_type("Shaders.VertexData").unwrap();
    let fragment_data = assembly.get_type("Shaders.FragmentData").unwrap();
    assert!(vertex_data.is_value_type());
    assert_eq!(vertex_data.methods().unwrap().len(), 1);
    assert_eq!(fragment_data.methods().unwrap().len(), 1);
    assert_eq!(vertex_data.fields().unwrap().len(), 2);

    let vertex = vertex_data.get_methods("Vertex").unwrap()[0].clone();
    let fragment = fragment_data.get_methods("Fragment").unwrap()[0].clone();
    assert!(find::<VertexShaderAttribute>(&vertex.attributes().unwrap()).is_some());
    assert!(find::<FragmentShaderAttribute>(&fragment.attributes().unwrap()).is_some());
    assert!(vertex.il().unwrap().is_some());
}

#[test]
fn test_vertex_fragment_entry_points() {
    let result = SpirVCompiler::default().compile(&compile_shader()).unwrap();
    assert_eq!(result.entry_points.len(), 2);

    let vertex = result.entry_point("Vertex").unwrap();
    assert_eq!(vertex.stage, ShaderStage::Vertex);
    assert_eq!(vertex.method, "Shaders.VertexData.Vertex");
    assert_eq!(vertex.local_size, None);
    let inputs: Vec<(&str, Option<u32>)> = vertex
        .inputs
        .iter()
        .map(|slot| (slot.name.as_str(), slot.location))
        .collect();
    assert_eq!(inputs, vec![("position", Some(0)), ("color", Some(1))]);
    let outputs: Vec<(&str, Option<u32>)> = vertex
        .outputs
        .iter()
        .map(|slot| (slot.name.as_str(), slot.location))
        .collect();
    assert_eq!(
        outputs,
        vec![("return.ClipPosition", None), ("return.Color", Some(0))]
    );

    let fragment = result.entry_point("Fragment").unwrap();
    assert_eq!(fragment.stage, ShaderStage::Fragment);
    assert_eq!(fragment.inputs[0].location, None);
    assert_eq!(fragment.inputs[1].name, "input.Color");
    assert_eq!(fragment.inputs[1].location, Some(0));
    assert_eq!(fragment.outputs.len(), 1);
    assert_eq!(fragment.outputs[0].name, "return.Color");

    assert_eq!(result.push_constants.len(), 1);
    assert_eq!(result.push_constants[0].name, "ObjectToClip");
    assert_eq!((result.push_constants[0].offset, result.push_constants[0].size), (0, 64));
    assert!(result.bindings.is_empty());
}

#[test]
fn test_diagnostics_serialize_to_json() {
    let outcome = NeslCompiler::default()
        .try_compile(
            "Shaders",
            "shaders.nesl",
            &[SourceFile::new(
                "Shaders/Broken.nesl",
                "public struct Broken { public Missing Value; }",
            )],
            &[],
        )
        .unwrap();
    assert!(!outcome.succeeded());

    let json = serde_json::to_value(&outcome.diagnostics).unwrap();
    let first = &json[0];
    assert_eq!(first["path"], "Shaders/Broken.nesl");
    assert_eq!(first["line"], 1);
    assert_eq!(first["error_type"], "TypeNotFound");

    let back: Vec<nesl::CompilationError> = serde_json::from_value(json).unwrap();
    assert_eq!(back, outcome.diagnostics);
}

#[test]
fn test_compile_error_lists_every_diagnostic() {
    let error = NeslCompiler::default()
        .compile(
            "Shaders",
            "shaders.nesl",
            &[
                SourceFile::new("Shaders/A.nesl", "public struct A { public Missing Value; }"),
                SourceFile::new("Shaders/B.nesl", "public struct B { public Unknown Value; }"),
            ],
            &[],
        )
        .unwrap_err();
    match error {
        Error::Compilation { diagnostics } => {
            assert_eq!(diagnostics.len(), 2);
            assert!(diagnostics
                .iter()
                .all(|diagnostic| diagnostic.error_type == CompilationErrorType::TypeNotFound));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_unused_using_is_only_a_warning() {
    let outcome = NeslCompiler::default()
        .try_compile(
            "Shaders",
            "shaders.nesl",
            &[SourceFile::new(
                "Shaders/Plain.nesl",
                "using System;\npublic struct Plain { public uint Value; }",
            )],
            &[],
        )
        .unwrap();
    assert!(outcome.succeeded());
    assert!(outcome
        .diagnostics
        .iter()
        .all(|diagnostic| diagnostic.severity() == Severity::Warning));
}

#[test]
fn test_duplicate_type_is_reported() {
    let outcome = NeslCompiler::default()
        .try_compile(
            "Shaders",
            "shaders.nesl",
            &[
                SourceFile::new("Shaders/A.nesl", "public struct Same { }"),
                SourceFile::new("Shaders/B.nesl", "public struct Same { }"),
            ],
            &[],
        )
        .unwrap();
    assert!(!outcome.succeeded());
    assert!(outcome
        .diagnostics
        .iter()
        .any(|diagnostic| diagnostic.error_type == CompilationErrorType::TypeAlreadyExists));
}

#[test]
fn test_missing_return_type_name_is_reported() {
    let outcome = NeslCompiler::default()
        .try_compile(
            "Shaders",
            "shaders.nesl",
            &[SourceFile::new(
                "Shaders/Bad.nesl",
                "public static class Bad { public static uint Get() { return missing; } }",
            )],
            &[],
        )
        .unwrap();
    assert!(!outcome.succeeded());
    assert_eq!(outcome.diagnostics[0].error_type, CompilationErrorType::VariableNotFound);
}
