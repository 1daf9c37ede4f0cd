//! SPIR-V modules parsed back with rspirv and checked for the decorations
//! and layout a Vulkan host relies on

use nesl::spirv::{DescriptorKind, ShaderStage, SpirVCompilationResult};
use nesl::{NeslCompiler, SourceFile, SpirVCompiler};
use rspirv::dr::{load_words, Module, Operand};
use rspirv::spirv::{BuiltIn, Decoration, ExecutionModel, ImageFormat, Op, StorageClass, MAGIC_NUMBER};

fn lower(file: &str, source: &str) -> SpirVCompilationResult {
    let assembly = NeslCompiler::default()
        .compile("Shaders", "shaders.nesl", &[SourceFile::new(file, source)], &[])
        .unwrap();
    SpirVCompiler::default().compile(&assembly).unwrap()
}

fn decorations(module: &Module, decoration: Decoration) -> Vec<&rspirv::dr::Instruction> {
    module
        .annotations
        .iter()
        .filter(|inst| {
            matches!(inst.class.opcode, Op::Decorate | Op::MemberDecorate)
                && inst.operands.iter().any(|operand| *operand == Operand::Decoration(decoration))
        })
        .collect()
}

const IMAGE: &str = "using System;\n\
public static class Blur {\n\
    public static Texture2D<Vector4<float>> Image;\n\
    public static RwBuffer<Vector4<float>> Colors;\n\
    [Kernel(8, 8, 1)]\n\
    public static void Main() {\n\
        Vector3<uint> id = ComputeUtils.GlobalInvocation3;\n\
        Vector2<uint> position = new Vector2<uint>(id.X, id.Y);\n\
        Image[position] = Colors[id.X];\n\
    }\n\
}";

const VERTEX: &str = "using System;\n\
public struct Varyings {\n\
    [Position] public Vector4<float> Clip;\n\
    public uint Id;\n\
    [VertexShader]\n\
    public static Varyings Vertex(Vector3<float> position) {\n\
        Varyings output;\n\
        output.Clip = VertexUtils.ObjectToClipPos(position);\n\
        output.Id = VertexUtils.Index;\n\
        return output;\n\
    }\n\
    [FragmentShader]\n\
    public static Vector4<float> Fragment(Varyings input) {\n\
        return input.Clip;\n\
    }\n\
}";

#[test]
fn test_header() {
    let result = lower("Shaders/Blur.nesl", IMAGE);
    let module = load_words(&result.words).unwrap();
    assert_eq!(result.words[0], MAGIC_NUMBER);
    let header = module.header.unwrap();
    assert_eq!(header.version(), (1, 0));
    assert_eq!(result.to_bytes().len(), result.words.len() * 4);
}

#[test]
fn test_storage_image_binding() {
    let result = lower("Shaders/Blur.nesl", IMAGE);
    assert_eq!(result.bindings.len(), 2);
    assert_eq!(result.bindings[0].name, "Shaders.Blur.Image");
    assert_eq!(result.bindings[0].kind, DescriptorKind::StorageImage);
    assert_eq!(result.bindings[0].stride, 0);
    assert_eq!(result.bindings[1].kind, DescriptorKind::StorageBuffer);
    assert_eq!(result.bindings[1].stride, 16);

    let module = load_words(&result.words).unwrap();
    assert!(module
        .types_global_values
        .iter()
        .any(|inst| inst.class.opcode == Op::TypeImage));
    assert_eq!(decorations(&module, Decoration::DescriptorSet).len(), 2);
    assert_eq!(decorations(&module, Decoration::Binding).len(), 2);
}

#[test]
fn test_scalar_texels_are_written_unpadded() {
    const MASK: &str = "using System;\n\
    public static class Mask {\n\
        public static Texture2D<float> Coverage;\n\
        [Kernel(8, 8, 1)]\n\
        public static void Main() {\n\
            Vector3<uint> id = ComputeUtils.GlobalInvocation3;\n\
            Vector2<uint> position = new Vector2<uint>(id.X, id.Y);\n\
            Coverage[position] = 0.5f;\n\
        }\n\
    }";

    let result = lower("Shaders/Mask.nesl", MASK);
    let module = load_words(&result.words).unwrap();
    let image = module
        .types_global_values
        .iter()
        .find(|inst| inst.class.opcode == Op::TypeImage)
        .unwrap();
    assert!(image.operands.contains(&Operand::ImageFormat(ImageFormat::R32f)));

    let instructions: Vec<&rspirv::dr::Instruction> = module
        .functions
        .iter()
        .flat_map(|function| function.blocks.iter())
        .flat_map(|block| block.instructions.iter())
        .chain(module.types_global_values.iter())
        .collect();
    let write = instructions
        .iter()
        .find(|inst| inst.class.opcode == Op::ImageWrite)
        .unwrap();
    let texel = match write.operands[2] {
        Operand::IdRef(id) => id,
        ref other => panic!("unexpected texel operand {:?}", other),
    };
    let texel_type = instructions
        .iter()
        .find(|inst| inst.result_id == Some(texel))
        .and_then(|inst| inst.result_type)
        .unwrap();
    let declared = module
        .types_global_values
        .iter()
        .find(|inst| inst.result_id == Some(texel_type))
        .unwrap();
    assert_eq!(declared.class.opcode, Op::TypeFloat);
}

#[test]
fn test_compute_builtins() {
    let result = lower("Shaders/Blur.nesl", IMAGE);
    let module = load_words(&result.words).unwrap();
    let builtins: Vec<_> = decorations(&module, Decoration::BuiltIn)
        .into_iter()
        .flat_map(|inst| inst.operands.clone())
        .filter_map(|operand| match operand {
            Operand::BuiltIn(builtin) => Some(builtin),
            _ => None,
        })
        .collect();
    assert_eq!(builtins, vec![BuiltIn::GlobalInvocationId]);

    let entry = &module.entry_points[0];
    assert_eq!(entry.operands[0], Operand::ExecutionModel(ExecutionModel::GLCompute));
    // model, function, name, then the interface
    assert_eq!(entry.operands.len(), 4);
}

#[test]
fn test_vertex_and_fragment_share_one_module() {
    let result = lower("Shaders/Varyings.nesl", VERTEX);
    let module = load_words(&result.words).unwrap();
    assert_eq!(module.entry_points.len(), 2);

    let vertex = result.entry_point("Vertex").unwrap();
    assert_eq!(vertex.stage, ShaderStage::Vertex);
    assert_eq!(vertex.outputs[0].location, None);
    assert_eq!(vertex.outputs[1].name, "return.Id");

    let fragment = result.entry_point("Fragment").unwrap();
    assert_eq!(fragment.inputs[1].name, "input.Id");
    assert_eq!(fragment.outputs[0].name, "return");
    assert_eq!(fragment.outputs[0].location, Some(0));

    // the integer varying is not interpolated
    assert_eq!(decorations(&module, Decoration::Flat).len(), 1);
    assert_eq!(
        module
            .execution_modes
            .iter()
            .filter(|inst| inst.operands.contains(&Operand::ExecutionMode(
                rspirv::spirv::ExecutionMode::OriginUpperLeft
            )))
            .count(),
        1
    );
}

#[test]
fn test_object_to_clip_push_constant() {
    let result = lower("Shaders/Varyings.nesl", VERTEX);
    assert_eq!(result.push_constants.len(), 1);
    let range = &result.push_constants[0];
    assert_eq!((range.name.as_str(), range.offset, range.size), ("ObjectToClip", 0, 64));

    let module = load_words(&result.words).unwrap();
    let push_constant_variables = module
        .types_global_values
        .iter()
        .filter(|inst| {
            inst.class.opcode == Op::Variable
                && inst.operands.first() == Some(&Operand::StorageClass(StorageClass::PushConstant))
        })
        .count();
    assert_eq!(push_constant_variables, 1);
    assert!(!decorations(&module, Decoration::ColMajor).is_empty());
}

#[test]
fn test_result_serializes_to_json() {
    let result = lower("Shaders/Blur.nesl", IMAGE);
    let json = serde_json::to_string(&result).unwrap();
    let back: SpirVCompilationResult = serde_json::from_str(&json).unwrap();
    assert_eq!(back, result);
}
