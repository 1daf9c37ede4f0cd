//! Compute kernels run on the reference interpreter and lowered to SPIR-V

use nesl::runtime::{Interpreter, Invocation};
use nesl::{NeslAssembly, NeslCompiler, NeslMethod, SourceFile, SpirVCompiler, Value};
use std::sync::Arc;

fn compile(file: &str, source: &str) -> Arc<NeslAssembly> {
    NeslCompiler::default()
        .compile("Shaders", "shaders.nesl", &[SourceFile::new(file, source)], &[])
        .unwrap()
}

fn method(assembly: &NeslAssembly, ty: &str, name: &str) -> Arc<NeslMethod> {
    assembly.get_type(ty).unwrap().get_methods(name).unwrap()[0].clone()
}

const ADD: &str = "using System;\n\
public static class Add {\n\
    public static RwBuffer<uint> Input;\n\
    public static RwBuffer<uint> Output;\n\
    [Kernel(1, 1, 1)]\n\
    public static void Main() {\n\
        Output[0] = Input[0] + Input[1];\n\
    }\n\
}";

const NEGATE: &str = "using System;\n\
public static class Negate {\n\
    public static RwBuffer<float> Values;\n\
    [Kernel(1, 1, 1)]\n\
    public static void Main() {\n\
        Values[0] = -Values[0];\n\
    }\n\
}";

const GENERIC_SUM: &str = "using System;\n\
public static class Generic {\n\
    public static RwBuffer<uint> Data;\n\
    public static T Sum<T>(T a, T b) where T : IAdd<T, T, T> { return a + b; }\n\
    [Kernel(1, 1, 1)]\n\
    public static void Main() {\n\
        Data[2] = Sum<uint>(Data[0], Data[1]);\n\
    }\n\
}";

const DOUBLE: &str = "using System;\n\
public static class Double {\n\
    public static RwBuffer<uint> Values;\n\
    [Kernel(64, 1, 1)]\n\
    public static void Main() {\n\
        uint index = ComputeUtils.GlobalInvocation3.X;\n\
        if (index < Values.Length) {\n\
            Values[index] = Values[index] * 2;\n\
        }\n\
    }\n\
}";

#[test]
fn test_add_kernel() {
    let assembly = compile("Shaders/Add.nesl", ADD);
    let main = method(&assembly, "Shaders.Add", "Main");

    let mut interpreter = Interpreter::default();
    interpreter.bind_buffer("Shaders.Add.Input", vec![Value::UInt(5), Value::UInt(3)]);
    interpreter.bind_buffer("Shaders.Add.Output", vec![Value::UInt(0)]);
    interpreter.dispatch(&main, [1, 1, 1]).unwrap();
    assert_eq!(interpreter.read_buffer("Shaders.Add.Output").unwrap(), vec![Value::UInt(8)]);

    let module = SpirVCompiler::default().compile(&assembly).unwrap();
    let names: Vec<&str> = module.bindings.iter().map(|binding| binding.name.as_str()).collect();
    assert_eq!(names, vec!["Shaders.Add.Input", "Shaders.Add.Output"]);
    assert_eq!(module.bindings[1].binding, 1);
}

#[test]
fn test_negate_kernel() {
    let assembly = compile("Shaders/Negate.nesl", NEGATE);
    let main = method(&assembly, "Shaders.Negate", "Main");

    let mut interpreter = Interpreter::default();
    interpreter.bind_buffer("Shaders.Negate.Values", vec![Value::Float(4.14359)]);
    interpreter.dispatch(&main, [1, 1, 1]).unwrap();
    assert_eq!(
        interpreter.read_buffer("Shaders.Negate.Values").unwrap(),
        vec![Value::Float(-4.14359)]
    );

    let module = SpirVCompiler::default().compile(&assembly).unwrap();
    assert_eq!(module.entry_points.len(), 1);
    assert_eq!(module.bindings[0].stride, 4);
}

#[test]
fn test_generic_sum_kernel() {
    let assembly = compile("Shaders/Generic.nesl", GENERIC_SUM);
    let main = method(&assembly, "Shaders.Generic", "Main");

    let mut interpreter = Interpreter::default();
    interpreter.bind_buffer(
        "Shaders.Generic.Data",
        vec![Value::UInt(40), Value::UInt(2), Value::UInt(0)],
    );
    interpreter.dispatch(&main, [1, 1, 1]).unwrap();
    assert_eq!(
        interpreter.read_buffer("Shaders.Generic.Data").unwrap()[2],
        Value::UInt(42)
    );

    // Main plus one instantiation of Sum
    let module = SpirVCompiler::default().compile(&assembly).unwrap();
    let parsed = rspirv::dr::load_words(&module.words).unwrap();
    assert_eq!(parsed.functions.len(), 3);
}

#[test]
fn test_generic_method_invoked_directly() {
    let assembly = compile("Shaders/Generic.nesl", GENERIC_SUM);
    let library = nesl::compiler::default_library().unwrap();
    let float = library.get_type("System.Float32").unwrap();
    let sum = method(&assembly, "Shaders.Generic", "Sum")
        .make_generic(&[float])
        .unwrap();

    let result = Interpreter::default()
        .invoke(
            &sum,
            vec![Value::Float(1.5), Value::Float(2.25)],
            Invocation::default(),
        )
        .unwrap();
    assert_eq!(result, Value::Float(3.75));
}

#[test]
fn test_double_kernel_guards_out_of_range_invocations() {
    let assembly = compile("Shaders/Double.nesl", DOUBLE);
    let main = method(&assembly, "Shaders.Double", "Main");

    let values: Vec<Value> = (0..100u32).map(Value::UInt).collect();
    let mut interpreter = Interpreter::default();
    interpreter.bind_buffer("Shaders.Double.Values", values);
    // 128 invocations over 100 elements
    interpreter.dispatch(&main, [2, 1, 1]).unwrap();

    let expected: Vec<Value> = (0..100u32).map(|value| Value::UInt(value * 2)).collect();
    assert_eq!(interpreter.read_buffer("Shaders.Double.Values").unwrap(), expected);

    let module = SpirVCompiler::default().compile(&assembly).unwrap();
    assert_eq!(module.entry_point("Main").unwrap().local_size, Some([64, 1, 1]));
}

#[test]
fn test_out_of_bounds_write_is_a_runtime_error() {
    let assembly = compile("Shaders/Add.nesl", ADD);
    let main = method(&assembly, "Shaders.Add", "Main");

    let mut interpreter = Interpreter::default();
    interpreter.bind_buffer("Shaders.Add.Input", vec![Value::UInt(5), Value::UInt(3)]);
    interpreter.bind_buffer("Shaders.Add.Output", Vec::new());
    let error = interpreter.dispatch(&main, [1, 1, 1]).unwrap_err();
    assert!(error.to_string().contains("out of bounds"));
}

#[test]
fn test_dispatch_requires_kernel() {
    let assembly = compile("Shaders/Generic.nesl", GENERIC_SUM);
    let library = nesl::compiler::default_library().unwrap();
    let uint = library.get_type("System.UInt32").unwrap();
    let sum = method(&assembly, "Shaders.Generic", "Sum")
        .make_generic(&[uint])
        .unwrap();
    assert!(Interpreter::default().dispatch(&sum, [1, 1, 1]).is_err());
}
