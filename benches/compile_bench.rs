use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nesl::runtime::Interpreter;
use nesl::{lex, NeslAssembly, NeslCompiler, SourceFile, SpirVCompiler, Value};

const DOUBLE: &str = r#"
using System;
public static class Double {
    public static RwBuffer<uint> Values;
    [Kernel(64, 1, 1)]
    public static void Main() {
        uint index = ComputeUtils.GlobalInvocation3.X;
        if (index < Values.Length) {
            Values[index] = Values[index] * 2;
        }
    }
}
"#;

fn files() -> Vec<SourceFile> {
    vec![SourceFile::new("Shaders/Double.nesl", DOUBLE)]
}

fn lexer_benchmark(c: &mut Criterion) {
    c.bench_function("lex kernel", |b| {
        b.iter(|| lex("Shaders/Double.nesl", black_box(DOUBLE)).unwrap())
    });
}

fn compile_benchmark(c: &mut Criterion) {
    let compiler = NeslCompiler::default();
    let files = files();
    c.bench_function("compile kernel", |b| {
        b.iter(|| {
            compiler
                .compile("Shaders", "shaders.nesl", black_box(&files), &[])
                .unwrap()
        })
    });

    let assembly = compiler.compile("Shaders", "shaders.nesl", &files, &[]).unwrap();
    c.bench_function("lower kernel to SPIR-V", |b| {
        b.iter(|| SpirVCompiler::default().compile(black_box(&assembly)).unwrap())
    });

    let bytes = assembly.get_raw_bytes().unwrap();
    c.bench_function("load serialized assembly", |b| {
        b.iter(|| NeslAssembly::load(black_box(&bytes)).unwrap())
    });
}

fn interpreter_benchmark(c: &mut Criterion) {
    let assembly = NeslCompiler::default()
        .compile("Shaders", "shaders.nesl", &files(), &[])
        .unwrap();
    let main = assembly
        .get_type("Shaders.Double")
        .unwrap()
        .get_methods("Main")
        .unwrap()[0]
        .clone();

    c.bench_function("dispatch 1024 invocations", |b| {
        b.iter(|| {
            let mut interpreter = Interpreter::default();
            interpreter.bind_buffer("Shaders.Double.Values", vec![Value::UInt(1); 1024]);
            interpreter.dispatch(&main, black_box([16, 1, 1])).unwrap();
        })
    });
}

criterion_group!(benches, lexer_benchmark, compile_benchmark, interpreter_benchmark);
criterion_main!(benches);
