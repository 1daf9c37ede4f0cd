//! Property-based tests using proptest
//!
//! The lexer must survive arbitrary input, compiled IL must survive a
//! serialization round trip, and interpreted arithmetic must agree with
//! Rust's wrapping integer semantics.

use nesl::lexer::{lex, TokenKind};
use nesl::runtime::Invocation;
use nesl::serialization::{
    deserialize_il, serialize_il, ObjectStorage, SerializationReader, SerializationWriter,
};
use nesl::{Interpreter, NeslCompiler, SourceFile, Value};
use proptest::prelude::*;
use std::sync::Arc;

fn token_soup() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            Just("{".to_string()),
            Just("}".to_string()),
            Just("(".to_string()),
            Just(")".to_string()),
            Just("<".to_string()),
            Just(">".to_string()),
            Just("[".to_string()),
            Just("]".to_string()),
            Just(";".to_string()),
            Just("+=".to_string()),
            Just("??".to_string()),
            Just("\n".to_string()),
            "[a-zA-Z_][a-zA-Z0-9_]{0,8}",
            "[0-9]{1,5}(\\.[0-9]{1,3})?[uf]?",
        ],
        0..64,
    )
    .prop_map(|tokens| tokens.join(" "))
}

#[derive(Debug, Clone, Copy)]
enum Operator {
    Add,
    Subtract,
    Multiply,
}

impl Operator {
    fn symbol(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Multiply => "*",
        }
    }

    fn apply(self, left: u32, right: u32) -> u32 {
        match self {
            Operator::Add => left.wrapping_add(right),
            Operator::Subtract => left.wrapping_sub(right),
            Operator::Multiply => left.wrapping_mul(right),
        }
    }
}

fn operator() -> impl Strategy<Value = Operator> {
    prop_oneof![
        Just(Operator::Add),
        Just(Operator::Subtract),
        Just(Operator::Multiply)
    ]
}

fn arithmetic_source(operator: Operator, constant: u32) -> String {
    format!(
        "public static class Math {{\n\
            public static uint Apply(uint left, uint right) {{\n\
                uint result = left {} right;\n\
                if (result == {}u) {{ return 0; }}\n\
                return result;\n\
            }}\n\
        }}",
        operator.symbol(),
        constant
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn lexer_never_panics(source in "\\PC{0,200}") {
        match lex("Fuzz.nesl", &source) {
            Ok(tokens) => {
                prop_assert_eq!(tokens.last().map(|token| token.kind), Some(TokenKind::EndOfFile));
            }
            Err(error) => prop_assert!(error.to_string().contains("multi-line comments")),
        }
    }

    #[test]
    fn bracket_partners_are_symmetric(source in token_soup()) {
        let tokens = lex("Fuzz.nesl", &source).unwrap();
        for (index, token) in tokens.iter().enumerate() {
            if token.kind.is_bracket() && !token.is_unmatched_bracket() {
                let partner = (index as i64 + token.length as i64) as usize;
                prop_assert!(partner < tokens.len());
                prop_assert_eq!(tokens[partner].length, -token.length);
            }
        }
    }

    #[test]
    fn compiler_reports_instead_of_panicking(source in token_soup()) {
        let result = NeslCompiler::default().try_compile(
            "Fuzz",
            "fuzz.nesl",
            &[SourceFile::new("Fuzz/Fuzz.nesl", &source)],
            &[],
        );
        prop_assert!(result.is_ok());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn il_round_trip(operator in operator(), constant in any::<u32>()) {
        let assembly = NeslCompiler::default()
            .compile(
                "Fuzz",
                "fuzz.nesl",
                &[SourceFile::new("Fuzz/Math.nesl", &arithmetic_source(operator, constant))],
                &[],
            )
            .unwrap();
        let apply = assembly.get_type("Fuzz.Math").unwrap().get_methods("Apply").unwrap()[0].clone();
        let container = apply.il().unwrap().unwrap();

        let mut writer = SerializationWriter::new();
        serialize_il(&mut writer, &container).unwrap();
        let bytes = writer.into_bytes();

        let storage = Arc::new(ObjectStorage::new());
        storage.set_current(Some(assembly.clone()));
        let mut reader = SerializationReader::new(&bytes).with_storage(storage);
        let loaded = deserialize_il(&mut reader).unwrap();

        prop_assert_eq!(loaded.tail(), container.tail());
        prop_assert_eq!(loaded.instruction_pairs(), container.instruction_pairs());
        prop_assert_eq!(reader.remaining(), 0);
        prop_assert_eq!(loaded.disassemble().unwrap(), container.disassemble().unwrap());
    }

    #[test]
    fn interpreted_arithmetic_wraps(
        operator in operator(),
        left in any::<u32>(),
        right in any::<u32>(),
    ) {
        let assembly = NeslCompiler::default()
            .compile(
                "Fuzz",
                "fuzz.nesl",
                &[SourceFile::new("Fuzz/Math.nesl", &arithmetic_source(operator, 7))],
                &[],
            )
            .unwrap();
        let apply = assembly.get_type("Fuzz.Math").unwrap().get_methods("Apply").unwrap()[0].clone();

        let result = Interpreter::default()
            .invoke(&apply, vec![Value::UInt(left), Value::UInt(right)], Invocation::default())
            .unwrap();
        let expected = match operator.apply(left, right) {
            7 => 0,
            other => other,
        };
        prop_assert_eq!(result, Value::UInt(expected));
    }
}

proptest! {
    #[test]
    fn make_generic_is_memoized(index in 0usize..4, size in 0usize..3) {
        let library = nesl::compiler::default_library().unwrap();
        let scalars = ["System.Boolean", "System.UInt32", "System.Int32", "System.Float32"];
        let vectors = ["System.Vector2", "System.Vector3", "System.Vector4"];
        let scalar = library.get_type(scalars[index]).unwrap();
        let vector = library.get_type(vectors[size]).unwrap();

        let first = vector.make_generic(&[scalar.clone()]).unwrap();
        let second = vector.make_generic(&[scalar]).unwrap();
        prop_assert!(Arc::ptr_eq(&first, &second));
    }
}
