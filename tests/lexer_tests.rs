//! Lexer integration tests: token stream shape, positions and bracket
//! partner distances

use nesl::lexer::{lex, Token, TokenKind};
use nesl::Error;

fn kinds(source: &str) -> Vec<TokenKind> {
    lex("Test.nesl", source)
        .unwrap()
        .into_iter()
        .map(|token| token.kind)
        .collect()
}

#[test]
fn test_stream_ends_with_end_of_file() {
    let tokens = lex("Test.nesl", "").unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].kind, TokenKind::EndOfFile);
}

#[test]
fn test_kernel_declaration() {
    let tokens = lex("Shaders/Add.nesl", "[Kernel(64, 1, 1)] public static void Main() { }").unwrap();
    let texts: Vec<&str> = tokens.iter().map(Token::text).collect();
    assert_eq!(&texts[..4], &["", "Kernel", "", "64"]);
    assert_eq!(tokens[0].kind, TokenKind::SquareOpen);
    assert!(tokens[10].is_word("public"));
    assert_eq!(tokens[0].length, 9);
    assert_eq!(&*tokens[0].path, "Shaders/Add.nesl");
}

#[test]
fn test_positions_are_one_based() {
    let tokens = lex("Test.nesl", "uint a;\n  a = 1u;").unwrap();
    assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
    assert_eq!((tokens[3].line, tokens[3].column), (2, 3));
}

#[test]
fn test_brackets_know_their_partner() {
    let tokens = lex("Test.nesl", "{ ( [ ] ) }").unwrap();
    assert_eq!(tokens[0].length, 5);
    assert_eq!(tokens[1].length, 3);
    assert_eq!(tokens[2].length, 1);
    assert_eq!(tokens[3].length, -1);
    assert_eq!(tokens[5].length, -5);
}

#[test]
fn test_unmatched_brackets() {
    let tokens = lex("Test.nesl", "{ ( }").unwrap();
    assert_eq!(tokens[1].length, Token::UNMATCHED);
    assert!(tokens[1].is_unmatched_bracket());
}

#[test]
fn test_nested_parentheses() {
    let balanced = lex("Test.nesl", "(())").unwrap();
    let lengths: Vec<i32> = balanced[..4].iter().map(|token| token.length).collect();
    assert_eq!(lengths, vec![3, 1, -1, -3]);

    let open = lex("Test.nesl", "(()").unwrap();
    assert!(open[0].is_unmatched_bracket());
    assert_eq!((open[1].length, open[2].length), (1, -1));

    let closed = lex("Test.nesl", "())").unwrap();
    assert!(closed[2].is_unmatched_bracket());
    assert!(closed[2].length < 0);
}

#[test]
fn test_angle_brackets_in_generic_names() {
    let tokens = lex("Test.nesl", "RwBuffer<Vector4<float>> data;").unwrap();
    assert_eq!(tokens[1].kind, TokenKind::AngleOpen);
    assert_eq!(tokens[1].length, 5);
    assert_eq!(tokens[6].length, -5);
}

#[test]
fn test_comparison_is_not_a_bracket() {
    let tokens = lex("Test.nesl", "a < b").unwrap();
    assert_eq!(tokens[1].kind, TokenKind::AngleOpen);
    assert!(tokens[1].is_unmatched_bracket());
}

#[test]
fn test_operators() {
    assert_eq!(
        kinds("a += b ?? c != d"),
        vec![
            TokenKind::Word,
            TokenKind::PlusAssignment,
            TokenKind::Word,
            TokenKind::Coalesce,
            TokenKind::Word,
            TokenKind::NotEqual,
            TokenKind::Word,
            TokenKind::EndOfFile,
        ]
    );
    assert_eq!(
        kinds("x::y % z"),
        vec![
            TokenKind::Word,
            TokenKind::DoubleColon,
            TokenKind::Word,
            TokenKind::Percent,
            TokenKind::Word,
            TokenKind::EndOfFile,
        ]
    );
}

#[test]
fn test_number_suffixes() {
    let tokens = lex("Test.nesl", "5u 4.14359f 3").unwrap();
    assert_eq!(tokens[0].text(), "5u");
    assert_eq!(tokens[1].text(), "4.14359f");
    assert!(tokens[..3].iter().all(|token| token.kind == TokenKind::Number));
}

#[test]
fn test_block_comment_is_rejected() {
    let error = lex("Test.nesl", "uint a; /* note */").unwrap_err();
    assert!(matches!(error, Error::UnsupportedComment { line: 1, column: 9, .. }));
    assert!(!error.is_recoverable());
}
