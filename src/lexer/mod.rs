//! Lexical analysis for NESL
//!
//! Converts source text into a flat token stream. Bracket tokens carry the
//! distance to their partner so the parser can skip whole blocks in one step.

mod scanner;
mod token;

pub use scanner::Scanner;
pub use token::{BracketFamily, Token, TokenKind};

use crate::error::Result;

/// Lexes one file. Fails only on constructs the lexer refuses to guess at
/// (block comments); unmatched brackets are reported through [`Token::length`].
pub fn lex(path: &str, content: &str) -> Result<Vec<Token>> {
    Scanner::new(path, content).scan_tokens()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbalanced_close() {
        let tokens = lex("a.nesl", "())").unwrap();
        assert_eq!(tokens[0].length, 1);
        assert_eq!(tokens[1].length, -1);
        assert_eq!(tokens[2].kind, TokenKind::RoundClose);
        assert!(tokens[2].is_unmatched_bracket());
    }

    #[test]
    fn test_mismatched_family() {
        let tokens = lex("a.nesl", "(]").unwrap();
        assert!(tokens[0].is_unmatched_bracket());
        assert!(tokens[1].is_unmatched_bracket());
    }
}
