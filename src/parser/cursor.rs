//! Token cursor shared by the declaration and body parsers

use super::diagnostics::{CompilationError, CompilationErrorType};
use crate::lexer::{Token, TokenKind};

/// Position over a token slice ending at `end` (exclusive)
#[derive(Clone)]
pub(crate) struct TokenCursor<'a> {
    tokens: &'a [Token],
    current: usize,
    end: usize,
}

impl<'a> TokenCursor<'a> {
    /// Cursor over `tokens[start..end]`
    pub(crate) fn new(tokens: &'a [Token], start: usize, end: usize) -> Self {
        TokenCursor {
            tokens,
            current: start,
            end: end.min(tokens.len()),
        }
    }

    /// Index of the current token
    pub(crate) fn position(&self) -> usize {
        self.current
    }

    /// Whole token slice
    pub(crate) fn tokens(&self) -> &'a [Token] {
        self.tokens
    }

    /// Whether the range or the file is exhausted
    pub(crate) fn is_at_end(&self) -> bool {
        self.current >= self.end || self.tokens[self.current].kind == TokenKind::EndOfFile
    }

    /// Current token; the last token of the range once exhausted
    pub(crate) fn peek(&self) -> &'a Token {
        self.peek_at(0)
    }

    /// Token `offset` positions ahead, clamped to the range
    pub(crate) fn peek_at(&self, offset: usize) -> &'a Token {
        let index = (self.current + offset).min(self.end.saturating_sub(1));
        &self.tokens[index.min(self.tokens.len() - 1)]
    }

    /// Kind of the token `offset` positions ahead, `EndOfFile` past the range
    pub(crate) fn kind_at(&self, offset: usize) -> TokenKind {
        if self.current + offset >= self.end {
            TokenKind::EndOfFile
        } else {
            self.tokens[self.current + offset].kind
        }
    }

    /// Consumes and returns the current token
    pub(crate) fn advance(&mut self) -> &'a Token {
        let token = self.peek();
        if !self.is_at_end() {
            self.current += 1;
        }
        token
    }

    /// Whether the current token is of `kind`
    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        !self.is_at_end() && self.peek().kind == kind
    }

    /// Whether the current token is the word `keyword`
    pub(crate) fn check_word(&self, keyword: &str) -> bool {
        !self.is_at_end() && self.peek().is_word(keyword)
    }

    /// Consumes the current token if it is of `kind`
    pub(crate) fn match_kind(&mut self, kind: TokenKind) -> Option<&'a Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    /// Consumes the word `keyword` if present
    pub(crate) fn match_word(&mut self, keyword: &str) -> bool {
        if self.check_word(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Consumes a token of `kind` or reports `error` at the current token
    pub(crate) fn consume(
        &mut self,
        kind: TokenKind,
        error: CompilationErrorType,
    ) -> Result<&'a Token, CompilationError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(error))
        }
    }

    /// Consumes an identifier
    pub(crate) fn identifier(&mut self) -> Result<&'a Token, CompilationError> {
        self.consume(TokenKind::Word, CompilationErrorType::ExpectedIdentifier)
    }

    /// Diagnostic at the current token; `UnexpectedEndOfFile` once exhausted
    pub(crate) fn error_here(&self, error: CompilationErrorType) -> CompilationError {
        if self.is_at_end() && self.current >= self.tokens.len().saturating_sub(1) {
            CompilationError::at(self.peek(), CompilationErrorType::UnexpectedEndOfFile)
        } else {
            CompilationError::at(self.peek(), error)
        }
    }

    /// Index of the partner of the bracket at `index`
    pub(crate) fn partner(&self, index: usize) -> Option<usize> {
        let token = self.tokens.get(index)?;
        if token.length == Token::UNMATCHED || token.length == 0 {
            return None;
        }
        usize::try_from(index as i64 + token.length as i64).ok()
    }

    /// Whether the current token opens a matched bracket pair
    pub(crate) fn at_matched_open(&self, kind: TokenKind) -> bool {
        self.check(kind) && self.peek().length > 0 && self.peek().length != Token::UNMATCHED
    }

    /// Moves past the bracket pair starting at the current token
    pub(crate) fn skip_bracket(&mut self) -> Option<usize> {
        let closer = self.partner(self.current)?;
        self.current = (closer + 1).min(self.end);
        Some(closer)
    }

    /// Moves to `index`
    pub(crate) fn seek(&mut self, index: usize) {
        self.current = index.min(self.end);
    }

    /// Skips to just after the next `;` or to the next `}` at this nesting
    /// level, jumping over nested bracket pairs
    pub(crate) fn recover(&mut self) {
        while !self.is_at_end() {
            let token = self.peek();
            match token.kind {
                TokenKind::Semicolon => {
                    self.advance();
                    return;
                }
                TokenKind::CurlyClose => return,
                TokenKind::RoundOpen | TokenKind::SquareOpen | TokenKind::CurlyOpen
                    if self.partner(self.current).is_some() =>
                {
                    self.skip_bracket();
                    if token.kind == TokenKind::CurlyOpen {
                        return;
                    }
                }
                _ => {
                    self.advance();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    #[test]
    fn test_skip_bracket_and_recover() {
        let tokens = lex("a.nesl", "f(a, (b)) ; x").unwrap();
        let mut cursor = TokenCursor::new(&tokens, 0, tokens.len());
        cursor.advance();
        assert_eq!(cursor.skip_bracket(), Some(7));
        assert!(cursor.check(TokenKind::Semicolon));

        let mut cursor = TokenCursor::new(&tokens, 0, tokens.len());
        cursor.recover();
        assert!(cursor.check_word("x"));
    }

    #[test]
    fn test_range_end_reports_end_of_range() {
        let tokens = lex("a.nesl", "a b c").unwrap();
        let mut cursor = TokenCursor::new(&tokens, 0, 2);
        cursor.advance();
        cursor.advance();
        assert!(cursor.is_at_end());
        assert_eq!(cursor.kind_at(0), TokenKind::EndOfFile);
    }
}
