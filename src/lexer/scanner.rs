use super::token::{BracketFamily, Token, TokenKind};
use crate::error::{Error, Result};
use std::sync::Arc;

/// Character scanner for NESL source files
pub struct Scanner {
    /// Path reported on every token
    path: Arc<str>,
    /// Source code as character vector
    source: Vec<char>,
    /// Accumulated tokens
    tokens: Vec<Token>,
    /// Start position of current token
    start: usize,
    /// Current position in source
    current: usize,
    /// Current line number (1-indexed)
    line: usize,
    /// Current column number (1-indexed)
    column: usize,
    /// Line where the current token starts
    start_line: usize,
    /// Column where the current token starts
    start_column: usize,
    /// Open round/square/curly brackets as (token index, family)
    brackets: Vec<(usize, BracketFamily)>,
    /// Open angle brackets as (token index, bracket depth at open)
    angles: Vec<(usize, usize)>,
}

impl Scanner {
    /// Creates a new scanner over `source` reporting `path` on its tokens
    pub fn new(path: &str, source: &str) -> Self {
        Scanner {
            path: Arc::from(path),
            source: source.chars().collect(),
            tokens: Vec::new(),
            start: 0,
            current: 0,
            line: 1,
            column: 1,
            start_line: 1,
            start_column: 1,
            brackets: Vec::new(),
            angles: Vec::new(),
        }
    }

    /// Scans all tokens from source code and returns them as a vector
    pub fn scan_tokens(mut self) -> Result<Vec<Token>> {
        while !self.is_at_end() {
            self.start = self.current;
            self.start_line = self.line;
            self.start_column = self.column;
            self.scan_token()?;
        }

        self.start = self.current;
        self.start_line = self.line;
        self.start_column = self.column;
        self.add_token(TokenKind::EndOfFile, None);

        Ok(self.tokens)
    }

    fn scan_token(&mut self) -> Result<()> {
        let c = self.advance();

        match c {
            ' ' | '\t' => {}
            '\r' => {
                // `\r\n` breaks once, on the `\n`
                if self.peek() != '\n' {
                    self.new_line();
                }
            }
            '\n' => self.new_line(),

            '/' => {
                if self.match_char('/') {
                    self.skip_line_comment();
                } else if self.peek() == '*' {
                    return Err(Error::UnsupportedComment {
                        path: self.path.to_string(),
                        line: self.start_line,
                        column: self.start_column,
                    });
                } else if self.match_char('=') {
                    self.add_token(TokenKind::SlashAssignment, None);
                } else {
                    self.add_token(TokenKind::Slash, None);
                }
            }

            // Brackets
            '(' => self.open_bracket(TokenKind::RoundOpen, BracketFamily::Round),
            '[' => self.open_bracket(TokenKind::SquareOpen, BracketFamily::Square),
            '{' => {
                self.drop_angles_at_current_depth();
                self.open_bracket(TokenKind::CurlyOpen, BracketFamily::Curly)
            }
            ')' => self.close_bracket(TokenKind::RoundClose, BracketFamily::Round),
            ']' => self.close_bracket(TokenKind::SquareClose, BracketFamily::Square),
            '}' => self.close_bracket(TokenKind::CurlyClose, BracketFamily::Curly),
            '<' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::LessOrEqual, None);
                } else {
                    self.open_angle();
                }
            }
            '>' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::GreaterOrEqual, None);
                } else {
                    self.close_angle();
                }
            }

            // Punctuation
            '.' => self.add_token(TokenKind::Dot, None),
            ',' => self.add_token(TokenKind::Comma, None),
            ';' => {
                self.drop_angles_at_current_depth();
                self.add_token(TokenKind::Semicolon, None);
            }
            ':' => {
                if self.match_char(':') {
                    self.add_token(TokenKind::DoubleColon, None);
                } else {
                    self.add_token(TokenKind::Colon, None);
                }
            }

            // Operators
            '=' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::Equal, None);
                } else {
                    self.add_token(TokenKind::Assignment, None);
                }
            }
            '!' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::NotEqual, None);
                } else {
                    self.add_token(TokenKind::Exclamation, None);
                }
            }
            '+' => self.operator_or_assignment(TokenKind::Plus, TokenKind::PlusAssignment),
            '-' => self.operator_or_assignment(TokenKind::Minus, TokenKind::MinusAssignment),
            '%' => self.operator_or_assignment(TokenKind::Percent, TokenKind::PercentAssignment),
            '*' => {
                if self.match_char('*') {
                    self.operator_or_assignment(TokenKind::Power, TokenKind::PowerAssignment);
                } else {
                    self.operator_or_assignment(TokenKind::Star, TokenKind::StarAssignment);
                }
            }
            '&' => self.compound_only('&', TokenKind::And, TokenKind::AndAssignment),
            '|' => self.compound_only('|', TokenKind::Or, TokenKind::OrAssignment),
            '?' => {
                if self.match_char('?') {
                    self.operator_or_assignment(TokenKind::Coalesce, TokenKind::CoalesceAssignment);
                } else {
                    self.add_token(TokenKind::Question, None);
                }
            }

            c if c.is_ascii_digit() => self.scan_number(),
            c if c.is_alphabetic() || c == '_' => self.scan_word(),

            c => self.add_token(TokenKind::Unknown, Some(c.to_string())),
        }

        Ok(())
    }

    fn new_line(&mut self) {
        self.line += 1;
        self.column = 1;
    }

    fn skip_line_comment(&mut self) {
        while !self.is_at_end() && self.peek() != '\n' && self.peek() != '\r' {
            self.advance();
        }
    }

    fn operator_or_assignment(&mut self, operator: TokenKind, assignment: TokenKind) {
        if self.match_char('=') {
            self.add_token(assignment, None);
        } else {
            self.add_token(operator, None);
        }
    }

    /// `&&`/`||` exist only as doubled characters; a lone one is unknown.
    fn compound_only(&mut self, c: char, operator: TokenKind, assignment: TokenKind) {
        if self.match_char(c) {
            if matches!(operator, TokenKind::And | TokenKind::Or) {
                self.drop_angles_at_current_depth();
            }
            self.operator_or_assignment(operator, assignment);
        } else {
            self.add_token(TokenKind::Unknown, Some(c.to_string()));
        }
    }

    fn scan_number(&mut self) {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        // Suffixes and stray letters stay in the word; the parser validates them.
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            self.advance();
        }

        let text = self.lexeme();
        self.add_token(TokenKind::Number, Some(text));
    }

    fn scan_word(&mut self) {
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            self.advance();
        }

        let text = self.lexeme();
        self.add_token(TokenKind::Word, Some(text));
    }

    fn open_bracket(&mut self, kind: TokenKind, family: BracketFamily) {
        self.brackets.push((self.tokens.len(), family));
        self.add_token(kind, None);
    }

    fn close_bracket(&mut self, kind: TokenKind, family: BracketFamily) {
        let index = self.tokens.len();
        self.add_token(kind, None);

        match self.brackets.last() {
            Some(&(opener, open_family)) if open_family == family => {
                self.brackets.pop();
                let depth = self.brackets.len();
                self.angles.retain(|&(_, angle_depth)| angle_depth <= depth);
                self.pair(opener, index);
            }
            _ => {}
        }
    }

    fn open_angle(&mut self) {
        self.angles.push((self.tokens.len(), self.brackets.len()));
        self.add_token(TokenKind::AngleOpen, None);
    }

    fn close_angle(&mut self) {
        let index = self.tokens.len();
        self.add_token(TokenKind::AngleClose, None);

        if let Some(&(opener, depth)) = self.angles.last() {
            if depth == self.brackets.len() {
                self.angles.pop();
                self.pair(opener, index);
            }
        }
    }

    /// Unclosed `<` at this level are less-than operators from here on.
    fn drop_angles_at_current_depth(&mut self) {
        let depth = self.brackets.len();
        self.angles.retain(|&(_, angle_depth)| angle_depth < depth);
    }

    fn pair(&mut self, opener: usize, closer: usize) {
        let distance = (closer - opener) as i32;
        self.tokens[opener].length = distance;
        self.tokens[closer].length = -distance;
    }

    fn lexeme(&self) -> String {
        self.source[self.start..self.current].iter().collect()
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn advance(&mut self) -> char {
        let c = self.source[self.current];
        self.current += 1;
        self.column += 1;
        c
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.source[self.current]
        }
    }

    fn peek_next(&self) -> char {
        if self.current + 1 >= self.source.len() {
            '\0'
        } else {
            self.source[self.current + 1]
        }
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.source[self.current] != expected {
            false
        } else {
            self.current += 1;
            self.column += 1;
            true
        }
    }

    fn add_token(&mut self, kind: TokenKind, value: Option<String>) {
        self.tokens.push(Token::new(
            self.path.clone(),
            self.start_line,
            self.start_column,
            kind,
            value,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Scanner::new("test.nesl", source)
            .scan_tokens()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_simple_statement() {
        let tokens = Scanner::new("a.nesl", "uint x = 5u;").scan_tokens().unwrap();

        assert_eq!(tokens.len(), 6); // uint x = 5u ; EOF
        assert_eq!(tokens[0].text(), "uint");
        assert_eq!(tokens[1].text(), "x");
        assert_eq!(tokens[2].kind, TokenKind::Assignment);
        assert_eq!(tokens[3].kind, TokenKind::Number);
        assert_eq!(tokens[3].text(), "5u");
        assert_eq!(tokens[4].kind, TokenKind::Semicolon);
        assert_eq!(tokens[5].kind, TokenKind::EndOfFile);
    }

    #[test]
    fn test_compound_operators() {
        assert_eq!(
            kinds("a ** b **= c && d &&= e || f ||= g ?? h ??= i"),
            vec![
                TokenKind::Word,
                TokenKind::Power,
                TokenKind::Word,
                TokenKind::PowerAssignment,
                TokenKind::Word,
                TokenKind::And,
                TokenKind::Word,
                TokenKind::AndAssignment,
                TokenKind::Word,
                TokenKind::Or,
                TokenKind::Word,
                TokenKind::OrAssignment,
                TokenKind::Word,
                TokenKind::Coalesce,
                TokenKind::Word,
                TokenKind::CoalesceAssignment,
                TokenKind::Word,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn test_line_comment_and_crlf() {
        let tokens = Scanner::new("a.nesl", "a // comment\r\nb\r\n  c")
            .scan_tokens()
            .unwrap();

        assert_eq!(tokens.len(), 4);
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (2, 1));
        assert_eq!((tokens[2].line, tokens[2].column), (3, 3));
    }

    #[test]
    fn test_block_comment_fails_fast() {
        let result = Scanner::new("a.nesl", "a /* b */").scan_tokens();
        assert!(matches!(
            result,
            Err(Error::UnsupportedComment { line: 1, column: 3, .. })
        ));
    }

    #[test]
    fn test_float_and_dot() {
        let tokens = Scanner::new("a.nesl", "4.14359 v.X").scan_tokens().unwrap();
        assert_eq!(tokens[0].text(), "4.14359");
        assert_eq!(tokens[2].kind, TokenKind::Dot);
    }

    #[test]
    fn test_generic_angles_pair() {
        let tokens = Scanner::new("a.nesl", "Vector4<Vector2<float>> v;")
            .scan_tokens()
            .unwrap();
        // Vector4 < Vector2 < float > > v ;
        assert_eq!(tokens[1].length, 5);
        assert_eq!(tokens[3].length, 2);
        assert_eq!(tokens[5].length, -2);
        assert_eq!(tokens[6].length, -5);
    }

    #[test]
    fn test_comparison_angles_stay_unmatched() {
        let tokens = Scanner::new("a.nesl", "if (a < b) { c = d > e; }")
            .scan_tokens()
            .unwrap();
        let less = tokens.iter().find(|t| t.kind == TokenKind::AngleOpen).unwrap();
        let greater = tokens.iter().find(|t| t.kind == TokenKind::AngleClose).unwrap();
        assert!(less.is_unmatched_bracket());
        assert!(greater.is_unmatched_bracket());
    }
}
