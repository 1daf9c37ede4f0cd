use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A single token from a NESL source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Path of the file the token came from
    pub path: Arc<str>,
    /// Line number where token appears (1-indexed)
    pub line: usize,
    /// Column number where token starts (1-indexed)
    pub column: usize,
    /// The type of token
    pub kind: TokenKind,
    /// Bracket tokens: signed token distance to the partner bracket
    /// (positive on the opener, negative on the closer), or
    /// [`Token::UNMATCHED`]. Zero for every other token.
    pub length: i32,
    /// Text of words and numbers
    pub value: Option<String>,
}

impl Token {
    /// Match length of a bracket without a partner
    pub const UNMATCHED: i32 = i32::MIN;

    /// Creates a new token with the given properties
    pub fn new(
        path: Arc<str>,
        line: usize,
        column: usize,
        kind: TokenKind,
        value: Option<String>,
    ) -> Self {
        let length = if kind.is_bracket() { Self::UNMATCHED } else { 0 };
        Token {
            path,
            line,
            column,
            kind,
            length,
            value,
        }
    }

    /// Text of a word or number token, empty for punctuation
    pub fn text(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }

    /// Whether this is the word `keyword`
    pub fn is_word(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text() == keyword
    }

    /// Whether this bracket token found no partner
    pub fn is_unmatched_bracket(&self) -> bool {
        self.kind.is_bracket() && self.length == Self::UNMATCHED
    }
}

/// All token types of NESL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    // Words
    /// Identifier or keyword
    Word,
    /// Numeric literal, suffix included
    Number,

    // Brackets
    /// `(`
    RoundOpen,
    /// `)`
    RoundClose,
    /// `[`
    SquareOpen,
    /// `]`
    SquareClose,
    /// `{`
    CurlyOpen,
    /// `}`
    CurlyClose,
    /// `<`, also the less-than operator when unmatched
    AngleOpen,
    /// `>`, also the greater-than operator when unmatched
    AngleClose,

    // Punctuation
    /// `.`
    Dot,
    /// `,`
    Comma,
    /// `;`
    Semicolon,
    /// `:`
    Colon,
    /// `::`
    DoubleColon,
    /// `?`
    Question,

    // Operators
    /// `=`
    Assignment,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `!`
    Exclamation,
    /// `**`
    Power,
    /// `&&`
    And,
    /// `||`
    Or,
    /// `??`
    Coalesce,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<=`
    LessOrEqual,
    /// `>=`
    GreaterOrEqual,

    // Assignment forms
    /// `+=`
    PlusAssignment,
    /// `-=`
    MinusAssignment,
    /// `*=`
    StarAssignment,
    /// `/=`
    SlashAssignment,
    /// `%=`
    PercentAssignment,
    /// `**=`
    PowerAssignment,
    /// `&&=`
    AndAssignment,
    /// `||=`
    OrAssignment,
    /// `??=`
    CoalesceAssignment,

    // Special
    /// Character the lexer does not know
    Unknown,
    /// End of file
    EndOfFile,
}

/// Bracket families tracked by the lexer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BracketFamily {
    /// `( )`
    Round,
    /// `[ ]`
    Square,
    /// `{ }`
    Curly,
    /// `< >`
    Angle,
}

impl TokenKind {
    /// Bracket family and whether the token opens it
    pub fn bracket(self) -> Option<(BracketFamily, bool)> {
        match self {
            TokenKind::RoundOpen => Some((BracketFamily::Round, true)),
            TokenKind::RoundClose => Some((BracketFamily::Round, false)),
            TokenKind::SquareOpen => Some((BracketFamily::Square, true)),
            TokenKind::SquareClose => Some((BracketFamily::Square, false)),
            TokenKind::CurlyOpen => Some((BracketFamily::Curly, true)),
            TokenKind::CurlyClose => Some((BracketFamily::Curly, false)),
            TokenKind::AngleOpen => Some((BracketFamily::Angle, true)),
            TokenKind::AngleClose => Some((BracketFamily::Angle, false)),
            _ => None,
        }
    }

    /// Whether the token is any kind of bracket
    pub fn is_bracket(self) -> bool {
        self.bracket().is_some()
    }

    /// Binary operator that a compound assignment applies, if any
    pub fn compound_operator(self) -> Option<TokenKind> {
        match self {
            TokenKind::PlusAssignment => Some(TokenKind::Plus),
            TokenKind::MinusAssignment => Some(TokenKind::Minus),
            TokenKind::StarAssignment => Some(TokenKind::Star),
            TokenKind::SlashAssignment => Some(TokenKind::Slash),
            TokenKind::PercentAssignment => Some(TokenKind::Percent),
            TokenKind::PowerAssignment => Some(TokenKind::Power),
            TokenKind::AndAssignment => Some(TokenKind::And),
            TokenKind::OrAssignment => Some(TokenKind::Or),
            TokenKind::CoalesceAssignment => Some(TokenKind::Coalesce),
            _ => None,
        }
    }
}
