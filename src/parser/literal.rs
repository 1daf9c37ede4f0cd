//! Numeric and boolean literals
//!
//! A literal keeps its source form until it meets a type: `5` becomes a
//! `UInt32`, `Int32` or `Float32` depending on the other operand, parameter
//! or field it is used with.

use super::diagnostics::CompilationErrorType;
use super::syntax::LiteralSyntax;
use crate::ir::ScalarKind;

/// Parsed literal, not yet bound to a type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LiteralValue {
    /// Integer; `unsigned` for a `u` suffix
    Integer {
        /// Value including sign
        value: i64,
        /// Written with `u`
        unsigned: bool,
    },
    /// Number with a fraction or an `f` suffix
    Float(f64),
    /// `true` or `false`
    Bool(bool),
}

impl LiteralValue {
    /// Parses the text of a number or boolean token
    pub fn parse(text: &str, negative: bool) -> Result<LiteralValue, CompilationErrorType> {
        match text {
            "true" if !negative => return Ok(LiteralValue::Bool(true)),
            "false" if !negative => return Ok(LiteralValue::Bool(false)),
            _ => {}
        }

        let (digits, suffix) = match text.char_indices().find(|(_, c)| c.is_alphabetic()) {
            Some((index, _)) => text.split_at(index),
            None => (text, ""),
        };
        let is_float = digits.contains('.');
        let sign = if negative { -1.0 } else { 1.0 };

        match (suffix, is_float) {
            ("" | "f" | "F", true) | ("f" | "F", false) => digits
                .parse::<f64>()
                .map(|value| LiteralValue::Float(sign * value))
                .map_err(|_| CompilationErrorType::InvalidLiteral),
            ("", false) | ("u" | "U", false) => {
                let magnitude = digits
                    .parse::<i64>()
                    .map_err(|_| CompilationErrorType::InvalidLiteral)?;
                let unsigned = !suffix.is_empty();
                if unsigned && negative {
                    return Err(CompilationErrorType::InvalidLiteral);
                }
                Ok(LiteralValue::Integer {
                    value: if negative { -magnitude } else { magnitude },
                    unsigned,
                })
            }
            _ => Err(CompilationErrorType::InvalidLiteral),
        }
    }

    /// Parses a literal of a declaration
    pub fn from_syntax(syntax: &LiteralSyntax) -> Result<LiteralValue, CompilationErrorType> {
        Self::parse(syntax.token.text(), syntax.negative)
    }

    /// The literal with its sign flipped
    pub fn negated(self) -> Result<LiteralValue, CompilationErrorType> {
        match self {
            LiteralValue::Integer { unsigned: true, .. } | LiteralValue::Bool(_) => {
                Err(CompilationErrorType::OperatorNotFound)
            }
            LiteralValue::Integer { value, unsigned } => Ok(LiteralValue::Integer {
                value: -value,
                unsigned,
            }),
            LiteralValue::Float(value) => Ok(LiteralValue::Float(-value)),
        }
    }

    /// Kind a literal gets when nothing asks for another one
    pub fn default_kind(self) -> ScalarKind {
        match self {
            LiteralValue::Integer { unsigned: true, .. } => ScalarKind::UnsignedInteger,
            LiteralValue::Integer { .. } => ScalarKind::SignedInteger,
            LiteralValue::Float(_) => ScalarKind::Float,
            LiteralValue::Bool(_) => ScalarKind::Boolean,
        }
    }

    /// Whether the literal can become a value of `kind`
    pub fn fits(self, kind: ScalarKind) -> bool {
        self.bits(kind).is_some()
    }

    /// Little-endian encoding as a value of `kind`
    pub fn encode(self, kind: ScalarKind) -> Option<Vec<u8>> {
        let bits = self.bits(kind)?;
        Some(match kind {
            ScalarKind::Boolean => vec![bits as u8],
            _ => bits.to_le_bytes().to_vec(),
        })
    }

    /// Raw 32-bit pattern as a value of `kind`
    pub fn bits(self, kind: ScalarKind) -> Option<u32> {
        match (self, kind) {
            (LiteralValue::Bool(value), ScalarKind::Boolean) => Some(value as u32),
            (LiteralValue::Integer { value, .. }, ScalarKind::UnsignedInteger) => {
                u32::try_from(value).ok()
            }
            (LiteralValue::Integer { value, unsigned: false }, ScalarKind::SignedInteger) => {
                i32::try_from(value).ok().map(|v| v as u32)
            }
            (LiteralValue::Integer { value, unsigned: false }, ScalarKind::Float) => {
                Some((value as f32).to_bits())
            }
            (LiteralValue::Float(value), ScalarKind::Float) => {
                let narrowed = value as f32;
                narrowed.is_finite().then(|| narrowed.to_bits())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        assert_eq!(
            LiteralValue::parse("5", false),
            Ok(LiteralValue::Integer { value: 5, unsigned: false })
        );
        assert_eq!(
            LiteralValue::parse("5u", false),
            Ok(LiteralValue::Integer { value: 5, unsigned: true })
        );
        assert_eq!(LiteralValue::parse("4.14359", true), Ok(LiteralValue::Float(-4.14359)));
        assert_eq!(LiteralValue::parse("2f", false), Ok(LiteralValue::Float(2.0)));
        assert_eq!(LiteralValue::parse("true", false), Ok(LiteralValue::Bool(true)));
        assert!(LiteralValue::parse("12abc", false).is_err());
        assert!(LiteralValue::parse("3u", true).is_err());
    }

    #[test]
    fn test_fits() {
        let five = LiteralValue::parse("5", false).unwrap();
        assert!(five.fits(ScalarKind::UnsignedInteger));
        assert!(five.fits(ScalarKind::SignedInteger));
        assert!(five.fits(ScalarKind::Float));
        assert!(!five.fits(ScalarKind::Boolean));

        let negative = LiteralValue::parse("1", true).unwrap();
        assert!(!negative.fits(ScalarKind::UnsignedInteger));
        assert_eq!(negative.bits(ScalarKind::SignedInteger), Some(u32::MAX));

        let fraction = LiteralValue::parse("1.5", false).unwrap();
        assert!(!fraction.fits(ScalarKind::UnsignedInteger));
        assert_eq!(fraction.encode(ScalarKind::Float), Some(1.5f32.to_le_bytes().to_vec()));
    }
}
