use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Declaration modifiers of types, fields and methods
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers(u16);

impl Modifiers {
    /// No modifiers
    pub const NONE: Modifiers = Modifiers(0);
    /// `public`
    pub const PUBLIC: Modifiers = Modifiers(1);
    /// `private`
    pub const PRIVATE: Modifiers = Modifiers(1 << 1);
    /// `internal`
    pub const INTERNAL: Modifiers = Modifiers(1 << 2);
    /// `static`
    pub const STATIC: Modifiers = Modifiers(1 << 3);
    /// `abstract`
    pub const ABSTRACT: Modifiers = Modifiers(1 << 4);
    /// `extern`: body supplied by the backend
    pub const EXTERN: Modifiers = Modifiers(1 << 5);

    const KEYWORDS: [(&'static str, Modifiers); 6] = [
        ("public", Modifiers::PUBLIC),
        ("private", Modifiers::PRIVATE),
        ("internal", Modifiers::INTERNAL),
        ("static", Modifiers::STATIC),
        ("abstract", Modifiers::ABSTRACT),
        ("extern", Modifiers::EXTERN),
    ];

    /// Raw bits
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Rebuilds modifiers from raw bits, dropping unknown ones
    pub const fn from_bits_truncate(bits: u16) -> Self {
        Modifiers(bits & 0b11_1111)
    }

    /// Whether every bit of `other` is set
    pub const fn contains(self, other: Modifiers) -> bool {
        self.0 & other.0 == other.0
    }

    /// Modifier spelled by `keyword`
    pub fn from_keyword(keyword: &str) -> Option<Modifiers> {
        Self::KEYWORDS
            .iter()
            .find(|(name, _)| *name == keyword)
            .map(|(_, modifier)| *modifier)
    }
}

impl BitOr for Modifiers {
    type Output = Modifiers;

    fn bitor(self, rhs: Modifiers) -> Modifiers {
        Modifiers(self.0 | rhs.0)
    }
}

impl BitOrAssign for Modifiers {
    fn bitor_assign(&mut self, rhs: Modifiers) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::KEYWORDS
            .iter()
            .filter(|(_, modifier)| self.contains(*modifier))
            .map(|(name, _)| *name)
            .collect();
        write!(f, "Modifiers({})", names.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords() {
        let modifiers = Modifiers::from_keyword("public").unwrap() | Modifiers::STATIC;
        assert!(modifiers.contains(Modifiers::PUBLIC));
        assert!(modifiers.contains(Modifiers::STATIC));
        assert!(!modifiers.contains(Modifiers::ABSTRACT));
        assert_eq!(Modifiers::from_keyword("virtual"), None);
        assert_eq!(Modifiers::from_bits_truncate(modifiers.bits()), modifiers);
    }
}
