//! Inline instrument identifiers.
//!
//! A [`Symbol`] stores up to [`SYMBOL_LEN`] bytes of UTF-8 inline, padded
//! with NULs. It is `Copy`, so a producer encodes its instrument once and
//! stamps every trade with it without touching the allocator.

use std::fmt;

/// Maximum instrument length in bytes.
pub const SYMBOL_LEN: usize = 32;

/// A NUL-padded, fixed-capacity instrument identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Symbol([u8; SYMBOL_LEN]);

impl Symbol {
    /// Encode `name`. Names longer than [`SYMBOL_LEN`] bytes are cut at the
    /// last character boundary that fits; config validation rejects them
    /// before they get here.
    pub fn new(name: &str) -> Self {
        let end = (0..=name.len().min(SYMBOL_LEN)).rev().find(|&i| name.is_char_boundary(i)).unwrap_or(0);
        let mut bytes = [0u8; SYMBOL_LEN];
        bytes[..end].copy_from_slice(&name.as_bytes()[..end]);
        Self(bytes)
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(SYMBOL_LEN);
        // `new` only ever stores a whole-character prefix of a `&str`.
        std::str::from_utf8(&self.0[..len]).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instrument_names_survive_encoding() {
        for name in ["MSFTO.O", "AAPL.OQ", "NVDA.O", "META.O"] {
            assert_eq!(Symbol::new(name).as_str(), name);
        }
        assert_eq!(Symbol::from("META.O").to_string(), "META.O");
    }

    #[test]
    fn empty_and_full_width() {
        assert!(Symbol::new("").is_empty());
        assert!(Symbol::default().is_empty());

        let wide = "Z".repeat(SYMBOL_LEN);
        assert_eq!(Symbol::new(&wide).as_str(), wide);
    }

    #[test]
    fn overlong_names_cut_on_char_boundary() {
        assert_eq!(Symbol::new(&"Q".repeat(SYMBOL_LEN + 5)).as_str().len(), SYMBOL_LEN);

        // 31 ASCII bytes, then a 2-byte character crossing the limit.
        let name = format!("{}é", "A".repeat(SYMBOL_LEN - 1));
        assert_eq!(Symbol::new(&name).as_str(), "A".repeat(SYMBOL_LEN - 1));
    }

    #[test]
    fn debug_shows_name() {
        assert_eq!(format!("{:?}", Symbol::new("NVDA.O")), "Symbol(\"NVDA.O\")");
    }
}
