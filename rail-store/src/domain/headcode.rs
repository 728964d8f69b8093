//! Train reporting numbers.

use std::fmt;

use crate::driver::Value;

/// A standard headcode: digit, uppercase letter, two digits (`1A23`).
///
/// Non-standard reporting numbers (specials, light engines) are not
/// errors; [`Headcode::parse`] returns `None` and the train stores no
/// headcode.
///
/// ```
/// use rail_store::domain::Headcode;
///
/// let hc = Headcode::parse("1A23").unwrap();
/// assert_eq!(hc.class_digit(), '1');
/// assert!(Headcode::parse("ABCD").is_none());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Headcode([u8; 4]);

impl Headcode {
    pub fn parse(s: &str) -> Option<Self> {
        let bytes: [u8; 4] = s.as_bytes().try_into().ok()?;
        let [class, route, a, b] = bytes;
        let standard = class.is_ascii_digit()
            && route.is_ascii_uppercase()
            && a.is_ascii_digit()
            && b.is_ascii_digit();
        standard.then_some(Headcode(bytes))
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    /// Service class, e.g. `1` for express passenger.
    pub fn class_digit(&self) -> char {
        self.0[0] as char
    }

    pub fn route_letter(&self) -> char {
        self.0[1] as char
    }
}

impl fmt::Debug for Headcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Headcode({})", self.as_str())
    }
}

impl fmt::Display for Headcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Headcode> for Value {
    fn from(headcode: Headcode) -> Self {
        super::text(headcode)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn standard_format_parses(s in "[0-9][A-Z][0-9]{2}") {
            prop_assert!(Headcode::parse(&s).is_some());
        }
    }
}
