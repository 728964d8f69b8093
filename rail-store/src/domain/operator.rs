//! Operator codes.

use std::fmt;

use crate::driver::Value;

/// Error returned when parsing an invalid ATOC code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid ATOC code {input:?}: {reason}")]
pub struct InvalidAtocCode {
    input: String,
    reason: &'static str,
}

/// A 2-letter ATOC train operator code such as `GW` or `XC`.
///
/// ```
/// use rail_store::domain::AtocCode;
///
/// assert_eq!(AtocCode::parse("GW").unwrap().as_str(), "GW");
/// assert!(AtocCode::parse("GWR").is_err());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtocCode([u8; 2]);

impl AtocCode {
    pub fn parse(s: &str) -> Result<Self, InvalidAtocCode> {
        let invalid = |reason| InvalidAtocCode {
            input: s.to_string(),
            reason,
        };
        let bytes: [u8; 2] = s
            .as_bytes()
            .try_into()
            .map_err(|_| invalid("must be exactly 2 characters"))?;
        if !bytes.iter().all(u8::is_ascii_uppercase) {
            return Err(invalid("must be uppercase ASCII letters A-Z"));
        }
        Ok(AtocCode(bytes))
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl fmt::Debug for AtocCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AtocCode({})", self.as_str())
    }
}

impl fmt::Display for AtocCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<AtocCode> for Value {
    fn from(code: AtocCode) -> Self {
        super::text(code)
    }
}
