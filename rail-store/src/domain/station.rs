//! Station reservation codes.

use std::fmt;

use crate::driver::Value;

/// Error returned when parsing an invalid CRS code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid CRS code {input:?}: {reason}")]
pub struct InvalidCrs {
    input: String,
    reason: &'static str,
}

/// A 3-letter CRS station code, stored uppercase.
///
/// # Examples
///
/// ```
/// use rail_store::domain::Crs;
///
/// let kgx = Crs::parse("KGX").unwrap();
/// assert_eq!(kgx.as_str(), "KGX");
/// assert!(Crs::parse("kgx").is_err());
///
/// // Feed data is often lowercase or padded
/// assert_eq!(Crs::parse_lenient(" kgx "), Ok(kgx));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Crs([u8; 3]);

impl Crs {
    /// Parse exactly 3 uppercase ASCII letters.
    pub fn parse(s: &str) -> Result<Self, InvalidCrs> {
        let invalid = |reason| InvalidCrs {
            input: s.to_string(),
            reason,
        };
        let bytes: [u8; 3] = s
            .as_bytes()
            .try_into()
            .map_err(|_| invalid("must be exactly 3 characters"))?;
        if !bytes.iter().all(u8::is_ascii_uppercase) {
            return Err(invalid("must be uppercase ASCII letters A-Z"));
        }
        Ok(Crs(bytes))
    }

    /// Trim and uppercase before parsing.
    pub fn parse_lenient(s: &str) -> Result<Self, InvalidCrs> {
        Self::parse(&s.trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl fmt::Debug for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Crs({})", self.as_str())
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Crs> for Value {
    fn from(crs: Crs) -> Self {
        super::text(crs)
    }
}
