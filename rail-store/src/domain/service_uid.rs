//! Timetable service identifiers.

use std::fmt;

use crate::driver::Value;

/// Error returned for an empty service UID.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid service UID: {reason}")]
pub struct InvalidServiceUid {
    reason: &'static str,
}

/// Opaque timetable identifier of a service, such as `P12345`.
///
/// Unique per service but not per day: a train row is keyed by the UID
/// together with its run date.
///
/// ```
/// use rail_store::domain::ServiceUid;
///
/// let uid = ServiceUid::new("P12345").unwrap();
/// assert_eq!(uid.as_str(), "P12345");
/// assert!(ServiceUid::new("  ").is_err());
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceUid(String);

impl ServiceUid {
    /// Surrounding whitespace is trimmed; the rest must be non-empty.
    pub fn new(s: impl AsRef<str>) -> Result<Self, InvalidServiceUid> {
        let trimmed = s.as_ref().trim();
        if trimmed.is_empty() {
            return Err(InvalidServiceUid {
                reason: "service UID cannot be empty",
            });
        }
        Ok(ServiceUid(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for ServiceUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceUid({})", self.0)
    }
}

impl fmt::Display for ServiceUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<ServiceUid> for Value {
    fn from(uid: ServiceUid) -> Self {
        Value::Text(uid.0)
    }
}
