//! Mapper error types.

use crate::driver::DriverError;
use crate::entity::CollectionError;

use super::session::SessionKind;

/// Errors from mappers and selectors.
///
/// Session misuse variants are programming errors and are reported as
/// soon as the misuse happens. A key with no matching row is never an
/// error: it surfaces as an unfilled entity or an empty value.
#[derive(Debug, thiserror::Error)]
pub enum MapperError {
    /// Begin called while a session of the same kind is open
    #[error("{0} session already open")]
    SessionAlreadyOpen(SessionKind),

    /// End called with no open session
    #[error("no {0} session open")]
    NoSession(SessionKind),

    /// A different instance was registered for a key already pending
    #[error("key {key} is already registered with a different instance")]
    DuplicateRegistration { key: String },

    /// Operation needs a persisted key but the record was never inserted
    #[error("{table} record has no key yet")]
    UnsavedEntity { table: &'static str },

    /// A secondary cache name was reused with a different key type
    #[error("secondary cache {name} is registered with a different key type")]
    CacheTypeMismatch { name: String },

    /// A second instance was offered for a key that is already cached
    #[error("key {key} is already cached as a different instance")]
    IdentityConflict { key: String },

    /// An upsert returned a different number of rows than it wrote
    #[error("upsert into {table} returned {actual} rows for {expected} written")]
    ReturningMismatch {
        table: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Collection invariant violated while loading children
    #[error(transparent)]
    Collection(#[from] CollectionError),

    /// Driver failure, passed through unchanged
    #[error(transparent)]
    Driver(#[from] DriverError),
}
