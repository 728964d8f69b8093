//! Entity base types.
//!
//! An entity mirrors one relational row and is identified by its key.
//! Once a mapper publishes an entity into a cache it is handed out as a
//! [`Shared`] handle, and every later fill mutates that same allocation so
//! all holders observe the update.

mod collection;
mod keyed;

use std::cell::RefCell;
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

use crate::driver::{DriverError, FromValue, Row, Value};

pub use collection::{CollectionError, EntityCollection, EntityList, Ordinal, OrdinalCollection};
pub use keyed::KeyedValue;

/// Shared, in-place mutable handle to a cached record.
pub type Shared<T> = Rc<RefCell<T>>;

/// Wrap a value in a [`Shared`] handle.
pub fn share<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

/// Bounds required of a primary key.
pub trait KeyType: Clone + Eq + Hash + Debug + Into<Value> + FromValue + 'static {}

impl<T> KeyType for T where T: Clone + Eq + Hash + Debug + Into<Value> + FromValue + 'static {}

/// Identity of a record: not yet inserted, or stored under a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey<K> {
    New,
    Persisted(K),
}

impl<K> EntityKey<K> {
    pub fn is_new(&self) -> bool {
        matches!(self, EntityKey::New)
    }

    pub fn persisted(&self) -> Option<&K> {
        match self {
            EntityKey::New => None,
            EntityKey::Persisted(key) => Some(key),
        }
    }
}

/// Identity and load state embedded in every entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityState<K> {
    key: EntityKey<K>,
    filled: bool,
}

impl<K> EntityState<K> {
    /// State of a record that has not been inserted yet.
    pub fn new() -> Self {
        Self {
            key: EntityKey::New,
            filled: false,
        }
    }

    /// State of a placeholder created for `key` before its row is loaded.
    pub fn placeholder(key: K) -> Self {
        Self {
            key: EntityKey::Persisted(key),
            filled: false,
        }
    }

    pub fn key(&self) -> &EntityKey<K> {
        &self.key
    }

    pub fn is_filled(&self) -> bool {
        self.filled
    }

    fn loaded(&mut self, key: K) {
        self.key = EntityKey::Persisted(key);
        self.filled = true;
    }
}

impl<K: Clone> EntityState<K> {
    /// Copy key and fill state from `other`.
    pub fn copy_from(&mut self, other: &Self) {
        self.key = other.key.clone();
        self.filled = other.filled;
    }
}

impl<K> Default for EntityState<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Dirty bit of an [`UpdatableEntity`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeState {
    changed: bool,
}

impl ChangeState {
    /// State of a record that has local data not yet written.
    pub fn dirty() -> Self {
        Self { changed: true }
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }
}

/// Relational layout of an entity's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDef {
    pub name: &'static str,
    pub key_column: &'static str,
    /// Mapped columns other than the key, in the order of
    /// [`UpdatableEntity::write_values`].
    pub columns: &'static [&'static str],
    /// Natural uniqueness key used as the upsert target for records that
    /// have no primary key yet. Empty means plain insert.
    pub upsert_key: &'static [&'static str],
}

impl TableDef {
    /// Key column followed by the mapped columns.
    pub fn all_columns(&self) -> Vec<&'static str> {
        std::iter::once(self.key_column)
            .chain(self.columns.iter().copied())
            .collect()
    }
}

/// A key-identified record mirroring one row.
pub trait Entity: Sized + 'static {
    type Key: KeyType;

    /// Table the entity maps to.
    const TABLE: TableDef;

    /// An empty, unfilled instance for `key`.
    fn placeholder(key: Self::Key) -> Self;

    fn state(&self) -> &EntityState<Self::Key>;

    fn state_mut(&mut self) -> &mut EntityState<Self::Key>;

    /// Copy every mapped non-key column from `row` into `self`.
    fn read_row(&mut self, row: &Row) -> Result<(), DriverError>;

    /// Populate from one row and mark the entity filled.
    ///
    /// This is the only path from unfilled to filled. The key is taken
    /// from the row, so a `New` record becomes persisted here.
    fn fill(&mut self, row: &Row) -> Result<(), DriverError> {
        let key = Self::read_key(row)?;
        self.read_row(row)?;
        self.state_mut().loaded(key);
        Ok(())
    }

    fn key(&self) -> &EntityKey<Self::Key> {
        self.state().key()
    }

    fn is_filled(&self) -> bool {
        self.state().is_filled()
    }

    /// Primary key of a row of this table.
    fn read_key(row: &Row) -> Result<Self::Key, DriverError> {
        row.get_as(Self::TABLE.key_column)
    }

    /// Identity equality: same type and same persisted key.
    /// Records that were never inserted have no identity to compare.
    fn same_identity(&self, other: &Self) -> bool {
        match (self.key(), other.key()) {
            (EntityKey::Persisted(a), EntityKey::Persisted(b)) => a == b,
            _ => false,
        }
    }
}

/// An entity that can be written back, with change tracking.
pub trait UpdatableEntity: Entity {
    fn changes(&self) -> &ChangeState;

    fn changes_mut(&mut self) -> &mut ChangeState;

    /// Merge a freshly loaded instance into this one without replacing it.
    ///
    /// Must copy every mapped field and the fill state.
    fn fill_from(&mut self, other: &Self);

    /// Values for [`TableDef::columns`], in that order.
    fn write_values(&self) -> Vec<Value>;

    /// Called by every property setter.
    fn on_change(&mut self) {
        self.changes_mut().changed = true;
    }

    /// Called after a successful write.
    fn on_saved(&mut self) {
        self.changes_mut().changed = false;
    }

    fn is_changed(&self) -> bool {
        self.changes().is_changed()
    }
}
