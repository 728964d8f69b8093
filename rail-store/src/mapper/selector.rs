//! Lookups by unique alternate key.

use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;
use std::rc::Rc;

use tracing::debug;

use crate::cache::{CacheContainer, SecondaryHandle};
use crate::driver::{Connection, DriverError, Row, Value};
use crate::entity::{Entity, Shared};
use crate::query::Select;

use super::session::{SelectSession, SessionSlot, batch_statement};
use super::{EntityMapper, MapperError, SelectStrategy, SessionKind, adopt_row, read_rows};

/// A unique column other than the primary key.
///
/// Implemented on a marker type so one entity can have several.
pub trait AlternateKey<E: Entity>: 'static {
    type Key: Clone + Eq + Hash + Debug + 'static;

    /// Name of the secondary cache in the shared [`CacheContainer`].
    const CACHE_NAME: &'static str;

    /// Column holding the key.
    const COLUMN: &'static str;

    /// The entity's current key, or `None` if it should not be indexed.
    fn key_of(entity: &E) -> Option<Self::Key>;

    fn read_key(row: &Row) -> Result<Self::Key, DriverError>;

    fn to_value(key: &Self::Key) -> Value;
}

/// Resolves unique alternate keys to identity-cached entities.
///
/// Results live in a secondary cache of the mapper's container, so an
/// entity loaded here is the same instance the mapper hands out by primary
/// key, and vice versa.
pub struct Selector<A: AlternateKey<E>, E: Entity> {
    conn: Rc<dyn Connection>,
    cache: CacheContainer<E::Key, E>,
    index: SecondaryHandle<A::Key, E>,
    base: Select,
    prepared: bool,
    select: SessionSlot<SelectSession<A::Key, ()>>,
    _key: PhantomData<A>,
}

impl<A: AlternateKey<E>, E: Entity> Selector<A, E> {
    pub fn new(mapper: &EntityMapper<E>) -> Result<Self, MapperError> {
        let cache = mapper.cache().clone();
        let index = cache.request_cache(A::CACHE_NAME, A::key_of)?;
        Ok(Self {
            conn: Rc::clone(mapper.connection()),
            cache,
            index,
            base: mapper.base_select().clone(),
            prepared: mapper.is_prepared(),
            select: SessionSlot::new(SessionKind::Select),
            _key: PhantomData,
        })
    }

    /// Cached entity for `key`, filled or not.
    pub fn get_cached(&self, key: &A::Key) -> Option<Shared<E>> {
        self.index.borrow().get(key)
    }

    /// Entity for `key`, querying unless a filled one is cached.
    ///
    /// Inside a select session the key is registered and whatever is cached
    /// right now is returned; read the result with [`Selector::get_cached`]
    /// after `end_select`. `None` means no row has the key.
    pub fn get_by_key(&mut self, key: A::Key, force_fill: bool) -> Result<Option<Shared<E>>, MapperError> {
        if !force_fill && let Some(entity) = self.filled(&key) {
            return Ok(Some(entity));
        }
        if self.select.is_open() {
            self.fill_by_key(key.clone())?;
            return Ok(self.get_cached(&key));
        }
        let matched = self.resolve(SelectStrategy::MultiKey, std::slice::from_ref(&key))?;
        if matched.contains(&key) {
            Ok(self.filled(&key))
        } else {
            Ok(None)
        }
    }

    pub fn begin_select(&mut self, strategy: SelectStrategy) -> Result<(), MapperError> {
        self.select.begin(SelectSession::new(strategy))
    }

    /// Load `key` now, or register it with the open session.
    pub fn fill_by_key(&mut self, key: A::Key) -> Result<(), MapperError> {
        if let Some(session) = self.select.get_mut() {
            return session.pending.register(key, (), |_, _| true);
        }
        self.resolve(SelectStrategy::MultiKey, std::slice::from_ref(&key))?;
        Ok(())
    }

    pub fn end_select(&mut self) -> Result<(), MapperError> {
        let session = self.select.end()?;
        self.resolve(session.strategy, session.pending.keys())?;
        Ok(())
    }

    fn filled(&self, key: &A::Key) -> Option<Shared<E>> {
        self.get_cached(key).filter(|e| e.borrow().is_filled())
    }

    /// Load `keys` and return the ones a row matched. Keys that matched
    /// nothing are dropped from the index, so a row deleted or re-keyed in
    /// the store stops resolving to its old entity.
    fn resolve(&self, strategy: SelectStrategy, keys: &[A::Key]) -> Result<HashSet<A::Key>, MapperError> {
        let mut matched = HashSet::new();
        if keys.is_empty() {
            return Ok(matched);
        }
        let (stmt, values) =
            batch_statement(&self.base, strategy, A::COLUMN, keys.iter().map(A::to_value).collect());
        let wanted: HashSet<&A::Key> = keys.iter().collect();

        let mut ignored = 0;
        let rows = read_rows(&*self.conn, &stmt, self.prepared, values, |row| {
            let key = A::read_key(&row)?;
            if wanted.contains(&key) {
                adopt_row(&self.cache, &row)?;
                matched.insert(key);
            } else {
                ignored += 1;
            }
            Ok(())
        })?;

        let mut index = self.index.borrow_mut();
        for key in keys.iter().filter(|key| !matched.contains(*key)) {
            index.forget(key);
        }
        drop(index);

        debug!(
            table = E::TABLE.name,
            index = A::CACHE_NAME,
            ?strategy,
            requested = keys.len(),
            rows,
            filled = matched.len(),
            ignored,
            "resolved alternate key batch"
        );
        Ok(matched)
    }
}
