//! Entity mappers and batch selectors.
//!
//! An [`EntityMapper`] loads and stores one entity type by primary key. The
//! selectors reuse its connection and identity cache to resolve other kinds
//! of lookup: unique alternate keys ([`Selector`]), one-to-many groupings
//! ([`MultiSelector`]) and aggregates that are not entities at all
//! ([`ArbitrarySelector`]).
//!
//! Every lookup has the same two modes. Outside a session it runs one query
//! immediately. Between `begin_select` and `end_select` it only registers the
//! key, and `end_select` resolves every registration with a single query.
//! Writes and deletes follow the same pattern with their own sessions.

mod arbitrary;
mod error;
mod multi;
mod selector;
mod session;

#[cfg(test)]
mod tests;

use std::rc::Rc;

use tracing::debug;

use crate::cache::CacheContainer;
use crate::driver::{Connection, Row, Value};
use crate::entity::{Entity, Shared, UpdatableEntity, share};
use crate::query::{Delete, Filter, Insert, Select, Statement};

pub use arbitrary::{AggregateQuery, ArbitrarySelector};
pub use error::MapperError;
pub use multi::{ForeignKey, MultiSelector};
pub use selector::{AlternateKey, Selector};
pub use session::{SelectStrategy, SessionKind};

use session::{Pending, SelectSession, SessionSlot, batch_statement};

/// Run a row-returning statement and hand each row to `on_row`.
/// Returns the number of rows read.
fn read_rows(
    conn: &dyn Connection,
    stmt: &Statement,
    prepared: bool,
    values: Vec<Value>,
    mut on_row: impl FnMut(Row) -> Result<(), MapperError>,
) -> Result<usize, MapperError> {
    let command = stmt.command(conn, prepared, values)?;
    let mut reader = conn.execute_reader(&command)?;
    let mut count = 0;
    while let Some(row) = reader.read()? {
        count += 1;
        on_row(row)?;
    }
    Ok(count)
}

/// Fill `entity` from `row` and broadcast the update to secondary caches.
fn fill_entity<E: Entity>(
    cache: &CacheContainer<E::Key, E>,
    entity: &Shared<E>,
    row: &Row,
) -> Result<(), MapperError> {
    entity.borrow_mut().fill(row)?;
    cache.on_update(entity);
    Ok(())
}

/// The identity-cached instance for the row's key, filled from the row.
fn adopt_row<E: Entity>(cache: &CacheContainer<E::Key, E>, row: &Row) -> Result<Shared<E>, MapperError> {
    let key = E::read_key(row)?;
    let (entity, _) = cache.get_or_create(key);
    fill_entity(cache, &entity, row)?;
    Ok(entity)
}

fn push_unique<T>(buffer: &mut Vec<Rc<T>>, item: &Rc<T>) {
    if !buffer.iter().any(|held| Rc::ptr_eq(held, item)) {
        buffer.push(Rc::clone(item));
    }
}

/// Primary-key mapper for one entity type.
///
/// Owns a connection handle, a base `SELECT` over the entity's columns and
/// an identity cache. Clone the cache into other mappers or selectors to
/// share identity.
pub struct EntityMapper<E: Entity> {
    conn: Rc<dyn Connection>,
    cache: CacheContainer<E::Key, E>,
    base: Select,
    prepared: bool,
    select: SessionSlot<SelectSession<E::Key, Shared<E>>>,
    updates: SessionSlot<Vec<Shared<E>>>,
    deletes: SessionSlot<Vec<E::Key>>,
}

impl<E: Entity> EntityMapper<E> {
    pub fn new(conn: Rc<dyn Connection>) -> Self {
        Self::with_cache(conn, CacheContainer::new())
    }

    /// A mapper sharing an existing identity cache.
    pub fn with_cache(conn: Rc<dyn Connection>, cache: CacheContainer<E::Key, E>) -> Self {
        let table = E::TABLE;
        Self {
            conn,
            cache,
            base: Select::from(table.name).columns(table.all_columns()),
            prepared: false,
            select: SessionSlot::new(SessionKind::Select),
            updates: SessionSlot::new(SessionKind::Update),
            deletes: SessionSlot::new(SessionKind::Delete),
        }
    }

    /// Ask the driver to prepare every command this mapper issues.
    pub fn prepared(mut self, prepared: bool) -> Self {
        self.prepared = prepared;
        self
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn cache(&self) -> &CacheContainer<E::Key, E> {
        &self.cache
    }

    pub fn connection(&self) -> &Rc<dyn Connection> {
        &self.conn
    }

    /// Base query selecting every mapped column.
    pub fn base_select(&self) -> &Select {
        &self.base
    }

    /// Load `key`, always querying.
    pub fn get(&mut self, key: E::Key) -> Result<Shared<E>, MapperError> {
        self.get_by_key(key, true)
    }

    /// The cached instance for `key`, creating a placeholder if needed.
    ///
    /// The store is queried when the instance is new or `force_fill` is set.
    /// Inside a select session the query is deferred to `end_select` and the
    /// returned instance stays unfilled until then. A key with no row
    /// yields an unfilled instance.
    pub fn get_by_key(&mut self, key: E::Key, force_fill: bool) -> Result<Shared<E>, MapperError> {
        let (entity, existed) = self.cache.get_or_create(key);
        if !existed || force_fill {
            self.fill_by_key(&entity)?;
        }
        Ok(entity)
    }

    pub fn begin_select(&mut self, strategy: SelectStrategy) -> Result<(), MapperError> {
        self.select.begin(SelectSession::new(strategy))
    }

    /// Fill `entity` from the store, or register it with the open session.
    ///
    /// Records that were never inserted have nothing to load.
    pub fn fill_by_key(&mut self, entity: &Shared<E>) -> Result<(), MapperError> {
        let key = entity
            .borrow()
            .key()
            .persisted()
            .cloned()
            .ok_or(MapperError::UnsavedEntity { table: E::TABLE.name })?;

        if let Some(session) = self.select.get_mut() {
            return session.pending.register(key, Rc::clone(entity), Rc::ptr_eq);
        }
        self.resolve(SelectStrategy::MultiKey, &Pending::single(key, Rc::clone(entity)))
    }

    /// Resolve every registration of the open session with one query.
    pub fn end_select(&mut self) -> Result<(), MapperError> {
        let session = self.select.end()?;
        self.resolve(session.strategy, &session.pending)
    }

    /// Every row of the table, through the identity cache.
    pub fn get_all(&mut self) -> Result<Vec<Shared<E>>, MapperError> {
        let stmt = self.base.build();
        let mut entities = Vec::new();
        let rows = read_rows(&*self.conn, &stmt, self.prepared, Vec::new(), |row| {
            entities.push(adopt_row(&self.cache, &row)?);
            Ok(())
        })?;
        debug!(table = E::TABLE.name, rows, "loaded full table");
        Ok(entities)
    }

    fn resolve(
        &self,
        strategy: SelectStrategy,
        pending: &Pending<E::Key, Shared<E>>,
    ) -> Result<(), MapperError> {
        if pending.is_empty() {
            return Ok(());
        }
        let keys: Vec<Value> = pending.keys().iter().cloned().map(Into::into).collect();
        let (stmt, values) = batch_statement(&self.base, strategy, E::TABLE.key_column, keys);

        let mut filled = 0;
        let mut ignored = 0;
        let rows = read_rows(&*self.conn, &stmt, self.prepared, values, |row| {
            let key = E::read_key(&row)?;
            match pending.get(&key) {
                Some(entity) => {
                    fill_entity(&self.cache, entity, &row)?;
                    filled += 1;
                }
                None => ignored += 1,
            }
            Ok(())
        })?;
        debug!(
            table = E::TABLE.name,
            ?strategy,
            requested = pending.len(),
            rows,
            filled,
            ignored,
            "resolved select batch"
        );
        Ok(())
    }

    pub fn begin_delete(&mut self) -> Result<(), MapperError> {
        self.deletes.begin(Vec::new())
    }

    /// Delete the row for `key` now, or at `end_delete` inside a session.
    pub fn delete(&mut self, key: E::Key) -> Result<(), MapperError> {
        if let Some(buffer) = self.deletes.get_mut() {
            if !buffer.contains(&key) {
                buffer.push(key);
            }
            return Ok(());
        }
        self.flush_deletes(vec![key])
    }

    /// Delete by entity. A record that was never inserted is only dropped
    /// from the cache.
    pub fn delete_entity(&mut self, entity: &Shared<E>) -> Result<(), MapperError> {
        let key = entity.borrow().key().persisted().cloned();
        match key {
            Some(key) => self.delete(key),
            None => {
                self.cache.forget_unsaved(entity);
                Ok(())
            }
        }
    }

    pub fn end_delete(&mut self) -> Result<(), MapperError> {
        let keys = self.deletes.end()?;
        self.flush_deletes(keys)
    }

    fn flush_deletes(&self, keys: Vec<E::Key>) -> Result<(), MapperError> {
        if keys.is_empty() {
            return Ok(());
        }
        let table = E::TABLE;
        let stmt = Delete::from(table.name)
            .where_in(table.key_column, keys.len())
            .build();
        let command = stmt.command(&*self.conn, self.prepared, keys.iter().cloned().map(Into::into))?;
        let affected = self.conn.execute_non_query(&command)?;
        for key in &keys {
            self.cache.evict(key);
        }
        debug!(table = table.name, requested = keys.len(), affected, "deleted batch");
        Ok(())
    }
}

impl<E: UpdatableEntity> EntityMapper<E> {
    /// Adopt a caller-constructed record into the identity cache.
    pub fn track(&self, entity: E) -> Result<Shared<E>, MapperError> {
        let entity = share(entity);
        self.cache.track(&entity)?;
        Ok(entity)
    }

    pub fn begin_update(&mut self) -> Result<(), MapperError> {
        self.updates.begin(Vec::new())
    }

    /// Upsert `entity` now, or at `end_update` inside a session.
    pub fn update(&mut self, entity: &Shared<E>) -> Result<(), MapperError> {
        if let Some(buffer) = self.updates.get_mut() {
            push_unique(buffer, entity);
            return Ok(());
        }
        self.flush_updates(vec![Rc::clone(entity)])
    }

    pub fn end_update(&mut self) -> Result<(), MapperError> {
        let buffer = self.updates.end()?;
        self.flush_updates(buffer)
    }

    /// Write every cached entity with unsaved changes.
    /// Returns how many were written (or buffered, inside a session).
    pub fn update_save_cache(&mut self) -> Result<usize, MapperError> {
        let dirty: Vec<Shared<E>> = self
            .cache
            .entities()
            .into_iter()
            .filter(|e| e.borrow().is_changed())
            .collect();
        let count = dirty.len();
        match self.updates.get_mut() {
            Some(buffer) => dirty.iter().for_each(|e| push_unique(buffer, e)),
            None => self.flush_updates(dirty)?,
        }
        Ok(count)
    }

    fn flush_updates(&self, entities: Vec<Shared<E>>) -> Result<(), MapperError> {
        let (fresh, persisted): (Vec<_>, Vec<_>) =
            entities.into_iter().partition(|e| e.borrow().key().is_new());
        self.upsert(&persisted, true)?;
        self.upsert(&fresh, false)
    }

    /// One multi-row upsert. Persisted records conflict on the key column;
    /// new records omit it and conflict on the table's natural key.
    fn upsert(&self, batch: &[Shared<E>], with_key: bool) -> Result<(), MapperError> {
        if batch.is_empty() {
            return Ok(());
        }
        let table = E::TABLE;
        let key_column = [table.key_column];
        let mut columns: Vec<&str> = Vec::with_capacity(table.columns.len() + 1);
        if with_key {
            columns.push(table.key_column);
        }
        columns.extend(table.columns.iter().copied());

        let conflict: &[&str] = if with_key { &key_column } else { table.upsert_key };
        let mut insert = Insert::into(table.name)
            .columns(columns.iter().copied())
            .rows(batch.len())
            .returning(table.all_columns());
        if !conflict.is_empty() {
            insert = insert.on_duplicate_key(conflict.iter().copied());
        }
        let stmt = insert.build();

        let mut values = Vec::with_capacity(stmt.params.len());
        for entity in batch {
            let entity = entity.borrow();
            if with_key && let Some(key) = entity.key().persisted() {
                values.push(key.clone().into());
            }
            values.extend(entity.write_values());
        }

        let mut returned = Vec::with_capacity(batch.len());
        read_rows(&*self.conn, &stmt, self.prepared, values, |row| {
            returned.push(row);
            Ok(())
        })?;
        if returned.len() != batch.len() {
            return Err(MapperError::ReturningMismatch {
                table: table.name,
                expected: batch.len(),
                actual: returned.len(),
            });
        }

        for (entity, row) in batch.iter().zip(&returned) {
            self.fold_saved(entity, row)?;
        }
        debug!(table = table.name, rows = batch.len(), with_key, "upserted batch");
        Ok(())
    }

    /// Write a returned row into the saved instance and reconcile it with
    /// the identity cache. An instance already cached under the key absorbs
    /// the new state and stays the canonical one.
    fn fold_saved(&self, entity: &Shared<E>, row: &Row) -> Result<(), MapperError> {
        let key = E::read_key(row)?;
        {
            let mut saved = entity.borrow_mut();
            saved.fill(row)?;
            saved.on_saved();
        }
        match self.cache.get(&key) {
            Some(held) if !Rc::ptr_eq(&held, entity) => {
                {
                    let mut held_mut = held.borrow_mut();
                    held_mut.fill_from(&entity.borrow());
                    held_mut.on_saved();
                }
                self.cache.forget_unsaved(entity);
                self.cache.on_update(&held);
            }
            _ => {
                self.cache.promote(key, entity);
                self.cache.on_update(entity);
            }
        }
        Ok(())
    }
}
