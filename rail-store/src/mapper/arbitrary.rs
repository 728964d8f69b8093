//! Batched aggregate lookups that do not map to entities.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

use tracing::debug;

use crate::driver::{Connection, DriverError, Row, Value};
use crate::entity::{KeyedValue, Shared, share};
use crate::query::Select;

use super::session::{Pending, SelectSession, SessionSlot, batch_statement};
use super::{MapperError, SelectStrategy, SessionKind, read_rows};

/// A query producing at most one value per key, such as
/// `SELECT train_id, MAX(ordinal) ... GROUP BY train_id`.
pub trait AggregateQuery: 'static {
    type Key: Clone + Eq + Hash + Debug + 'static;
    type Output: 'static;

    /// Column the batch is filtered on.
    const KEY_COLUMN: &'static str;

    /// Unfiltered query; the key predicate is appended per batch.
    fn select() -> Select;

    fn read_key(row: &Row) -> Result<Self::Key, DriverError>;

    /// Value of a row. `None` for a SQL `NULL` aggregate.
    fn read_value(row: &Row) -> Result<Option<Self::Output>, DriverError>;

    fn to_value(key: &Self::Key) -> Value;
}

pub type SharedValue<Q> = Shared<KeyedValue<<Q as AggregateQuery>::Key, <Q as AggregateQuery>::Output>>;

/// Resolves keys to aggregate values with the same session protocol as
/// the entity selectors.
pub struct ArbitrarySelector<Q: AggregateQuery> {
    conn: Rc<dyn Connection>,
    base: Select,
    prepared: bool,
    values: HashMap<Q::Key, SharedValue<Q>>,
    select: SessionSlot<SelectSession<Q::Key, SharedValue<Q>>>,
}

impl<Q: AggregateQuery> ArbitrarySelector<Q> {
    pub fn new(conn: Rc<dyn Connection>) -> Self {
        Self {
            conn,
            base: Q::select(),
            prepared: false,
            values: HashMap::new(),
            select: SessionSlot::new(SessionKind::Select),
        }
    }

    pub fn prepared(mut self, prepared: bool) -> Self {
        self.prepared = prepared;
        self
    }

    pub fn get_cached(&self, key: &Q::Key) -> Option<SharedValue<Q>> {
        self.values.get(key).cloned()
    }

    /// Value holder for `key`, querying when it is new or `force_fill` is
    /// set. Inside a select session the query is deferred to `end_select`.
    pub fn get_by_key(&mut self, key: Q::Key, force_fill: bool) -> Result<SharedValue<Q>, MapperError> {
        let existing = self.values.get(&key).cloned();
        let holder = match existing {
            Some(holder) if !force_fill => return Ok(holder),
            Some(holder) => holder,
            None => {
                let holder = share(KeyedValue::new(key.clone()));
                self.values.insert(key, Rc::clone(&holder));
                holder
            }
        };
        self.fill_by_key(&holder)?;
        Ok(holder)
    }

    pub fn begin_select(&mut self, strategy: SelectStrategy) -> Result<(), MapperError> {
        self.select.begin(SelectSession::new(strategy))
    }

    /// Recompute `holder` now, or register it with the open session.
    pub fn fill_by_key(&mut self, holder: &SharedValue<Q>) -> Result<(), MapperError> {
        let key = holder.borrow().key().clone();
        self.values
            .entry(key.clone())
            .or_insert_with(|| Rc::clone(holder));

        if let Some(session) = self.select.get_mut() {
            return session.pending.register(key, Rc::clone(holder), Rc::ptr_eq);
        }
        self.resolve(SelectStrategy::MultiKey, &Pending::single(key, Rc::clone(holder)))
    }

    pub fn end_select(&mut self) -> Result<(), MapperError> {
        let session = self.select.end()?;
        self.resolve(session.strategy, &session.pending)
    }

    /// Forget the cached value for `key` so the next lookup queries again.
    pub fn invalidate(&mut self, key: &Q::Key) {
        self.values.remove(key);
    }

    /// Recompute every pending holder.
    ///
    /// Values are written only after the whole result has been read. On
    /// failure the pending holders are cleared and dropped from the cache,
    /// so a later lookup queries again instead of reading a stale `None`.
    fn resolve(
        &mut self,
        strategy: SelectStrategy,
        pending: &Pending<Q::Key, SharedValue<Q>>,
    ) -> Result<(), MapperError> {
        if pending.is_empty() {
            return Ok(());
        }
        match self.read_values(strategy, pending) {
            Ok(mut values) => {
                for key in pending.keys() {
                    if let Some(holder) = pending.get(key) {
                        let mut holder = holder.borrow_mut();
                        match values.remove(key) {
                            Some(value) => holder.set(value),
                            None => holder.clear(),
                        }
                    }
                }
                Ok(())
            }
            Err(err) => {
                for key in pending.keys() {
                    if let Some(holder) = pending.get(key) {
                        holder.borrow_mut().clear();
                        if self.values.get(key).is_some_and(|held| Rc::ptr_eq(held, holder)) {
                            self.values.remove(key);
                        }
                    }
                }
                Err(err)
            }
        }
    }

    fn read_values(
        &self,
        strategy: SelectStrategy,
        pending: &Pending<Q::Key, SharedValue<Q>>,
    ) -> Result<HashMap<Q::Key, Q::Output>, MapperError> {
        let keys: Vec<Value> = pending.keys().iter().map(Q::to_value).collect();
        let (stmt, values) = batch_statement(&self.base, strategy, Q::KEY_COLUMN, keys);

        let mut found = HashMap::new();
        let rows = read_rows(&*self.conn, &stmt, self.prepared, values, |row| {
            let key = Q::read_key(&row)?;
            if pending.get(&key).is_some()
                && let Some(value) = Q::read_value(&row)?
            {
                found.insert(key, value);
            }
            Ok(())
        })?;
        debug!(
            table = self.base.table(),
            ?strategy,
            requested = pending.len(),
            rows,
            filled = found.len(),
            "resolved aggregate batch"
        );
        Ok(found)
    }
}
