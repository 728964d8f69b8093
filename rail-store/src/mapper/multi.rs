//! One-to-many lookups into entity collections.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;
use std::rc::Rc;

use tracing::debug;

use crate::cache::CacheContainer;
use crate::driver::{Connection, DriverError, Row, Value};
use crate::entity::{Entity, EntityCollection, Shared, share};
use crate::query::{Order, Select};

use super::session::{Pending, SelectSession, SessionSlot, batch_statement};
use super::{EntityMapper, MapperError, SelectStrategy, SessionKind, adopt_row, read_rows};

/// A non-unique column grouping child rows under a parent key.
pub trait ForeignKey<E: Entity>: 'static {
    type Group: Clone + Eq + Hash + Debug + 'static;

    /// Column holding the group key.
    const COLUMN: &'static str;

    /// Column to order each batch by, if arrival order matters.
    const ORDER_BY: Option<&'static str> = None;

    /// Group key of a child row.
    fn collection_key(row: &Row) -> Result<Self::Group, DriverError>;

    fn to_value(group: &Self::Group) -> Value;
}

/// Resolves group keys to collections of identity-cached children.
///
/// Each row is matched twice: its group key selects the pending
/// collection, and its primary key selects the cached child instance that
/// is filled and appended. Children evicted from the identity cache (for
/// example by a mapper delete) are removed from every cached collection.
pub struct MultiSelector<F, E, C>
where
    F: ForeignKey<E>,
    E: Entity,
    C: EntityCollection<E, Group = F::Group>,
{
    conn: Rc<dyn Connection>,
    cache: CacheContainer<E::Key, E>,
    base: Select,
    prepared: bool,
    collections: Rc<RefCell<HashMap<F::Group, Shared<C>>>>,
    select: SessionSlot<SelectSession<F::Group, Shared<C>>>,
    _key: PhantomData<F>,
}

impl<F, E, C> MultiSelector<F, E, C>
where
    F: ForeignKey<E>,
    E: Entity,
    C: EntityCollection<E, Group = F::Group>,
{
    pub fn new(mapper: &EntityMapper<E>) -> Self {
        let mut base = mapper.base_select().clone();
        if let Some(column) = F::ORDER_BY {
            base = base.order_by(column, Order::Asc);
        }
        let cache = mapper.cache().clone();
        let collections: Rc<RefCell<HashMap<F::Group, Shared<C>>>> = Rc::default();
        let watched = Rc::downgrade(&collections);
        cache.on_evict(move |child: &Shared<E>| {
            if let Some(collections) = watched.upgrade() {
                for collection in collections.borrow().values() {
                    collection.borrow_mut().remove(child);
                }
            }
        });
        Self {
            conn: Rc::clone(mapper.connection()),
            cache,
            base,
            prepared: mapper.is_prepared(),
            collections,
            select: SessionSlot::new(SessionKind::Select),
            _key: PhantomData,
        }
    }

    pub fn get_cached(&self, group: &F::Group) -> Option<Shared<C>> {
        self.collections.borrow().get(group).cloned()
    }

    /// Collection for `group`, querying unless a filled one is cached or
    /// when `force_fill` is set. Inside a select session the query is
    /// deferred to `end_select`. A group with no rows yields an empty,
    /// filled collection.
    pub fn get_by_key(&mut self, group: F::Group, force_fill: bool) -> Result<Shared<C>, MapperError> {
        let existing = self.get_cached(&group);
        let collection = match existing {
            Some(collection) if !force_fill && collection.borrow().is_filled() => {
                return Ok(collection);
            }
            Some(collection) => collection,
            None => {
                let collection = share(C::new(group.clone()));
                self.collections
                    .borrow_mut()
                    .insert(group, Rc::clone(&collection));
                collection
            }
        };
        self.fill_by_key(&collection)?;
        Ok(collection)
    }

    pub fn begin_select(&mut self, strategy: SelectStrategy) -> Result<(), MapperError> {
        self.select.begin(SelectSession::new(strategy))
    }

    /// Refill `collection` now, or register it with the open session.
    pub fn fill_by_key(&mut self, collection: &Shared<C>) -> Result<(), MapperError> {
        let group = collection.borrow().group().clone();
        self.collections
            .borrow_mut()
            .entry(group.clone())
            .or_insert_with(|| Rc::clone(collection));

        if let Some(session) = self.select.get_mut() {
            return session.pending.register(group, Rc::clone(collection), Rc::ptr_eq);
        }
        self.resolve(SelectStrategy::MultiKey, &Pending::single(group, Rc::clone(collection)))
    }

    pub fn end_select(&mut self) -> Result<(), MapperError> {
        let session = self.select.end()?;
        self.resolve(session.strategy, &session.pending)
    }

    /// Load every pending group and replace the collections' members.
    ///
    /// Members are only swapped in once every row has been read. If reading
    /// or inserting fails, each pending collection is left empty and
    /// unfilled so the next lookup queries again.
    fn resolve(
        &self,
        strategy: SelectStrategy,
        pending: &Pending<F::Group, Shared<C>>,
    ) -> Result<(), MapperError> {
        if pending.is_empty() {
            return Ok(());
        }
        let loaded = self
            .read_members(strategy, pending)
            .and_then(|members| install(pending, members));
        if loaded.is_err() {
            for collection in pending.values() {
                let mut collection = collection.borrow_mut();
                collection.clear();
                collection.set_filled(false);
            }
        }
        loaded
    }

    /// Children of every pending group, in row order.
    fn read_members(
        &self,
        strategy: SelectStrategy,
        pending: &Pending<F::Group, Shared<C>>,
    ) -> Result<HashMap<F::Group, Vec<Shared<E>>>, MapperError> {
        let groups: Vec<Value> = pending.keys().iter().map(F::to_value).collect();
        let (stmt, values) = batch_statement(&self.base, strategy, F::COLUMN, groups);

        let mut members: HashMap<F::Group, Vec<Shared<E>>> = HashMap::new();
        let mut filled = 0;
        let mut ignored = 0;
        let rows = read_rows(&*self.conn, &stmt, self.prepared, values, |row| {
            let group = F::collection_key(&row)?;
            if pending.get(&group).is_some() {
                let child = adopt_row(&self.cache, &row)?;
                members.entry(group).or_default().push(child);
                filled += 1;
            } else {
                ignored += 1;
            }
            Ok(())
        })?;
        debug!(
            table = E::TABLE.name,
            column = F::COLUMN,
            ?strategy,
            groups = pending.len(),
            rows,
            filled,
            ignored,
            "resolved collection batch"
        );
        Ok(members)
    }
}

fn install<E, C>(
    pending: &Pending<C::Group, Shared<C>>,
    mut members: HashMap<C::Group, Vec<Shared<E>>>,
) -> Result<(), MapperError>
where
    E: Entity,
    C: EntityCollection<E>,
{
    for group in pending.keys() {
        let Some(collection) = pending.get(group) else {
            continue;
        };
        let mut collection = collection.borrow_mut();
        collection.clear();
        collection.set_filled(false);
        for child in members.remove(group).unwrap_or_default() {
            collection.push(child)?;
        }
        collection.set_filled(true);
    }
    Ok(())
}
