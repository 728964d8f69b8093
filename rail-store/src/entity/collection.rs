//! One-to-many association containers.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

use super::{Entity, Shared};

/// Errors raised while adding members to a collection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollectionError {
    /// Two members of one ordinal collection share an ordinal
    #[error("ordinal collision: ordinal {ordinal} already present in group {group}")]
    OrdinalCollision { group: String, ordinal: i32 },
}

/// Position of a child within its parent's sequence.
pub trait Ordinal {
    fn ordinal(&self) -> i32;
}

/// Children of one parent, grouped under the parent's key.
///
/// The collection's own fill flag records whether the group has been
/// loaded, which is what distinguishes "no children" from "not loaded".
pub trait EntityCollection<E: Entity>: 'static {
    type Group: Clone + Eq + Hash + Debug + 'static;

    /// An empty, unfilled collection for `group`.
    fn new(group: Self::Group) -> Self;

    fn group(&self) -> &Self::Group;

    fn is_filled(&self) -> bool;

    fn set_filled(&mut self, filled: bool);

    /// Remove every member. Does not change the fill flag.
    fn clear(&mut self);

    fn push(&mut self, entity: Shared<E>) -> Result<(), CollectionError>;

    /// Drop `entity` if it is a member. Returns whether it was.
    fn remove(&mut self, entity: &Shared<E>) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Members in iteration order.
    fn members(&self) -> Vec<Shared<E>>;
}

/// Children in row arrival order. Duplicate keys are kept.
#[derive(Debug)]
pub struct EntityList<B, E> {
    group: B,
    filled: bool,
    items: Vec<Shared<E>>,
}

impl<B, E> EntityList<B, E> {
    pub fn iter(&self) -> impl Iterator<Item = &Shared<E>> {
        self.items.iter()
    }
}

impl<B, E> EntityCollection<E> for EntityList<B, E>
where
    B: Clone + Eq + Hash + Debug + 'static,
    E: Entity,
{
    type Group = B;

    fn new(group: B) -> Self {
        Self {
            group,
            filled: false,
            items: Vec::new(),
        }
    }

    fn group(&self) -> &B {
        &self.group
    }

    fn is_filled(&self) -> bool {
        self.filled
    }

    fn set_filled(&mut self, filled: bool) {
        self.filled = filled;
    }

    fn clear(&mut self) {
        self.items.clear();
    }

    fn push(&mut self, entity: Shared<E>) -> Result<(), CollectionError> {
        self.items.push(entity);
        Ok(())
    }

    fn remove(&mut self, entity: &Shared<E>) -> bool {
        let before = self.items.len();
        self.items.retain(|held| !Rc::ptr_eq(held, entity));
        self.items.len() != before
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn members(&self) -> Vec<Shared<E>> {
        self.items.clone()
    }
}

/// Children keyed and ordered by their ordinal, which must be unique
/// within the group.
///
/// # Examples
///
/// ```
/// use rail_store::entity::{share, CollectionError, EntityCollection, OrdinalCollection};
/// use rail_store::network::Stop;
///
/// let mut stops: OrdinalCollection<i64, Stop> = OrdinalCollection::new(1);
/// stops.push(share(Stop::new(1, 10, 4))).unwrap();
/// stops.push(share(Stop::new(1, 11, 3))).unwrap();
///
/// let ordinals: Vec<i32> = stops.iter().map(|(o, _)| *o).collect();
/// assert_eq!(ordinals, vec![3, 4]);
///
/// let clash = stops.push(share(Stop::new(1, 12, 3)));
/// assert!(matches!(clash, Err(CollectionError::OrdinalCollision { ordinal: 3, .. })));
/// ```
#[derive(Debug)]
pub struct OrdinalCollection<B, E> {
    group: B,
    filled: bool,
    items: BTreeMap<i32, Shared<E>>,
}

impl<B, E> OrdinalCollection<B, E> {
    /// Members with their ordinals, ascending.
    pub fn iter(&self) -> impl Iterator<Item = (&i32, &Shared<E>)> {
        self.items.iter()
    }

    pub fn get(&self, ordinal: i32) -> Option<&Shared<E>> {
        self.items.get(&ordinal)
    }

    /// Highest ordinal present.
    pub fn last_ordinal(&self) -> Option<i32> {
        self.items.keys().next_back().copied()
    }
}

impl<B, E> EntityCollection<E> for OrdinalCollection<B, E>
where
    B: Clone + Eq + Hash + Debug + 'static,
    E: Entity + Ordinal,
{
    type Group = B;

    fn new(group: B) -> Self {
        Self {
            group,
            filled: false,
            items: BTreeMap::new(),
        }
    }

    fn group(&self) -> &B {
        &self.group
    }

    fn is_filled(&self) -> bool {
        self.filled
    }

    fn set_filled(&mut self, filled: bool) {
        self.filled = filled;
    }

    fn clear(&mut self) {
        self.items.clear();
    }

    fn push(&mut self, entity: Shared<E>) -> Result<(), CollectionError> {
        let ordinal = entity.borrow().ordinal();
        if self.items.contains_key(&ordinal) {
            return Err(CollectionError::OrdinalCollision {
                group: format!("{:?}", self.group),
                ordinal,
            });
        }
        self.items.insert(ordinal, entity);
        Ok(())
    }

    fn remove(&mut self, entity: &Shared<E>) -> bool {
        let before = self.items.len();
        self.items.retain(|_, held| !Rc::ptr_eq(held, entity));
        self.items.len() != before
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn members(&self) -> Vec<Shared<E>> {
        self.items.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::driver::{DriverError, Row};
    use crate::entity::{share, EntityState, TableDef};

    #[derive(Debug)]
    struct Leg {
        state: EntityState<i64>,
        seq: i32,
    }

    impl Leg {
        fn new(id: i64, seq: i32) -> Shared<Self> {
            share(Self {
                state: EntityState::placeholder(id),
                seq,
            })
        }
    }

    impl Entity for Leg {
        type Key = i64;

        const TABLE: TableDef = TableDef {
            name: "leg",
            key_column: "id",
            columns: &["seq"],
            upsert_key: &[],
        };

        fn placeholder(key: i64) -> Self {
            Self {
                state: EntityState::placeholder(key),
                seq: 0,
            }
        }

        fn state(&self) -> &EntityState<i64> {
            &self.state
        }

        fn state_mut(&mut self) -> &mut EntityState<i64> {
            &mut self.state
        }

        fn read_row(&mut self, row: &Row) -> Result<(), DriverError> {
            self.seq = row.get_i32("seq")?;
            Ok(())
        }
    }

    impl Ordinal for Leg {
        fn ordinal(&self) -> i32 {
            self.seq
        }
    }

    #[test]
    fn list_keeps_arrival_order_and_duplicates() {
        let mut list: EntityList<i64, Leg> = EntityList::new(7);
        let a = Leg::new(1, 5);
        list.push(a.clone()).unwrap();
        list.push(Leg::new(2, 1)).unwrap();
        list.push(a.clone()).unwrap();

        assert_eq!(list.len(), 3);
        let members = list.members();
        assert!(Rc::ptr_eq(&members[0], &a));
        assert!(Rc::ptr_eq(&members[2], &a));
        assert_eq!(members[1].borrow().seq, 1);
    }

    #[test]
    fn ordinal_collection_orders_ascending() {
        let mut legs: OrdinalCollection<i64, Leg> = OrdinalCollection::new(7);
        legs.push(Leg::new(1, 4)).unwrap();
        legs.push(Leg::new(2, 3)).unwrap();

        let ordinals: Vec<i32> = legs.iter().map(|(o, _)| *o).collect();
        assert_eq!(ordinals, vec![3, 4]);
        assert_eq!(legs.last_ordinal(), Some(4));
    }

    #[test]
    fn ordinal_collision_is_an_error() {
        let mut legs: OrdinalCollection<i64, Leg> = OrdinalCollection::new(7);
        let first = Leg::new(1, 3);
        legs.push(first.clone()).unwrap();

        let err = legs.push(Leg::new(2, 3)).unwrap_err();
        assert_eq!(
            err,
            CollectionError::OrdinalCollision {
                group: "7".to_string(),
                ordinal: 3
            }
        );
        assert_eq!(
            err.to_string(),
            "ordinal collision: ordinal 3 already present in group 7"
        );
        // The original member is untouched
        assert!(Rc::ptr_eq(legs.get(3).unwrap(), &first));
        assert_eq!(legs.len(), 1);
    }

    #[test]
    fn remove_by_identity() {
        let mut legs: OrdinalCollection<i64, Leg> = OrdinalCollection::new(1);
        let first = Leg::new(1, 1);
        legs.push(first.clone()).unwrap();
        legs.push(Leg::new(2, 2)).unwrap();

        // Same key and ordinal, different instance
        assert!(!legs.remove(&Leg::new(1, 1)));
        assert!(legs.remove(&first));
        assert!(!legs.remove(&first));
        assert_eq!(legs.last_ordinal(), Some(2));

        let mut list: EntityList<i64, Leg> = EntityList::new(1);
        list.push(first.clone()).unwrap();
        list.push(first.clone()).unwrap();
        assert!(list.remove(&first));
        assert!(list.is_empty());
    }

    #[test]
    fn fill_flag_survives_clear() {
        let mut legs: OrdinalCollection<i64, Leg> = OrdinalCollection::new(1);
        assert!(!legs.is_filled());
        legs.set_filled(true);
        legs.push(Leg::new(1, 1)).unwrap();
        legs.clear();
        assert!(legs.is_filled());
        assert!(legs.is_empty());
    }
}
