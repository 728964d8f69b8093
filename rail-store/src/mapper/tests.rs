use std::rc::Rc;

use super::*;
use crate::driver::{DriverError, MemoryConnection, TableSpec};
use crate::entity::fixtures::Depot;
use crate::entity::{EntityCollection, EntityKey, EntityList, KeyedValue};
use crate::query::Filter;

struct DepotByCode;

impl AlternateKey<Depot> for DepotByCode {
    type Key = String;
    const CACHE_NAME: &'static str = "depot_by_code";
    const COLUMN: &'static str = "code";

    fn key_of(depot: &Depot) -> Option<String> {
        Some(depot.code().to_string())
    }

    fn read_key(row: &Row) -> Result<String, DriverError> {
        row.get_string("code")
    }

    fn to_value(key: &String) -> Value {
        key.clone().into()
    }
}

struct DepotsByCapacity;

impl ForeignKey<Depot> for DepotsByCapacity {
    type Group = i64;
    const COLUMN: &'static str = "capacity";

    fn collection_key(row: &Row) -> Result<i64, DriverError> {
        row.get_i64("capacity")
    }

    fn to_value(group: &i64) -> Value {
        (*group).into()
    }
}

struct DepotCapacity;

impl AggregateQuery for DepotCapacity {
    type Key = String;
    type Output = i64;
    const KEY_COLUMN: &'static str = "code";

    fn select() -> Select {
        Select::from("depot").columns(["code", "capacity"])
    }

    fn read_key(row: &Row) -> Result<String, DriverError> {
        row.get_string("code")
    }

    fn read_value(row: &Row) -> Result<Option<i64>, DriverError> {
        row.get_opt("capacity")
    }

    fn to_value(key: &String) -> Value {
        key.clone().into()
    }
}

fn store(depots: &[(i64, &str, i64)]) -> Rc<MemoryConnection> {
    let conn = MemoryConnection::new();
    conn.create_table("depot", TableSpec::new("id").serial().unique(&["code"]));
    for &(id, code, capacity) in depots {
        conn.insert_row(
            "depot",
            Row::new()
                .with("id", id)
                .with("code", code)
                .with("capacity", capacity),
        )
        .unwrap();
    }
    Rc::new(conn)
}

fn mapper(conn: &Rc<MemoryConnection>) -> EntityMapper<Depot> {
    EntityMapper::new(Rc::clone(conn) as Rc<dyn Connection>)
}

fn three_depots() -> Rc<MemoryConnection> {
    store(&[(1, "OXF", 10), (2, "BRI", 20), (3, "CDF", 10)])
}

#[test]
fn one_instance_per_key() {
    let conn = three_depots();
    let mut depots = mapper(&conn);

    let a = depots.get(1).unwrap();
    let b = depots.get_by_key(1, false).unwrap();
    assert!(Rc::ptr_eq(&a, &b));
    assert_eq!(conn.query_count(), 1);

    // Forced reload refills the same instance
    let c = depots.get(1).unwrap();
    assert!(Rc::ptr_eq(&a, &c));
    assert_eq!(conn.query_count(), 2);
    assert_eq!(a.borrow().code(), "OXF");
}

#[test]
fn batch_matches_individual_loads() {
    let conn = three_depots();
    let mut one_by_one = mapper(&conn);
    let singles: Vec<_> = [1, 2, 3]
        .into_iter()
        .map(|k| one_by_one.get(k).unwrap())
        .collect();
    assert_eq!(conn.query_count(), 3);
    conn.reset_counters();

    let mut batched = mapper(&conn);
    batched.begin_select(SelectStrategy::MultiKey).unwrap();
    let pending: Vec<_> = [1, 2, 3]
        .into_iter()
        .map(|k| batched.get_by_key(k, false).unwrap())
        .collect();
    assert!(pending.iter().all(|d| !d.borrow().is_filled()));
    batched.end_select().unwrap();

    assert_eq!(conn.query_count(), 1);
    for (single, batch) in singles.iter().zip(&pending) {
        let (single, batch) = (single.borrow(), batch.borrow());
        assert!(batch.is_filled());
        assert_eq!(single.key(), batch.key());
        assert_eq!(single.code(), batch.code());
        assert_eq!(single.capacity(), batch.capacity());
    }
}

#[test]
fn empty_session_issues_no_query() {
    let conn = three_depots();
    let mut depots = mapper(&conn);

    depots.begin_select(SelectStrategy::MultiKey).unwrap();
    depots.end_select().unwrap();
    depots.begin_update().unwrap();
    depots.end_update().unwrap();
    depots.begin_delete().unwrap();
    depots.end_delete().unwrap();

    assert_eq!(conn.command_count(), 0);
}

#[test]
fn missing_keys_stay_unfilled() {
    let conn = store(&[(2, "BRI", 20), (4, "SWA", 5)]);
    let mut depots = mapper(&conn);

    depots.begin_select(SelectStrategy::MultiKey).unwrap();
    let all: Vec<_> = (1..=5)
        .map(|k| depots.get_by_key(k, false).unwrap())
        .collect();
    depots.end_select().unwrap();

    assert_eq!(conn.query_count(), 1);
    let filled: Vec<bool> = all.iter().map(|d| d.borrow().is_filled()).collect();
    assert_eq!(filled, vec![false, true, false, true, false]);
}

#[test]
fn all_strategy_scans_and_discards_unregistered_rows() {
    let conn = three_depots();
    let mut depots = mapper(&conn);

    depots.begin_select(SelectStrategy::All).unwrap();
    let oxf = depots.get_by_key(1, false).unwrap();
    let missing = depots.get_by_key(9, false).unwrap();
    depots.end_select().unwrap();

    assert_eq!(conn.executed(), vec![r#"SELECT "id", "code", "capacity" FROM "depot""#]);
    assert!(oxf.borrow().is_filled());
    assert!(!missing.borrow().is_filled());
    // Rows nobody registered are not cached
    assert!(depots.cache().get(&2).is_none());
}

#[test]
fn get_all_goes_through_identity_cache() {
    let conn = three_depots();
    let mut depots = mapper(&conn);
    let oxf = depots.get(1).unwrap();

    let all = depots.get_all().unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.iter().any(|d| Rc::ptr_eq(d, &oxf)));
    assert_eq!(depots.cache().len(), 3);
}

#[test]
fn session_misuse_is_reported() {
    let conn = three_depots();
    let mut depots = mapper(&conn);

    assert!(matches!(
        depots.end_select(),
        Err(MapperError::NoSession(SessionKind::Select))
    ));
    assert!(matches!(
        depots.end_update(),
        Err(MapperError::NoSession(SessionKind::Update))
    ));

    depots.begin_delete().unwrap();
    assert!(matches!(
        depots.begin_delete(),
        Err(MapperError::SessionAlreadyOpen(SessionKind::Delete))
    ));

    depots.begin_select(SelectStrategy::MultiKey).unwrap();
    let cached = depots.get_by_key(1, false).unwrap();
    depots.fill_by_key(&cached).unwrap();
    let stranger = share(Depot::placeholder(1));
    assert!(matches!(
        depots.fill_by_key(&stranger),
        Err(MapperError::DuplicateRegistration { .. })
    ));
}

#[test]
fn loading_an_unsaved_record_is_an_error() {
    let conn = three_depots();
    let mut depots = mapper(&conn);
    let fresh = depots.track(Depot::new("NEW", 1)).unwrap();
    assert!(matches!(
        depots.fill_by_key(&fresh),
        Err(MapperError::UnsavedEntity { table: "depot" })
    ));
}

#[test]
fn insert_assigns_keys_in_one_statement() {
    let conn = store(&[]);
    let mut depots = mapper(&conn);
    let a = depots.track(Depot::new("OXF", 3)).unwrap();
    let b = depots.track(Depot::new("BRI", 4)).unwrap();

    depots.begin_update().unwrap();
    depots.update(&a).unwrap();
    depots.update(&b).unwrap();
    depots.update(&a).unwrap();
    depots.end_update().unwrap();

    assert_eq!(conn.command_count(), 1);
    assert_eq!(a.borrow().key(), &EntityKey::Persisted(1));
    assert_eq!(b.borrow().key(), &EntityKey::Persisted(2));
    assert!(!a.borrow().is_changed());
    assert_eq!(depots.cache().unsaved_len(), 0);
    assert!(Rc::ptr_eq(&depots.cache().get(&2).unwrap(), &b));
}

#[test]
fn upsert_is_idempotent_and_merges_into_cached_instance() {
    let conn = store(&[]);
    let mut depots = mapper(&conn);

    let first = depots.track(Depot::new("OXF", 3)).unwrap();
    depots.update(&first).unwrap();

    let second = depots.track(Depot::new("OXF", 5)).unwrap();
    depots.update(&second).unwrap();

    assert_eq!(conn.rows("depot").unwrap().len(), 1);
    assert_eq!(second.borrow().key(), first.borrow().key());
    // The instance the cache already held absorbed the new state
    assert_eq!(first.borrow().capacity(), 5);
    assert!(Rc::ptr_eq(&depots.cache().get(&1).unwrap(), &first));
    assert_eq!(depots.cache().unsaved_len(), 0);
}

#[test]
fn save_cache_writes_only_changed_entities() {
    let conn = three_depots();
    let mut depots = mapper(&conn);
    let oxf = depots.get(1).unwrap();
    depots.get(2).unwrap();
    conn.reset_counters();

    assert_eq!(depots.update_save_cache().unwrap(), 0);
    assert_eq!(conn.command_count(), 0);

    oxf.borrow_mut().set_capacity(40);
    assert_eq!(depots.update_save_cache().unwrap(), 1);
    assert_eq!(conn.command_count(), 1);
    assert!(!oxf.borrow().is_changed());

    assert_eq!(depots.update_save_cache().unwrap(), 0);
    assert_eq!(conn.command_count(), 1);

    let stored = conn.rows("depot").unwrap();
    assert_eq!(stored[0].get_i64("capacity").unwrap(), 40);
}

#[test]
fn save_cache_writes_persisted_and_new_as_separate_statements() {
    let conn = three_depots();
    let mut depots = mapper(&conn);
    depots.get(1).unwrap().borrow_mut().set_capacity(11);
    depots.track(Depot::new("NEW", 2)).unwrap();
    conn.reset_counters();

    assert_eq!(depots.update_save_cache().unwrap(), 2);
    let executed = conn.executed();
    assert_eq!(executed.len(), 2);
    assert!(executed[0].contains(r#"ON CONFLICT ("id")"#));
    assert!(executed[1].contains(r#"ON CONFLICT ("code")"#));
    assert_eq!(depots.cache().len(), 2);
}

#[test]
fn delete_batch_evicts_from_every_cache() {
    let conn = three_depots();
    let mut depots = mapper(&conn);
    let mut by_code: Selector<DepotByCode, Depot> = Selector::new(&depots).unwrap();
    let oxf = depots.get(1).unwrap();
    depots.get(2).unwrap();
    conn.reset_counters();

    depots.begin_delete().unwrap();
    depots.delete_entity(&oxf).unwrap();
    depots.delete(2).unwrap();
    depots.delete(2).unwrap();
    depots.end_delete().unwrap();

    assert_eq!(conn.executed(), vec![r#"DELETE FROM "depot" WHERE "id" IN (@id_0, @id_1)"#]);
    assert_eq!(conn.rows("depot").unwrap().len(), 1);
    assert!(depots.cache().get(&1).is_none());
    assert!(by_code.get_cached(&"OXF".to_string()).is_none());
    assert!(by_code.get_by_key("OXF".to_string(), false).unwrap().is_none());
}

#[test]
fn selector_shares_identity_with_mapper() {
    let conn = three_depots();
    let mut depots = mapper(&conn);
    let mut by_code: Selector<DepotByCode, Depot> = Selector::new(&depots).unwrap();

    let oxf = depots.get(1).unwrap();
    let via_code = by_code.get_by_key("OXF".to_string(), false).unwrap().unwrap();
    assert!(Rc::ptr_eq(&oxf, &via_code));
    assert_eq!(conn.query_count(), 1);

    let bri = by_code.get_by_key("BRI".to_string(), false).unwrap().unwrap();
    let via_key = depots.get_by_key(2, false).unwrap();
    assert!(Rc::ptr_eq(&bri, &via_key));
    assert_eq!(conn.query_count(), 2);
}

#[test]
fn selector_batch_and_not_found() {
    let conn = three_depots();
    let depots = mapper(&conn);
    let mut by_code: Selector<DepotByCode, Depot> = Selector::new(&depots).unwrap();

    by_code.begin_select(SelectStrategy::MultiKey).unwrap();
    for code in ["OXF", "CDF", "XXX"] {
        by_code.fill_by_key(code.to_string()).unwrap();
    }
    by_code.end_select().unwrap();

    assert_eq!(conn.query_count(), 1);
    assert_eq!(by_code.get_cached(&"CDF".to_string()).unwrap().borrow().key(), &EntityKey::Persisted(3));
    assert!(by_code.get_cached(&"XXX".to_string()).is_none());
    assert!(depots.cache().get(&3).is_some());
}

#[test]
fn forced_lookup_of_vanished_row_is_none() {
    let conn = three_depots();
    let depots = mapper(&conn);
    let mut by_code: Selector<DepotByCode, Depot> = Selector::new(&depots).unwrap();
    let oxf = "OXF".to_string();
    assert!(by_code.get_by_key(oxf.clone(), true).unwrap().is_some());

    // Row removed without going through the mapper
    let stmt = crate::query::Delete::from("depot").where_eq("id").build();
    conn.execute_non_query(&stmt.command(&*conn, false, [Value::Int(1)]).unwrap())
        .unwrap();

    assert!(by_code.get_by_key(oxf.clone(), true).unwrap().is_none());
    assert!(by_code.get_cached(&oxf).is_none());
    // The cheap path no longer sees the stale entity either
    assert!(by_code.get_by_key(oxf, false).unwrap().is_none());
}

#[test]
fn renamed_entity_moves_in_secondary_cache() {
    let conn = three_depots();
    let mut depots = mapper(&conn);
    let by_code: Selector<DepotByCode, Depot> = Selector::new(&depots).unwrap();
    depots.get(1).unwrap();

    conn.execute_non_query(&{
        let stmt = crate::query::Update::table("depot").set("code").where_eq("id").build();
        stmt.command(&*conn, false, [Value::from("OXD"), Value::Int(1)]).unwrap()
    })
    .unwrap();
    depots.get(1).unwrap();

    assert!(by_code.get_cached(&"OXF".to_string()).is_none());
    assert!(by_code.get_cached(&"OXD".to_string()).is_some());
}

#[test]
fn multi_selector_groups_children() {
    let conn = three_depots();
    let mut depots = mapper(&conn);
    let oxf = depots.get(1).unwrap();
    conn.reset_counters();

    let mut by_capacity: MultiSelector<DepotsByCapacity, Depot, EntityList<i64, Depot>> =
        MultiSelector::new(&depots);
    by_capacity.begin_select(SelectStrategy::MultiKey).unwrap();
    let ten = by_capacity.get_by_key(10, false).unwrap();
    let twenty = by_capacity.get_by_key(20, false).unwrap();
    let none = by_capacity.get_by_key(99, false).unwrap();
    assert!(!ten.borrow().is_filled());
    by_capacity.end_select().unwrap();

    assert_eq!(conn.query_count(), 1);
    assert_eq!(ten.borrow().len(), 2);
    assert_eq!(twenty.borrow().len(), 1);
    assert!(none.borrow().is_filled());
    assert!(none.borrow().is_empty());
    assert!(ten.borrow().iter().any(|d| Rc::ptr_eq(d, &oxf)));

    // Refill replaces rather than appends
    by_capacity.get_by_key(10, true).unwrap();
    assert_eq!(ten.borrow().len(), 2);
    let again = by_capacity.get_by_key(10, false).unwrap();
    assert!(Rc::ptr_eq(&again, &ten));
    assert_eq!(conn.query_count(), 2);
}

#[test]
fn aggregate_selector_batches_values() {
    let conn = three_depots();
    let mut capacity: ArbitrarySelector<DepotCapacity> =
        ArbitrarySelector::new(Rc::clone(&conn) as Rc<dyn Connection>);

    capacity.begin_select(SelectStrategy::MultiKey).unwrap();
    let oxf = capacity.get_by_key("OXF".to_string(), false).unwrap();
    let nope = capacity.get_by_key("NOPE".to_string(), false).unwrap();
    capacity.end_select().unwrap();

    assert_eq!(conn.query_count(), 1);
    assert_eq!(oxf.borrow().value(), Some(&10));
    assert_eq!(nope.borrow().value(), None);

    let cached: Rc<_> = capacity.get_by_key("OXF".to_string(), false).unwrap();
    assert!(Rc::ptr_eq(&cached, &oxf));
    assert_eq!(conn.query_count(), 1);

    capacity.invalidate(&"OXF".to_string());
    let fresh = capacity.get_by_key("OXF".to_string(), false).unwrap();
    assert!(!Rc::ptr_eq(&fresh, &oxf));
    assert_eq!(*fresh.borrow(), {
        let mut kv = KeyedValue::new("OXF".to_string());
        kv.set(10);
        kv
    });
}

#[test]
fn failed_refill_leaves_collection_unloaded() {
    let conn = three_depots();
    let depots = mapper(&conn);
    let mut by_capacity: MultiSelector<DepotsByCapacity, Depot, EntityList<i64, Depot>> =
        MultiSelector::new(&depots);
    let ten = by_capacity.get_by_key(10, false).unwrap();
    assert_eq!(ten.borrow().len(), 2);

    // A row the entity cannot read
    conn.insert_row("depot", Row::new().with("id", 4i64).with("capacity", 10i64))
        .unwrap();
    conn.reset_counters();

    assert!(by_capacity.get_by_key(10, true).is_err());
    assert!(!ten.borrow().is_filled());
    assert!(ten.borrow().is_empty());

    // Not served from the cache while unloaded
    assert!(by_capacity.get_by_key(10, false).is_err());
    assert_eq!(conn.query_count(), 2);
}

#[test]
fn failed_aggregate_refill_is_not_cached() {
    let conn = three_depots();
    let mut capacity: ArbitrarySelector<DepotCapacity> =
        ArbitrarySelector::new(Rc::clone(&conn) as Rc<dyn Connection>);
    let oxf = "OXF".to_string();
    let held = capacity.get_by_key(oxf.clone(), false).unwrap();
    assert_eq!(held.borrow().value(), Some(&10));

    let set_capacity = |value: Value| {
        let stmt = crate::query::Update::table("depot")
            .set("capacity")
            .where_eq("code")
            .build();
        conn.execute_non_query(&stmt.command(&*conn, false, [value, Value::from("OXF")]).unwrap())
            .unwrap();
    };

    set_capacity(Value::from("lots"));
    assert!(capacity.get_by_key(oxf.clone(), true).is_err());
    assert_eq!(held.borrow().value(), None);
    assert!(capacity.get_cached(&oxf).is_none());

    set_capacity(Value::Int(12));
    let fresh = capacity.get_by_key(oxf, false).unwrap();
    assert_eq!(fresh.borrow().value(), Some(&12));
}

#[test]
fn deleted_children_leave_cached_collections() {
    let conn = three_depots();
    let mut depots = mapper(&conn);
    let mut by_capacity: MultiSelector<DepotsByCapacity, Depot, EntityList<i64, Depot>> =
        MultiSelector::new(&depots);
    let ten = by_capacity.get_by_key(10, false).unwrap();
    let oxf = depots.cache().get(&1).unwrap();
    assert!(ten.borrow().iter().any(|d| Rc::ptr_eq(d, &oxf)));

    depots.delete(1).unwrap();

    assert!(ten.borrow().is_filled());
    assert_eq!(ten.borrow().len(), 1);
    assert!(!ten.borrow().iter().any(|d| Rc::ptr_eq(d, &oxf)));
}
