/// Mutation engine integration tests
///
/// Runs the access layer against the in-memory driver under each batch
/// reporting configuration.
/// Run with: cargo test --test access_tests
mod people_fixture;

use people_fixture::{
    ALL_SETUPS, Harness, Memberships, Membership, People, Person, RecordingSleeper,
    SELECT_BY_KEY, SELECT_BY_KEYS, SELECT_MEMBERSHIP, Setup, open, people_range, person,
};
use rustmemorm::dialect::MemoryDialect;
use rustmemorm::driver::memory::BatchReporting;
use rustmemorm::core::DriverResult;
use rustmemorm::{
    Capabilities, DriverError, ErrorKind, OrmError, Relation, Row, Statement, Value,
};
use std::sync::Arc;

fn sorted(mut people: Vec<Person>) -> Vec<Person> {
    people.sort_by_key(|p| p.id);
    people
}

#[test]
fn test_insert_then_get_round_trips_in_every_setup() {
    for setup in ALL_SETUPS {
        let h = Harness::new(setup);
        let access = h.people();
        let people = people_range(1..=4);

        access.insert(&people).unwrap();

        let keys: Vec<i64> = people.iter().map(|p| p.id).collect();
        let fetched = access.get(&keys).unwrap().to_list().unwrap();
        assert_eq!(sorted(fetched), people, "{:?}", setup);
        assert_eq!(h.stats().open_statements(), 0, "{:?}", setup);
    }
}

#[test]
fn test_batched_setup_submits_one_batch() {
    let h = Harness::new(Setup::Batched);
    h.people().insert(&people_range(1..=5)).unwrap();

    let stats = h.stats();
    assert_eq!(stats.statements_prepared, 1);
    assert_eq!(stats.batches_executed, 1);
    assert_eq!(stats.updates_executed, 0);
}

#[test]
fn test_row_by_row_setup_executes_each_entity() {
    let h = Harness::new(Setup::RowByRow);
    h.people().insert(&people_range(1..=5)).unwrap();

    let stats = h.stats();
    assert_eq!(stats.statements_prepared, 1);
    assert_eq!(stats.batches_executed, 0);
    assert_eq!(stats.updates_executed, 5);
}

#[test]
fn test_empty_mutations_prepare_nothing() {
    for setup in ALL_SETUPS {
        let h = Harness::new(setup);
        let access = h.people();
        let none: Vec<Person> = Vec::new();

        access.insert(&none).unwrap();
        access.update(&none).unwrap();
        access.delete(&none).unwrap();
        access.upsert(&none).unwrap();

        assert_eq!(h.stats().statements_prepared, 0, "{:?}", setup);
        assert!(h.prepared().is_empty());
    }
}

#[test]
fn test_update_and_delete() {
    for setup in ALL_SETUPS {
        let h = Harness::new(setup);
        let access = h.people();
        access.insert(&people_range(1..=3)).unwrap();

        let mut renamed = person(2);
        renamed.name = "renamed".to_string();
        access.update([&renamed]).unwrap();
        access.delete([&person(3)]).unwrap();

        assert_eq!(h.stored_people(), vec![person(1), renamed], "{:?}", setup);
    }
}

#[test]
fn test_update_of_missing_row_is_a_concurrency_violation() {
    for setup in ALL_SETUPS {
        let h = Harness::new(setup);
        let err = h.people().update([&person(9)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConcurrencyViolation, "{:?}", setup);
        assert!(err.is_retryable());
        assert_eq!(h.stats().open_statements(), 0);
    }
}

#[test]
fn test_upsert_updates_existing_and_inserts_missing() {
    for setup in ALL_SETUPS {
        let h = Harness::new(setup);
        let access = h.people();
        access.insert(&people_range(1..=3)).unwrap();

        let batch: Vec<Person> = (1..=6)
            .map(|id| Person {
                id,
                name: format!("upserted-{}", id),
                age: 40 + id,
            })
            .collect();
        access.upsert(&batch).unwrap();

        assert_eq!(h.stored_people(), batch, "{:?}", setup);
        assert_eq!(h.stats().open_statements(), 0, "{:?}", setup);
    }
}

#[test]
fn test_upsert_with_nothing_missing_skips_insert() {
    let h = Harness::new(Setup::Batched);
    let access = h.people();
    access.insert(&people_range(1..=2)).unwrap();
    h.reset();

    access.upsert(&people_range(1..=2)).unwrap();

    assert_eq!(
        h.prepared(),
        vec!["UPDATE people SET name = ?, age = ? WHERE id = ?".to_string()]
    );
}

#[test]
fn test_upsert_treats_unreported_row_counts_as_missing() {
    for reporting in [BatchReporting::NoInfo, BatchReporting::Absent] {
        let driver = people_fixture::driver(BatchReporting::Exact);
        let db = open(&driver, Arc::new(MemoryDialect), None, RecordingSleeper::new());
        let access = db.access(People);
        access.insert(&people_range(1..=2)).unwrap();
        driver.set_batch_reporting(reporting).unwrap();

        // Existing rows get re-inserted and collide with themselves.
        let err = access.upsert(&people_range(1..=3)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateKey, "{:?}", reporting);
        assert!(matches!(err, OrmError::DuplicateKey { ref entity, .. } if entity == "people"));
        assert_eq!(driver.row_count("people").unwrap(), 2);
    }
}

#[test]
fn test_insert_of_existing_key_is_duplicate_key() {
    for setup in ALL_SETUPS {
        let h = Harness::new(setup);
        let access = h.people();
        access.insert([&person(1)]).unwrap();

        let err = access.insert([&person(1)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateKey, "{:?}", setup);
        assert!(!err.is_retryable());
        assert_eq!(h.stats().open_statements(), 0);
    }
}

#[test]
fn test_one_failed_row_of_five_attempts_all_rows() {
    let driver = people_fixture::driver(BatchReporting::Exact);
    let capabilities = Capabilities {
        total_count_known: false,
        individual_counts_known: true,
    };
    let db = open(&driver, Arc::new(MemoryDialect), Some(capabilities), RecordingSleeper::new());
    let access = db.access(People);
    access.insert(&people_range(1..=4)).unwrap();
    driver.reset_stats().unwrap();

    let mut batch = people_range(1..=5);
    for p in batch.iter_mut() {
        p.age += 10;
    }
    let err = access.update(&batch).unwrap_err();

    assert!(matches!(err, OrmError::Concurrency { ref operation, .. } if operation == "update"));
    let stats = driver.stats().unwrap();
    assert_eq!(stats.updates_executed, 5);
    assert_eq!(stats.batches_executed, 0);
    assert_eq!(stats.open_statements(), 0);
    // The four existing rows were still updated.
    assert_eq!(driver.rows("people").unwrap().len(), 4);
}

#[test]
fn test_retries_with_linear_backoff_then_fails() {
    let h = Harness::new(Setup::Batched);
    let mut access = h.people();
    access.set_max_retries(5);
    access.set_retry_delay_unit_ms(3);

    let err = access.update([&person(1)]).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConcurrencyViolation);
    assert_eq!(h.stats().batches_executed, 6);
    assert_eq!(h.sleeper.delays_ms(), vec![3, 6, 9, 12, 15]);
    assert_eq!(h.stats().open_statements(), 0);
}

#[test]
fn test_no_retries_is_fail_fast() {
    let h = Harness::new(Setup::Batched);
    let err = h.people().delete([&person(1)]).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConcurrencyViolation);
    assert_eq!(h.stats().batches_executed, 1);
    assert!(h.sleeper.delays_ms().is_empty());
}

#[test]
fn test_zero_delay_unit_still_retries() {
    let h = Harness::new(Setup::TotalOnly);
    let mut access = h.people();
    access.set_max_retries(2);
    access.set_retry_delay_unit_ms(0);

    assert!(access.update([&person(1)]).is_err());
    assert_eq!(h.stats().batches_executed, 3);
    assert_eq!(h.sleeper.delays_ms(), vec![0, 0]);
}

#[test]
fn test_retry_resubmits_the_bound_batch() {
    let h = Harness::new(Setup::Batched);
    let mut access = h.people();
    access.set_max_retries(3);
    access.set_retry_delay_unit_ms(2);
    h.driver.stall_next_batches(2).unwrap();

    access.insert(&people_range(1..=3)).unwrap();

    assert_eq!(h.stats().batches_executed, 3);
    assert_eq!(h.sleeper.delays_ms(), vec![2, 4]);
    assert_eq!(h.stored_people(), people_range(1..=3));
}

#[test]
fn test_interrupted_retry_is_fatal() {
    let h = Harness::with_sleeper(Setup::Batched, RecordingSleeper::interrupting(1));
    let mut access = h.people();
    access.set_max_retries(5);

    let err = access.update([&person(1)]).unwrap_err();

    assert!(matches!(err, OrmError::RetryInterrupted { .. }));
    assert_eq!(err.kind(), ErrorKind::PlainFailure);
    assert!(!err.is_retryable());
    assert_eq!(h.stats().batches_executed, 1);
    assert_eq!(h.stats().open_statements(), 0);
}

#[test]
fn test_retry_policy_comes_from_config() {
    let driver = people_fixture::driver(BatchReporting::Exact);
    let config = rustmemorm::OrmConfig::new("rustmemorm:memory")
        .max_retries(2)
        .retry_delay_unit_ms(5);
    let sleeper = RecordingSleeper::new();
    let db = rustmemorm::Database::open(Arc::new(driver.clone()), config)
        .unwrap()
        .with_sleeper(sleeper.clone());

    assert!(db.access(People).update([&person(1)]).is_err());
    assert_eq!(sleeper.delays_ms(), vec![5, 10]);
}

#[test]
fn test_driver_failure_is_plain_and_releases_statement() {
    for setup in ALL_SETUPS {
        let h = Harness::new(setup);
        h.driver
            .fail_next_execution(DriverError::new("connection reset").with_sql_state("08006"))
            .unwrap();

        let err = h.people().insert(&people_range(1..=2)).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PlainFailure, "{:?}", setup);
        assert_eq!(err.to_string(), "insert failure on people");
        assert_eq!(err.driver_error().and_then(|e| e.sql_state()), Some("08006"));
        assert_eq!(h.stats().open_statements(), 0);
    }
}

#[test]
fn test_prepare_failure_names_the_sql() {
    let h = Harness::new(Setup::Batched);
    let err = h
        .people()
        .query_one("SELECT id FROM nowhere WHERE", &[])
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PlainFailure);
    assert!(err.to_string().starts_with("prepare SQL"));
}

#[test]
fn test_get_statement_shapes() {
    let h = Harness::new(Setup::Batched);
    let access = h.people();
    access.insert(&people_range(1..=5)).unwrap();

    h.reset();
    let none: Vec<i64> = Vec::new();
    assert!(access.get(&none).unwrap().to_list().unwrap().is_empty());
    assert!(h.prepared().is_empty());

    let one = access.get([&2]).unwrap().to_list().unwrap();
    assert_eq!(one, vec![person(2)]);
    assert_eq!(h.prepared(), vec![SELECT_BY_KEY.to_string()]);

    h.reset();
    let three = access.get(&[1, 3, 5]).unwrap().to_list().unwrap();
    assert_eq!(sorted(three), vec![person(1), person(3), person(5)]);
    assert_eq!(h.prepared(), vec![format!("{}(?,?,?)", SELECT_BY_KEYS)]);
    assert_eq!(h.stats().open_statements(), 0);
    assert_eq!(h.stats().open_cursors(), 0);
}

#[test]
fn test_get_skips_missing_keys() {
    let h = Harness::new(Setup::Batched);
    let access = h.people();
    access.insert([&person(1)]).unwrap();

    assert!(access.get([&7]).unwrap().to_list().unwrap().is_empty());
    let found = access.get(&[1, 7, 8]).unwrap().to_list().unwrap();
    assert_eq!(found, vec![person(1)]);
}

#[test]
fn test_get_without_in_list_fetches_key_by_key() {
    let h = Harness::new(Setup::Batched);
    let access = h.db.access(Memberships);
    let members = vec![
        Membership {
            group_id: 1,
            user: "ana".to_string(),
            title: "owner".to_string(),
        },
        Membership {
            group_id: 1,
            user: "bo".to_string(),
            title: "member".to_string(),
        },
    ];
    access.insert(&members).unwrap();
    h.reset();

    let keys = vec![
        (1, "ana".to_string()),
        (1, "bo".to_string()),
        (2, "ana".to_string()),
    ];
    let found = access.get(&keys).unwrap().to_list().unwrap();

    assert_eq!(found, members);
    assert_eq!(h.prepared(), vec![SELECT_MEMBERSHIP.to_string(); 3]);
}

#[test]
fn test_composite_key_mutations() {
    for setup in ALL_SETUPS {
        let h = Harness::new(setup);
        let access = h.db.access(Memberships);
        let mut member = Membership {
            group_id: 4,
            user: "cy".to_string(),
            title: "member".to_string(),
        };
        access.upsert([&member]).unwrap();
        member.title = "owner".to_string();
        access.upsert([&member]).unwrap();

        let fetched = access.get_one(&(4, "cy".to_string())).unwrap();
        assert_eq!(fetched, Some(member.clone()), "{:?}", setup);

        access.delete([&member]).unwrap();
        assert_eq!(access.get_one(&(4, "cy".to_string())).unwrap(), None);
    }
}

#[test]
fn test_query_one_rejects_multiple_rows() {
    let h = Harness::new(Setup::Batched);
    let access = h.people();
    let mut twins = people_range(1..=2);
    for p in twins.iter_mut() {
        p.age = 30;
    }
    access.insert(&twins).unwrap();

    let sql = "SELECT id, name, age FROM people WHERE age = ?";
    let err = access.query_one(sql, &[Value::from(30i64)]).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PlainFailure);
    assert_eq!(err.to_string(), "Multiple results");
    assert_eq!(h.stats().open_statements(), 0);
    assert_eq!(h.stats().open_cursors(), 0);

    assert_eq!(access.query_one(sql, &[Value::from(99i64)]).unwrap(), None);
    assert_eq!(h.stats().open_statements(), 0);
}

#[test]
fn test_query_list_binds_parameters_in_order() {
    let h = Harness::new(Setup::Batched);
    let access = h.people();
    access.insert(&people_range(1..=4)).unwrap();

    let sql = "SELECT id, name, age FROM people WHERE id IN (?, ?) AND age = ?";
    let found = access
        .query_list(sql, &[Value::from(1i64), Value::from(2i64), Value::from(22i64)])
        .unwrap()
        .to_list()
        .unwrap();

    assert_eq!(found, vec![person(2)]);
}

/// `People` with a delete binder that sets nothing.
struct UnboundDelete;

impl Relation for UnboundDelete {
    type Entity = Person;
    type Key = i64;

    fn relation_name(&self) -> &str {
        "people"
    }

    fn insert_one_sql(&self) -> &str {
        "INSERT INTO people (id, name, age) VALUES (?, ?, ?)"
    }

    fn update_one_sql(&self) -> &str {
        "UPDATE people SET name = ?, age = ? WHERE id = ?"
    }

    fn delete_one_sql(&self) -> &str {
        "DELETE FROM people WHERE id = ?"
    }

    fn select_by_key_sql(&self) -> &str {
        SELECT_BY_KEY
    }

    fn new_entity(&self) -> Person {
        Person::default()
    }

    fn bind_insert(&self, stmt: &mut dyn Statement, p: &Person) -> DriverResult<()> {
        People.bind_insert(stmt, p)
    }

    fn bind_update(&self, stmt: &mut dyn Statement, p: &Person) -> DriverResult<()> {
        People.bind_update(stmt, p)
    }

    fn bind_delete(&self, _stmt: &mut dyn Statement, _p: &Person) -> DriverResult<()> {
        Ok(())
    }

    fn bind_fetch(&self, row: &Row, p: &mut Person) -> DriverResult<()> {
        People.bind_fetch(row, p)
    }
}

#[test]
fn test_unbound_parameter_is_a_driver_failure() {
    for setup in [Setup::Batched, Setup::RowByRow] {
        let h = Harness::new(setup);
        let access = h.db.access(UnboundDelete);

        let err = access.delete(&people_range(1..=2)).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PlainFailure, "{:?}", setup);
        assert_eq!(err.to_string(), "delete failure on people");
        assert_eq!(err.driver_error().and_then(|e| e.sql_state()), Some("07001"));
        assert_eq!(h.stats().open_statements(), 0);
    }
}
