//! Shared relations and helpers for the access layer integration tests
#![allow(dead_code)]

use rustmemorm::access::{Interrupted, bind_key};
use rustmemorm::core::{DriverResult, column};
use rustmemorm::dialect::{MemoryDialect, OracleDialect};
use rustmemorm::driver::memory::{BatchReporting, MemoryStats};
use rustmemorm::{
    Access, Capabilities, Database, MemoryDatabase, OrmConfig, Relation, Row, Sleeper,
    SqlDialect, Statement, Value,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SELECT_BY_KEY: &str = "SELECT id, name, age FROM people WHERE id = ?";
pub const SELECT_BY_KEYS: &str = "SELECT id, name, age FROM people WHERE id IN ";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub age: i64,
}

pub fn person(id: i64) -> Person {
    Person {
        id,
        name: format!("person-{}", id),
        age: 20 + id,
    }
}

pub fn people_range(ids: std::ops::RangeInclusive<i64>) -> Vec<Person> {
    ids.map(person).collect()
}

pub struct People;

impl Relation for People {
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

    fn select_by_keys_sql(&self) -> Option<&str> {
        Some(SELECT_BY_KEYS)
    }

    fn new_entity(&self) -> Person {
        Person::default()
    }

    fn bind_insert(&self, stmt: &mut dyn Statement, p: &Person) -> DriverResult<()> {
        stmt.set(1, Value::from(p.id))?;
        stmt.set(2, Value::from(p.name.as_str()))?;
        stmt.set(3, Value::from(p.age))
    }

    fn bind_update(&self, stmt: &mut dyn Statement, p: &Person) -> DriverResult<()> {
        stmt.set(1, Value::from(p.name.as_str()))?;
        stmt.set(2, Value::from(p.age))?;
        bind_key(stmt, 3, &p.id).map(|_| ())
    }

    fn bind_delete(&self, stmt: &mut dyn Statement, p: &Person) -> DriverResult<()> {
        bind_key(stmt, 1, &p.id).map(|_| ())
    }

    fn bind_fetch(&self, row: &Row, p: &mut Person) -> DriverResult<()> {
        p.id = column(row, 0)?;
        p.name = column(row, 1)?;
        p.age = column(row, 2)?;
        Ok(())
    }
}

/// Group membership keyed by (group, user); fetched key by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Membership {
    pub group_id: i64,
    pub user: String,
    pub title: String,
}

pub const SELECT_MEMBERSHIP: &str =
    "SELECT group_id, user_name, title FROM memberships WHERE group_id = ? AND user_name = ?";

pub struct Memberships;

impl Relation for Memberships {
    type Entity = Membership;
    type Key = (i64, String);

    fn relation_name(&self) -> &str {
        "memberships"
    }

    fn insert_one_sql(&self) -> &str {
        "INSERT INTO memberships (group_id, user_name, title) VALUES (?, ?, ?)"
    }

    fn update_one_sql(&self) -> &str {
        "UPDATE memberships SET title = ? WHERE group_id = ? AND user_name = ?"
    }

    fn delete_one_sql(&self) -> &str {
        "DELETE FROM memberships WHERE group_id = ? AND user_name = ?"
    }

    fn select_by_key_sql(&self) -> &str {
        SELECT_MEMBERSHIP
    }

    fn new_entity(&self) -> Membership {
        Membership::default()
    }

    fn bind_insert(&self, stmt: &mut dyn Statement, m: &Membership) -> DriverResult<()> {
        let next = bind_key(stmt, 1, &(m.group_id, m.user.clone()))?;
        stmt.set(next, Value::from(m.title.as_str()))
    }

    fn bind_update(&self, stmt: &mut dyn Statement, m: &Membership) -> DriverResult<()> {
        stmt.set(1, Value::from(m.title.as_str()))?;
        bind_key(stmt, 2, &(m.group_id, m.user.clone())).map(|_| ())
    }

    fn bind_delete(&self, stmt: &mut dyn Statement, m: &Membership) -> DriverResult<()> {
        bind_key(stmt, 1, &(m.group_id, m.user.clone())).map(|_| ())
    }

    fn bind_fetch(&self, row: &Row, m: &mut Membership) -> DriverResult<()> {
        m.group_id = column(row, 0)?;
        m.user = column(row, 1)?;
        m.title = column(row, 2)?;
        Ok(())
    }
}

/// Records every requested pause instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<u64>>,
    interrupt_on_call: Option<usize>,
}

impl RecordingSleeper {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Interrupts the `n`-th pause (1-based).
    pub fn interrupting(n: usize) -> Arc<Self> {
        Arc::new(Self {
            delays: Mutex::new(Vec::new()),
            interrupt_on_call: Some(n),
        })
    }

    pub fn delays_ms(&self) -> Vec<u64> {
        self.delays.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        let mut delays = self.delays.lock().unwrap();
        delays.push(duration.as_millis() as u64);
        if Some(delays.len()) == self.interrupt_on_call {
            return Err(Interrupted);
        }
        Ok(())
    }
}

/// An in-memory driver with the `people` and `memberships` tables.
pub fn driver(reporting: BatchReporting) -> MemoryDatabase {
    let driver = MemoryDatabase::new();
    driver
        .create_table("people", &["id", "name", "age"], &["id"])
        .unwrap();
    driver
        .create_table("memberships", &["group_id", "user_name", "title"], &["group_id", "user_name"])
        .unwrap();
    driver.set_batch_reporting(reporting).unwrap();
    driver
}

/// Opens `driver` through `dialect`, optionally overriding its capabilities.
pub fn open(
    driver: &MemoryDatabase,
    dialect: Arc<dyn SqlDialect>,
    capabilities: Option<Capabilities>,
    sleeper: Arc<RecordingSleeper>,
) -> Database {
    let mut config = OrmConfig::new("rustmemorm:memory");
    config.capabilities = capabilities;
    Database::with_dialect(Arc::new(driver.clone()), config, dialect).with_sleeper(sleeper)
}

/// The driver configurations the engine has to work with.
#[derive(Debug, Clone, Copy)]
pub enum Setup {
    /// Exact per-row counts, everything batched.
    Batched,
    /// Exact aggregate count only, like Oracle.
    TotalOnly,
    /// Nothing reported, every row executed on its own.
    RowByRow,
}

pub const ALL_SETUPS: [Setup; 3] = [Setup::Batched, Setup::TotalOnly, Setup::RowByRow];

pub struct Harness {
    pub driver: MemoryDatabase,
    pub db: Database,
    pub sleeper: Arc<RecordingSleeper>,
}

impl Harness {
    pub fn new(setup: Setup) -> Self {
        Self::with_sleeper(setup, RecordingSleeper::new())
    }

    pub fn with_sleeper(setup: Setup, sleeper: Arc<RecordingSleeper>) -> Self {
        let (reporting, capabilities) = match setup {
            Setup::Batched => (BatchReporting::Exact, None),
            Setup::TotalOnly => (BatchReporting::NoInfo, None),
            Setup::RowByRow => (BatchReporting::Absent, Some(Capabilities::NONE)),
        };
        let dialect: Arc<dyn SqlDialect> = match setup {
            Setup::TotalOnly => Arc::new(OracleDialect),
            Setup::Batched | Setup::RowByRow => Arc::new(MemoryDialect),
        };
        let driver = driver(reporting);
        let db = open(&driver, dialect, capabilities, Arc::clone(&sleeper));
        Self {
            driver,
            db,
            sleeper,
        }
    }

    pub fn people(&self) -> Access<People> {
        self.db.access(People)
    }

    pub fn stats(&self) -> MemoryStats {
        self.driver.stats().unwrap()
    }

    pub fn prepared(&self) -> Vec<String> {
        self.driver.prepared_sql().unwrap()
    }

    pub fn reset(&self) {
        self.driver.reset_stats().unwrap();
    }

    /// Rows of `people` sorted by id.
    pub fn stored_people(&self) -> Vec<Person> {
        let mut rows: Vec<Person> = self
            .driver
            .rows("people")
            .unwrap()
            .iter()
            .map(|row| {
                let mut p = Person::default();
                People.bind_fetch(row, &mut p).unwrap();
                p
            })
            .collect();
        rows.sort_by_key(|p| p.id);
        rows
    }
}
