use super::Reporting;
use anyhow::Result;
use rustmemorm::access::bind_key;
use rustmemorm::core::{DriverResult, column};
use rustmemorm::{
    Database, DriverConnection, MemoryDatabase, OrmConfig, Relation, Row, Statement,
    Value,
};
use std::sync::Arc;

pub(crate) struct Scenario {
    pub reporting: Reporting,
    pub existing: usize,
    pub new: usize,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub stall: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Person {
    id: i64,
    name: String,
    age: i64,
}

struct People;

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
        "SELECT id, name, age FROM people WHERE id = ?"
    }

    fn select_by_keys_sql(&self) -> Option<&str> {
        Some("SELECT id, name, age FROM people WHERE id IN ")
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

fn person(id: usize, prefix: &str) -> Person {
    Person {
        id: id as i64,
        name: format!("{}-{}", prefix, id),
        age: 20 + id as i64,
    }
}

pub(crate) fn run(scenario: Scenario) -> Result<()> {
    let driver = MemoryDatabase::new();
    driver.create_table("people", &["id", "name", "age"], &["id"])?;
    driver.set_batch_reporting(scenario.reporting.batch_reporting())?;

    let config = OrmConfig::new(driver.url())
        .dialect(scenario.reporting.dialect())
        .max_retries(scenario.max_retries)
        .retry_delay_unit_ms(scenario.retry_delay_ms);
    let db = Database::open(Arc::new(driver.clone()), config)?;
    let people = db.access(People);
    println!(
        "dialect {} ({}), retries {} x {} ms",
        db.dialect().name(),
        db.capabilities(),
        scenario.max_retries,
        scenario.retry_delay_ms
    );

    let seeded: Vec<Person> = (1..=scenario.existing).map(|id| person(id, "seed")).collect();
    driver.stall_next_batches(scenario.stall)?;
    match people.insert(&seeded) {
        Ok(()) => println!("inserted {} row(s)", seeded.len()),
        Err(err) => println!("insert failed: {} [{}]", err, err.kind()),
    }
    driver.stall_next_batches(0)?;

    let total = scenario.existing + scenario.new;
    let batch: Vec<Person> = (1..=total).map(|id| person(id, "upsert")).collect();
    match people.upsert(&batch) {
        Ok(()) => println!("upserted {} row(s)", batch.len()),
        Err(err) => println!("upsert failed: {} [{}]", err, err.kind()),
    }

    let keys: Vec<i64> = batch.iter().map(|p| p.id).collect();
    let mut stored = people.get(&keys)?.to_list()?;
    stored.sort_by_key(|p| p.id);
    for p in &stored {
        println!("{:>4}  {:<12} {}", p.id, p.name, p.age);
    }

    let stats = driver.stats()?;
    println!(
        "statements prepared {}, batches {}, updates {}, open statements {}",
        stats.statements_prepared,
        stats.batches_executed,
        stats.updates_executed,
        stats.open_statements()
    );
    Ok(())
}
