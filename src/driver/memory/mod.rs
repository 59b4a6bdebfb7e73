//! In-memory reference driver.
//!
//! Implements the driver contract over a handful of keyed tables so the
//! access layer can be exercised end to end without a database server. The
//! SQL surface is the one the access layer emits: single-row INSERT, UPDATE
//! and DELETE by key, and SELECT with `=`/`IN` filters.

mod parse;
mod store;

pub use store::{UNIQUE_VIOLATION_CODE, UNIQUE_VIOLATION_STATE};

use super::{Cursor, DriverConnection, SUCCESS_NO_INFO, Statement};
use crate::core::{DriverError, DriverResult, Row, Value};
use lru::LruCache;
use parse::ParsedStatement;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use store::{Outcome, Table, Tables};

const STATEMENT_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(128) {
    Some(size) => size,
    None => panic!("statement cache size must be non-zero"),
};

pub const DEFAULT_URL: &str = "rustmemorm:memory";

/// What `execute_batch` reports back for each parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchReporting {
    /// The exact affected-row count of every row.
    #[default]
    Exact,
    /// `SUCCESS_NO_INFO` for every row; only the aggregate count is known.
    NoInfo,
    /// No per-row array at all.
    Absent,
}

/// Resource and execution counters of a [`MemoryDatabase`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub statements_prepared: usize,
    pub statements_closed: usize,
    pub redundant_statement_closes: usize,
    pub updates_executed: usize,
    pub batches_executed: usize,
    pub queries_executed: usize,
    pub cursors_opened: usize,
    pub cursors_closed: usize,
    pub redundant_cursor_closes: usize,
    pub statement_cache_hits: usize,
}

impl MemoryStats {
    pub fn open_statements(&self) -> usize {
        self.statements_prepared - self.statements_closed
    }

    pub fn open_cursors(&self) -> usize {
        self.cursors_opened - self.cursors_closed
    }
}

#[derive(Default)]
struct Store {
    tables: Tables,
    reporting: BatchReporting,
    stalled_batches: usize,
    pending_fault: Option<DriverError>,
    stats: MemoryStats,
    prepared_sql: Vec<String>,
}

impl Store {
    fn take_fault(&mut self) -> DriverResult<()> {
        match self.pending_fault.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Shared handle to one in-memory database.
#[derive(Clone)]
pub struct MemoryDatabase {
    url: String,
    store: Arc<Mutex<Store>>,
    statement_cache: Arc<Mutex<LruCache<String, Arc<ParsedStatement>>>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::with_url(DEFAULT_URL)
    }

    /// Creates a database that reports `url`, e.g. to impersonate a vendor.
    pub fn with_url(url: &str) -> Self {
        Self {
            url: url.to_string(),
            store: Arc::new(Mutex::new(Store::default())),
            statement_cache: Arc::new(Mutex::new(LruCache::new(STATEMENT_CACHE_SIZE))),
        }
    }

    pub fn create_table(&self, name: &str, columns: &[&str], key: &[&str]) -> DriverResult<()> {
        let table = Table::new(name, columns, key)?;
        self.store.lock()?.tables.create(table)
    }

    pub fn set_batch_reporting(&self, reporting: BatchReporting) -> DriverResult<()> {
        self.store.lock()?.reporting = reporting;
        Ok(())
    }

    /// The next `count` batch executions apply nothing and report zero rows.
    pub fn stall_next_batches(&self, count: usize) -> DriverResult<()> {
        self.store.lock()?.stalled_batches = count;
        Ok(())
    }

    /// The next execution of any statement fails with `err`.
    pub fn fail_next_execution(&self, err: DriverError) -> DriverResult<()> {
        self.store.lock()?.pending_fault = Some(err);
        Ok(())
    }

    pub fn stats(&self) -> DriverResult<MemoryStats> {
        Ok(self.store.lock()?.stats.clone())
    }

    pub fn reset_stats(&self) -> DriverResult<()> {
        let mut store = self.store.lock()?;
        store.stats = MemoryStats::default();
        store.prepared_sql.clear();
        Ok(())
    }

    /// SQL text of every statement prepared since the last reset.
    pub fn prepared_sql(&self) -> DriverResult<Vec<String>> {
        Ok(self.store.lock()?.prepared_sql.clone())
    }

    pub fn rows(&self, table: &str) -> DriverResult<Vec<Row>> {
        Ok(self.store.lock()?.tables.get(table)?.rows().to_vec())
    }

    pub fn row_count(&self, table: &str) -> DriverResult<usize> {
        Ok(self.store.lock()?.tables.get(table)?.rows().len())
    }

    fn parse_cached(&self, sql: &str) -> DriverResult<(Arc<ParsedStatement>, bool)> {
        let mut cache = self.statement_cache.lock()?;
        if let Some(parsed) = cache.get(sql) {
            return Ok((Arc::clone(parsed), true));
        }
        let parsed = Arc::new(parse::parse(sql)?);
        cache.put(sql.to_string(), Arc::clone(&parsed));
        Ok((parsed, false))
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverConnection for MemoryDatabase {
    fn url(&self) -> &str {
        &self.url
    }

    fn prepare(&self, sql: &str) -> DriverResult<Box<dyn Statement>> {
        let (parsed, cached) = self.parse_cached(sql)?;
        let mut store = self.store.lock()?;
        store.stats.statements_prepared += 1;
        if cached {
            store.stats.statement_cache_hits += 1;
        }
        store.prepared_sql.push(sql.to_string());

        Ok(Box::new(MemoryStatement {
            sql: sql.to_string(),
            params: vec![None; parsed.parameter_count],
            parsed,
            store: Arc::clone(&self.store),
            batch: Vec::new(),
            last_update_count: None,
            closed: false,
        }))
    }
}

struct MemoryStatement {
    sql: String,
    parsed: Arc<ParsedStatement>,
    store: Arc<Mutex<Store>>,
    params: Vec<Option<Value>>,
    batch: Vec<Vec<Option<Value>>>,
    last_update_count: Option<i64>,
    closed: bool,
}

impl MemoryStatement {
    fn ensure_open(&self) -> DriverResult<()> {
        if self.closed {
            return Err(DriverError::new("Statement is closed").with_sql_state("HY010"));
        }
        Ok(())
    }
}

fn expect_count(outcome: Outcome) -> DriverResult<i64> {
    match outcome {
        Outcome::Count(n) => Ok(n),
        Outcome::Rows(_) => Err(DriverError::new("Statement returned a result set")
            .with_sql_state("07003")),
    }
}

impl Statement for MemoryStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn set(&mut self, index: usize, value: Value) -> DriverResult<()> {
        self.ensure_open()?;
        if index == 0 || index > self.params.len() {
            return Err(DriverError::new(format!(
                "Parameter index {} out of range (1..={})",
                index,
                self.params.len()
            ))
            .with_sql_state("07009"));
        }
        self.params[index - 1] = Some(value);
        Ok(())
    }

    fn clear_parameters(&mut self) {
        self.params.iter_mut().for_each(|p| *p = None);
    }

    fn add_batch(&mut self) -> DriverResult<()> {
        self.ensure_open()?;
        self.batch.push(self.params.clone());
        Ok(())
    }

    fn clear_batch(&mut self) {
        self.batch.clear();
    }

    fn execute_update(&mut self) -> DriverResult<i64> {
        self.ensure_open()?;
        let mut store = self.store.lock()?;
        store.stats.updates_executed += 1;
        store.take_fault()?;

        let count = expect_count(store.tables.execute(&self.parsed, &self.params)?)?;
        self.last_update_count = Some(count);
        Ok(count)
    }

    fn execute_batch(&mut self) -> DriverResult<Option<Vec<i64>>> {
        self.ensure_open()?;
        let mut store = self.store.lock()?;
        store.stats.batches_executed += 1;
        store.take_fault()?;

        let counts = if store.stalled_batches > 0 {
            store.stalled_batches -= 1;
            vec![0; self.batch.len()]
        } else {
            let snapshot = store.tables.clone();
            let mut counts = Vec::with_capacity(self.batch.len());
            for params in &self.batch {
                let outcome = store
                    .tables
                    .execute(&self.parsed, params)
                    .and_then(expect_count);
                match outcome {
                    Ok(count) => counts.push(count),
                    Err(err) => {
                        store.tables = snapshot;
                        self.last_update_count = None;
                        return Err(err);
                    }
                }
            }
            counts
        };

        self.last_update_count = Some(counts.iter().sum());
        Ok(match store.reporting {
            BatchReporting::Exact => Some(counts),
            BatchReporting::NoInfo => Some(vec![SUCCESS_NO_INFO; counts.len()]),
            BatchReporting::Absent => None,
        })
    }

    fn update_count(&self) -> Option<i64> {
        self.last_update_count
    }

    fn execute_query(&mut self) -> DriverResult<Box<dyn Cursor>> {
        self.ensure_open()?;
        let mut store = self.store.lock()?;
        store.stats.queries_executed += 1;
        store.take_fault()?;

        let rows = match store.tables.execute(&self.parsed, &self.params)? {
            Outcome::Rows(rows) => rows,
            Outcome::Count(_) => {
                return Err(DriverError::new("Statement did not return a result set")
                    .with_sql_state("07005"));
            }
        };
        store.stats.cursors_opened += 1;

        Ok(Box::new(MemoryCursor {
            rows: rows.into(),
            store: Arc::clone(&self.store),
            closed: false,
        }))
    }

    fn close(&mut self) -> DriverResult<()> {
        let mut store = self.store.lock()?;
        if self.closed {
            store.stats.redundant_statement_closes += 1;
        } else {
            self.closed = true;
            store.stats.statements_closed += 1;
        }
        Ok(())
    }
}

struct MemoryCursor {
    rows: VecDeque<Row>,
    store: Arc<Mutex<Store>>,
    closed: bool,
}

impl Cursor for MemoryCursor {
    fn next_row(&mut self) -> DriverResult<Option<Row>> {
        if self.closed {
            return Err(DriverError::new("Cursor is closed").with_sql_state("24000"));
        }
        Ok(self.rows.pop_front())
    }

    fn close(&mut self) -> DriverResult<()> {
        let mut store = self.store.lock()?;
        if self.closed {
            store.stats.redundant_cursor_closes += 1;
        } else {
            self.closed = true;
            self.rows.clear();
            store.stats.cursors_closed += 1;
        }
        Ok(())
    }
}
