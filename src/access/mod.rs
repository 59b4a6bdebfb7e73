//! Mutation execution engine.
//!
//! [`Access`] runs homogeneous batches of inserts, updates, deletes and
//! upserts of one entity type, and fetches entities by key. It picks batched
//! or row-by-row execution from the dialect's capabilities and turns wrong
//! affected-row counts into [`OrmError::Concurrency`].

pub mod relation;
pub mod retry;

pub use relation::{Relation, bind_key};
pub use retry::{Interrupted, Interrupter, RetryPolicy, Sleeper, ThreadSleeper};

use crate::core::{DriverError, DriverResult, Key, OrmError, Result, Row, Value};
use crate::dialect::SqlDialect;
use crate::driver::{Cursor, DriverConnection, Scoped, Statement};
use crate::result::{ListResult, ResultSet, StreamingResult};
use std::sync::Arc;
use tracing::{Level, event, info_span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mutation {
    Insert,
    Update,
    Delete,
}

impl Mutation {
    fn name(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    fn sql<R: Relation>(self, relation: &R) -> &str {
        match self {
            Self::Insert => relation.insert_one_sql(),
            Self::Update => relation.update_one_sql(),
            Self::Delete => relation.delete_one_sql(),
        }
    }

    fn bind<R: Relation>(
        self,
        relation: &R,
        stmt: &mut dyn Statement,
        entity: &R::Entity,
    ) -> DriverResult<()> {
        match self {
            Self::Insert => relation.bind_insert(stmt, entity),
            Self::Update => relation.bind_update(stmt, entity),
            Self::Delete => relation.bind_delete(stmt, entity),
        }
    }
}

/// Executes mutations and lookups of one relation over one connection.
///
/// Safe to reuse for sequential calls. Each call holds at most one open
/// statement and releases it before returning.
pub struct Access<R: Relation> {
    relation: Arc<R>,
    connection: Arc<dyn DriverConnection>,
    dialect: Arc<dyn SqlDialect>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl<R: Relation> Access<R> {
    pub fn new(
        relation: R,
        connection: Arc<dyn DriverConnection>,
        dialect: Arc<dyn SqlDialect>,
    ) -> Self {
        Self {
            relation: Arc::new(relation),
            connection,
            dialect,
            retry: RetryPolicy::default(),
            sleeper: Arc::new(ThreadSleeper::new()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn relation(&self) -> &R {
        &self.relation
    }

    pub fn dialect(&self) -> &Arc<dyn SqlDialect> {
        &self.dialect
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn set_max_retries(&mut self, max_retries: u32) {
        self.retry.max_retries = max_retries;
    }

    pub fn set_retry_delay_unit_ms(&mut self, unit_ms: u64) {
        self.retry.retry_delay_unit_ms = unit_ms;
    }

    pub fn insert<'a, I>(&self, entities: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a R::Entity>,
    {
        let entities: Vec<&R::Entity> = entities.into_iter().collect();
        let span = info_span!("access.insert", relation = %self.relation.relation_name(), count = entities.len());
        let _enter = span.enter();
        self.mutate(Mutation::Insert, &entities)
    }

    pub fn update<'a, I>(&self, entities: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a R::Entity>,
    {
        let entities: Vec<&R::Entity> = entities.into_iter().collect();
        let span = info_span!("access.update", relation = %self.relation.relation_name(), count = entities.len());
        let _enter = span.enter();
        self.mutate(Mutation::Update, &entities)
    }

    pub fn delete<'a, I>(&self, entities: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a R::Entity>,
    {
        let entities: Vec<&R::Entity> = entities.into_iter().collect();
        let span = info_span!("access.delete", relation = %self.relation.relation_name(), count = entities.len());
        let _enter = span.enter();
        self.mutate(Mutation::Delete, &entities)
    }

    /// Updates every entity that exists and inserts the rest.
    ///
    /// A duplicate key raised while inserting the missing entities reaches
    /// the caller as [`OrmError::DuplicateKey`].
    pub fn upsert<'a, I>(&self, entities: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a R::Entity>,
    {
        let entities: Vec<&R::Entity> = entities.into_iter().collect();
        let span = info_span!("access.upsert", relation = %self.relation.relation_name(), count = entities.len());
        let _enter = span.enter();
        if entities.is_empty() {
            return Ok(());
        }

        let missing = self.attempt_update(&entities)?;
        event!(
            Level::DEBUG,
            updated = entities.len() - missing.len(),
            missing = missing.len(),
            "upsert update phase finished"
        );
        if missing.is_empty() {
            return Ok(());
        }
        self.mutate(Mutation::Insert, &missing)
    }

    /// Fetches the entities with the given keys, in no particular order.
    pub fn get<'k, I>(&self, keys: I) -> Result<Box<dyn ResultSet<R::Entity>>>
    where
        I: IntoIterator<Item = &'k R::Key>,
    {
        let keys: Vec<&R::Key> = keys.into_iter().collect();
        let span = info_span!("access.get", relation = %self.relation.relation_name(), count = keys.len());
        let _enter = span.enter();

        match keys.as_slice() {
            [] => Ok(Box::new(ListResult::empty())),
            [key] => {
                let found = self.get_one(key)?;
                Ok(Box::new(ListResult::new(found.into_iter().collect())))
            }
            _ => match self.relation.select_by_keys_sql() {
                Some(prefix) => self.get_by_sql_in(prefix, &keys),
                None => self.get_each(&keys),
            },
        }
    }

    /// Fetches the entity with the given key, if there is one.
    pub fn get_one(&self, key: &R::Key) -> Result<Option<R::Entity>> {
        let sql = self.relation.select_by_key_sql();
        let mut stmt = Scoped::new(self.prepare(sql)?);
        bind_key(&mut **stmt, 1, key).map_err(self.convert("fetch"))?;
        self.query_one_on(stmt)
    }

    /// Runs `sql` with `params`, expecting at most one row.
    pub fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<R::Entity>> {
        let stmt = self.prepare_bound(sql, params)?;
        self.query_one_on(stmt)
    }

    /// Runs `sql` with `params` and streams the matching entities.
    pub fn query_list(&self, sql: &str, params: &[Value]) -> Result<Box<dyn ResultSet<R::Entity>>> {
        let stmt = self.prepare_bound(sql, params)?;
        self.query_list_on(stmt)
    }

    fn convert(&self, operation: &'static str) -> impl Fn(DriverError) -> OrmError + '_ {
        move |err| {
            self.dialect
                .convert_error(operation, self.relation.relation_name(), err)
        }
    }

    fn concurrency(&self, operation: &str, detail: String) -> OrmError {
        OrmError::Concurrency {
            operation: operation.to_string(),
            entity: self.relation.relation_name().to_string(),
            detail,
        }
    }

    fn prepare(&self, sql: &str) -> Result<Box<dyn Statement>> {
        self.connection
            .prepare(sql)
            .map_err(|err| {
                self.dialect.convert_error(
                    &format!("prepare SQL\n{}\n", sql),
                    self.relation.relation_name(),
                    err,
                )
            })
    }

    fn prepare_bound(&self, sql: &str, params: &[Value]) -> Result<Scoped<Box<dyn Statement>>> {
        let mut stmt = Scoped::new(self.prepare(sql)?);
        for (i, value) in params.iter().enumerate() {
            stmt.set(i + 1, value.clone()).map_err(self.convert("fetch"))?;
        }
        Ok(stmt)
    }

    /// Releases `stmt` after `outcome` was computed with it.
    ///
    /// A failure of the work wins over a failure to close.
    fn finish<T>(
        &self,
        operation: &'static str,
        stmt: Scoped<Box<dyn Statement>>,
        outcome: Result<T>,
    ) -> Result<T> {
        match outcome {
            Ok(value) => {
                stmt.close().map_err(self.convert(operation))?;
                Ok(value)
            }
            Err(err) => {
                drop(stmt);
                Err(err)
            }
        }
    }

    fn mutate(&self, mutation: Mutation, entities: &[&R::Entity]) -> Result<()> {
        if entities.is_empty() {
            return Ok(());
        }
        let mut stmt = Scoped::new(self.prepare(mutation.sql(&*self.relation))?);
        let outcome = if self.dialect.can_determine_total_batch_update_count() {
            self.execute_as_batch(mutation, &mut **stmt, entities)
        } else {
            self.execute_individually(mutation, &mut **stmt, entities)
        };
        self.finish(mutation.name(), stmt, outcome)
    }

    fn execute_as_batch(
        &self,
        mutation: Mutation,
        stmt: &mut dyn Statement,
        entities: &[&R::Entity],
    ) -> Result<()> {
        let convert = self.convert(mutation.name());
        for entity in entities {
            mutation
                .bind(&*self.relation, stmt, entity)
                .map_err(&convert)?;
            stmt.add_batch().map_err(&convert)?;
        }
        self.attempt_batch_execute(mutation.name(), stmt, entities.len())
    }

    fn execute_individually(
        &self,
        mutation: Mutation,
        stmt: &mut dyn Statement,
        entities: &[&R::Entity],
    ) -> Result<()> {
        let convert = self.convert(mutation.name());
        let mut not_applied = 0;
        for entity in entities {
            stmt.clear_parameters();
            mutation
                .bind(&*self.relation, stmt, entity)
                .map_err(&convert)?;
            if stmt.execute_update().map_err(&convert)? != 1 {
                not_applied += 1;
            }
        }
        if not_applied > 0 {
            event!(Level::ERROR, not_applied, total = entities.len(), "rows not applied");
            return Err(self.concurrency(
                mutation.name(),
                format!("{} of {} row(s) not applied", not_applied, entities.len()),
            ));
        }
        Ok(())
    }

    /// Executes the bound batch, resubmitting it while the affected-row
    /// total differs from `expected` and retries remain.
    fn attempt_batch_execute(
        &self,
        operation: &'static str,
        stmt: &mut dyn Statement,
        expected: usize,
    ) -> Result<()> {
        if expected == 0 {
            return Ok(());
        }
        let expected = expected as i64;
        let max_retries = self.retry.max_retries;
        let mut retry_index = 0;
        loop {
            let affected = self
                .dialect
                .execute_batch(stmt)
                .map_err(self.convert(operation))?;
            if affected == expected {
                return Ok(());
            }
            if retry_index >= max_retries {
                event!(
                    Level::ERROR,
                    attempts = retry_index + 1,
                    expected,
                    affected,
                    "batch row count mismatch, retries exhausted"
                );
                return Err(self.concurrency(
                    operation,
                    format!("expected {} row(s), {} affected", expected, affected),
                ));
            }

            // Attempt n + 1 waits unit * n, so the first retry already pauses.
            retry_index += 1;
            let delay = self.retry.delay_before(retry_index);
            event!(
                Level::WARN,
                retry = retry_index,
                delay_ms = delay.as_millis() as u64,
                expected,
                affected,
                "batch row count mismatch, retrying"
            );
            if self.sleeper.sleep(delay).is_err() {
                return Err(OrmError::RetryInterrupted {
                    operation: operation.to_string(),
                    entity: self.relation.relation_name().to_string(),
                });
            }
        }
    }

    /// Runs the update of `entities` and returns the ones that matched no
    /// row, in their original order.
    fn attempt_update<'e>(&self, entities: &[&'e R::Entity]) -> Result<Vec<&'e R::Entity>> {
        let mut stmt = Scoped::new(self.prepare(self.relation.update_one_sql())?);
        let outcome = if self.dialect.can_determine_individual_batch_update_counts() {
            self.attempt_update_as_batch(&mut **stmt, entities)
        } else {
            self.attempt_update_individually(&mut **stmt, entities)
        };
        self.finish("update", stmt, outcome)
    }

    fn attempt_update_as_batch<'e>(
        &self,
        stmt: &mut dyn Statement,
        entities: &[&'e R::Entity],
    ) -> Result<Vec<&'e R::Entity>> {
        let convert = self.convert("update");
        for entity in entities {
            self.relation.bind_update(stmt, entity).map_err(&convert)?;
            stmt.add_batch().map_err(&convert)?;
        }
        let Some(counts) = stmt.execute_batch().map_err(&convert)? else {
            return Ok(entities.to_vec());
        };
        // Rows reporting anything but exactly one affected row are re-inserted.
        Ok(entities
            .iter()
            .enumerate()
            .filter(|(i, _)| counts.get(*i) != Some(&1))
            .map(|(_, entity)| *entity)
            .collect())
    }

    fn attempt_update_individually<'e>(
        &self,
        stmt: &mut dyn Statement,
        entities: &[&'e R::Entity],
    ) -> Result<Vec<&'e R::Entity>> {
        let convert = self.convert("update");
        let mut missing = Vec::new();
        for entity in entities {
            stmt.clear_parameters();
            self.relation.bind_update(stmt, entity).map_err(&convert)?;
            if stmt.execute_update().map_err(&convert)? != 1 {
                missing.push(*entity);
            }
        }
        Ok(missing)
    }

    fn get_by_sql_in(&self, prefix: &str, keys: &[&R::Key]) -> Result<Box<dyn ResultSet<R::Entity>>> {
        let placeholders = vec!["?"; keys.iter().map(|k| k.arity()).sum()].join(",");
        let sql = format!("{}({})", prefix, placeholders);
        let mut stmt = Scoped::new(self.prepare(&sql)?);
        let mut index = 1;
        for key in keys {
            index = bind_key(&mut **stmt, index, *key).map_err(self.convert("fetch"))?;
        }
        self.query_list_on(stmt)
    }

    fn get_each(&self, keys: &[&R::Key]) -> Result<Box<dyn ResultSet<R::Entity>>> {
        log::debug!(
            "{} has no IN-list lookup, fetching {} keys one by one",
            self.relation.relation_name(),
            keys.len()
        );
        let mut found = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(entity) = self.get_one(key)? {
                found.push(entity);
            }
        }
        Ok(Box::new(ListResult::new(found)))
    }

    fn fetch(&self, row: &Row) -> Result<R::Entity> {
        let mut entity = self.relation.new_entity();
        self.relation
            .bind_fetch(row, &mut entity)
            .map_err(self.convert("fetch"))?;
        Ok(entity)
    }

    fn query_one_on(&self, mut stmt: Scoped<Box<dyn Statement>>) -> Result<Option<R::Entity>> {
        let outcome = self.read_one(&mut **stmt);
        self.finish("fetch", stmt, outcome)
    }

    fn read_one(&self, stmt: &mut dyn Statement) -> Result<Option<R::Entity>> {
        let convert = self.convert("fetch");
        let mut cursor = Scoped::new(stmt.execute_query().map_err(&convert)?);
        let outcome = match cursor.next_row().map_err(&convert)? {
            None => Ok(None),
            Some(row) => {
                let entity = self.fetch(&row)?;
                match cursor.next_row().map_err(&convert)? {
                    Some(_) => Err(OrmError::plain("Multiple results")),
                    None => Ok(Some(entity)),
                }
            }
        };
        let entity = outcome?;
        cursor.close().map_err(&convert)?;
        Ok(entity)
    }

    fn query_list_on(
        &self,
        mut stmt: Scoped<Box<dyn Statement>>,
    ) -> Result<Box<dyn ResultSet<R::Entity>>> {
        let convert = self.convert("fetch");
        let mut cursor: Scoped<Box<dyn Cursor>> =
            Scoped::new(stmt.execute_query().map_err(&convert)?);
        match cursor.next_row().map_err(&convert)? {
            None => {
                cursor.close().map_err(&convert)?;
                stmt.close().map_err(&convert)?;
                Ok(Box::new(ListResult::empty()))
            }
            Some(first) => Ok(Box::new(StreamingResult::new(
                Arc::clone(&self.relation),
                Arc::clone(&self.dialect),
                stmt,
                cursor,
                first,
            ))),
        }
    }
}

impl<R: Relation> std::fmt::Debug for Access<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Access")
            .field("relation", &self.relation.relation_name())
            .field("dialect", &self.dialect.name())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
