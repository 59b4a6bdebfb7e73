use super::{ResultSet, already_obtained};
use crate::access::Relation;
use crate::core::{DriverError, OrmError, Result, Row};
use crate::dialect::SqlDialect;
use crate::driver::{Cursor, Scoped, Statement};
use log::warn;
use std::sync::Arc;

/// A result that reads entities from an open cursor as it is iterated.
///
/// Owns the cursor and its statement and releases both together once the
/// cursor is exhausted, a row fails, the result is closed, or it is dropped.
pub struct StreamingResult<R: Relation> {
    relation: Arc<R>,
    dialect: Arc<dyn SqlDialect>,
    cursor: Option<Scoped<Box<dyn Cursor>>>,
    statement: Option<Scoped<Box<dyn Statement>>>,
    pending: Option<Row>,
    obtained: bool,
}

impl<R: Relation> StreamingResult<R> {
    /// `first` is a row already read from `cursor`.
    pub(crate) fn new(
        relation: Arc<R>,
        dialect: Arc<dyn SqlDialect>,
        statement: Scoped<Box<dyn Statement>>,
        cursor: Scoped<Box<dyn Cursor>>,
        first: Row,
    ) -> Self {
        Self {
            relation,
            dialect,
            cursor: Some(cursor),
            statement: Some(statement),
            pending: Some(first),
            obtained: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_none() && self.statement.is_none()
    }

    fn convert(&self, err: DriverError) -> OrmError {
        self.dialect
            .convert_error("fetch", self.relation.relation_name(), err)
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        if let Some(row) = self.pending.take() {
            return Ok(Some(row));
        }
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };
        match cursor.next_row() {
            Ok(Some(row)) => Ok(Some(row)),
            Ok(None) => {
                self.close()?;
                Ok(None)
            }
            Err(err) => {
                let err = self.convert(err);
                self.release_quietly();
                Err(err)
            }
        }
    }

    fn advance(&mut self) -> Result<Option<R::Entity>> {
        let Some(row) = self.next_row()? else {
            return Ok(None);
        };
        let mut entity = self.relation.new_entity();
        if let Err(err) = self.relation.bind_fetch(&row, &mut entity) {
            let err = self.convert(err);
            self.release_quietly();
            return Err(err);
        }
        Ok(Some(entity))
    }

    fn release_quietly(&mut self) {
        self.pending = None;
        if let Err(err) = self.close() {
            warn!("failed to release streaming result: {}", err);
        }
    }
}

impl<R: Relation> ResultSet<R::Entity> for StreamingResult<R> {
    fn iter(&mut self) -> Result<Box<dyn Iterator<Item = Result<R::Entity>> + '_>> {
        if self.obtained {
            return Err(already_obtained());
        }
        self.obtained = true;
        Ok(Box::new(std::iter::from_fn(move || {
            self.advance().transpose()
        })))
    }

    fn close(&mut self) -> Result<()> {
        self.pending = None;
        let cursor = self.cursor.take().map(Scoped::close);
        let statement = self.statement.take().map(Scoped::close);
        for outcome in [cursor, statement].into_iter().flatten() {
            outcome.map_err(|err| self.convert(err))?;
        }
        Ok(())
    }
}

impl<R: Relation> Drop for StreamingResult<R> {
    fn drop(&mut self) {
        if !self.is_closed() {
            self.release_quietly();
        }
    }
}
