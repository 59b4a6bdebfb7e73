use super::parse::{Command, Filter, Operand, ParsedStatement};
use crate::core::{DriverError, DriverResult, Row, Value};
use std::collections::HashMap;

/// SQLSTATE and vendor code reported for unique key violations.
pub const UNIQUE_VIOLATION_STATE: &str = "23505";
pub const UNIQUE_VIOLATION_CODE: i32 = 1;

#[derive(Debug, Clone)]
pub(crate) struct Table {
    name: String,
    columns: Vec<String>,
    key: Vec<usize>,
    rows: Vec<Row>,
}

pub(crate) enum Outcome {
    Count(i64),
    Rows(Vec<Row>),
}

fn undefined(kind: &str, name: &str) -> DriverError {
    DriverError::new(format!("{} '{}' not found", kind, name)).with_sql_state("42P01")
}

impl Table {
    pub fn new(name: &str, columns: &[&str], key: &[&str]) -> DriverResult<Self> {
        let columns: Vec<String> = columns.iter().map(|c| c.to_lowercase()).collect();
        let key = key
            .iter()
            .map(|k| {
                let k = k.to_lowercase();
                columns
                    .iter()
                    .position(|c| *c == k)
                    .ok_or_else(|| undefined("Key column", &k))
            })
            .collect::<DriverResult<Vec<_>>>()?;
        if key.is_empty() {
            return Err(DriverError::new(format!("Table '{}' needs a key", name)));
        }
        Ok(Self {
            name: name.to_lowercase(),
            columns,
            key,
            rows: Vec::new(),
        })
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    fn column_index(&self, column: &str) -> DriverResult<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| undefined("Column", &format!("{}.{}", self.name, column)))
    }

    fn key_of<'a>(&self, row: &'a Row) -> Vec<&'a Value> {
        self.key.iter().map(|i| &row[*i]).collect()
    }

    fn duplicate_key(&self) -> DriverError {
        DriverError::new(format!(
            "duplicate key value violates unique constraint \"{}_pkey\"",
            self.name
        ))
        .with_sql_state(UNIQUE_VIOLATION_STATE)
        .with_vendor_code(UNIQUE_VIOLATION_CODE)
    }

    fn has_key(&self, row: &Row, skip: Option<usize>) -> bool {
        let key = self.key_of(row);
        self.rows
            .iter()
            .enumerate()
            .any(|(i, existing)| Some(i) != skip && self.key_of(existing) == key)
    }

    fn matches(&self, row: &Row, filter: &Filter, params: &[Option<Value>]) -> DriverResult<bool> {
        match filter {
            Filter::All => Ok(true),
            Filter::Eq(column, operand) => {
                let value = resolve(operand, params)?;
                Ok(row[self.column_index(column)?] == value)
            }
            Filter::In(column, list) => {
                let current = &row[self.column_index(column)?];
                for operand in list {
                    if *current == resolve(operand, params)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Filter::And(left, right) => {
                Ok(self.matches(row, left, params)? && self.matches(row, right, params)?)
            }
        }
    }

    fn insert(
        &mut self,
        columns: Option<&[String]>,
        values: &[Operand],
        params: &[Option<Value>],
    ) -> DriverResult<i64> {
        let targets: Vec<usize> = match columns {
            Some(columns) => columns
                .iter()
                .map(|c| self.column_index(c))
                .collect::<DriverResult<_>>()?,
            None => (0..self.columns.len()).collect(),
        };
        if targets.len() != values.len() {
            return Err(DriverError::new(format!(
                "INSERT has {} target column(s) but {} value(s)",
                targets.len(),
                values.len()
            ))
            .with_sql_state("21S01"));
        }

        let mut row = vec![Value::Null; self.columns.len()];
        for (target, operand) in targets.iter().zip(values) {
            row[*target] = resolve(operand, params)?;
        }
        if self.has_key(&row, None) {
            return Err(self.duplicate_key());
        }
        self.rows.push(row);
        Ok(1)
    }

    fn update(
        &mut self,
        assignments: &[(String, Operand)],
        filter: &Filter,
        params: &[Option<Value>],
    ) -> DriverResult<i64> {
        let resolved = assignments
            .iter()
            .map(|(column, operand)| Ok((self.column_index(column)?, resolve(operand, params)?)))
            .collect::<DriverResult<Vec<_>>>()?;
        check_bound(filter, params)?;

        let mut affected = 0;
        for i in 0..self.rows.len() {
            if !self.matches(&self.rows[i], filter, params)? {
                continue;
            }
            let mut updated = self.rows[i].clone();
            for (index, value) in &resolved {
                updated[*index] = value.clone();
            }
            if self.has_key(&updated, Some(i)) {
                return Err(self.duplicate_key());
            }
            self.rows[i] = updated;
            affected += 1;
        }
        Ok(affected)
    }

    fn delete(&mut self, filter: &Filter, params: &[Option<Value>]) -> DriverResult<i64> {
        check_bound(filter, params)?;
        let mut kept = Vec::with_capacity(self.rows.len());
        let mut affected = 0;
        for row in std::mem::take(&mut self.rows) {
            match self.matches(&row, filter, params) {
                Ok(true) => affected += 1,
                Ok(false) => kept.push(row),
                Err(err) => {
                    kept.push(row);
                    self.rows = kept;
                    return Err(err);
                }
            }
        }
        self.rows = kept;
        Ok(affected)
    }

    fn select(
        &self,
        columns: Option<&[String]>,
        filter: &Filter,
        params: &[Option<Value>],
    ) -> DriverResult<Vec<Row>> {
        let projection: Vec<usize> = match columns {
            Some(columns) => columns
                .iter()
                .map(|c| self.column_index(c))
                .collect::<DriverResult<_>>()?,
            None => (0..self.columns.len()).collect(),
        };
        check_bound(filter, params)?;

        let mut rows = Vec::new();
        for row in &self.rows {
            if self.matches(row, filter, params)? {
                rows.push(projection.iter().map(|i| row[*i].clone()).collect());
            }
        }
        Ok(rows)
    }
}

/// Fails unless every parameter `filter` refers to is bound, whether or not
/// any row is ever matched against it.
fn check_bound(filter: &Filter, params: &[Option<Value>]) -> DriverResult<()> {
    match filter {
        Filter::All => Ok(()),
        Filter::Eq(_, operand) => resolve(operand, params).map(|_| ()),
        Filter::In(_, list) => list
            .iter()
            .try_for_each(|operand| resolve(operand, params).map(|_| ())),
        Filter::And(left, right) => {
            check_bound(left, params)?;
            check_bound(right, params)
        }
    }
}

fn resolve(operand: &Operand, params: &[Option<Value>]) -> DriverResult<Value> {
    match operand {
        Operand::Literal(value) => Ok(value.clone()),
        Operand::Param(index) => params
            .get(index - 1)
            .cloned()
            .flatten()
            .ok_or_else(|| {
                DriverError::new(format!("No value specified for parameter {}", index))
                    .with_sql_state("07001")
            }),
    }
}

#[derive(Debug, Default, Clone)]
pub(crate) struct Tables {
    tables: HashMap<String, Table>,
}

impl Tables {
    pub fn create(&mut self, table: Table) -> DriverResult<()> {
        if self.tables.contains_key(&table.name) {
            return Err(DriverError::new(format!("Table '{}' already exists", table.name))
                .with_sql_state("42P07"));
        }
        self.tables.insert(table.name.clone(), table);
        Ok(())
    }

    pub fn get(&self, name: &str) -> DriverResult<&Table> {
        let name = name.to_lowercase();
        self.tables.get(&name).ok_or_else(|| undefined("Table", &name))
    }

    fn get_mut(&mut self, name: &str) -> DriverResult<&mut Table> {
        self.tables.get_mut(name).ok_or_else(|| undefined("Table", name))
    }

    pub fn execute(
        &mut self,
        statement: &ParsedStatement,
        params: &[Option<Value>],
    ) -> DriverResult<Outcome> {
        match &statement.command {
            Command::Insert {
                table,
                columns,
                values,
            } => self
                .get_mut(table)?
                .insert(columns.as_deref(), values, params)
                .map(Outcome::Count),
            Command::Update {
                table,
                assignments,
                filter,
            } => self
                .get_mut(table)?
                .update(assignments, filter, params)
                .map(Outcome::Count),
            Command::Delete { table, filter } => self
                .get_mut(table)?
                .delete(filter, params)
                .map(Outcome::Count),
            Command::Select {
                table,
                columns,
                filter,
            } => self
                .get(table)?
                .select(columns.as_deref(), filter, params)
                .map(Outcome::Rows),
        }
    }
}
