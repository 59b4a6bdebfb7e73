use super::{DriverError, DriverResult, FromValue, Value};
use std::fmt;
use uuid::Uuid;

pub type Row = Vec<Value>;

/// Reads column `index` (0-based) of `row` as `T`.
pub fn column<T: FromValue>(row: &Row, index: usize) -> DriverResult<T> {
    let value = row.get(index).ok_or_else(|| {
        DriverError::new(format!(
            "Column index {} out of range for row of {} column(s)",
            index,
            row.len()
        ))
        .with_sql_state("07009")
    })?;
    T::from_value(value)
}

/// Primary key of an entity.
///
/// A key is one or more ordered scalar fields. `to_values` yields them in
/// the order the relation's key columns appear in its WHERE clauses.
pub trait Key: Clone + PartialEq + fmt::Debug + Send + Sync {
    fn to_values(&self) -> Vec<Value>;

    fn arity(&self) -> usize {
        self.to_values().len()
    }
}

macro_rules! scalar_key {
    ($($ty:ty),*) => {
        $(
            impl Key for $ty {
                fn to_values(&self) -> Vec<Value> {
                    vec![Value::from(self.clone())]
                }

                fn arity(&self) -> usize {
                    1
                }
            }
        )*
    };
}

scalar_key!(i32, i64, String, Uuid);

impl<A: Key, B: Key> Key for (A, B) {
    fn to_values(&self) -> Vec<Value> {
        let mut values = self.0.to_values();
        values.extend(self.1.to_values());
        values
    }
}

impl<A: Key, B: Key, C: Key> Key for (A, B, C) {
    fn to_values(&self) -> Vec<Value> {
        let mut values = self.0.to_values();
        values.extend(self.1.to_values());
        values.extend(self.2.to_values());
        values
    }
}
