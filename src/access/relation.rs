use crate::core::{DriverResult, Key, Row};
use crate::driver::Statement;

/// Statement templates and binders of one entity type.
///
/// Implementations are usually generated from the entity's column and key
/// metadata; [`Access`](super::Access) only needs what is listed here.
/// Every SQL template takes its parameters in exactly the order the matching
/// binder sets them, starting at index 1.
pub trait Relation: Send + Sync + 'static {
    type Entity: Send + 'static;
    type Key: Key;

    /// Table or entity name used in error messages.
    fn relation_name(&self) -> &str;

    fn insert_one_sql(&self) -> &str;

    fn update_one_sql(&self) -> &str;

    fn delete_one_sql(&self) -> &str;

    /// Lookup of one row by its full key.
    fn select_by_key_sql(&self) -> &str;

    /// Prefix of an IN-list lookup, e.g. `SELECT .. FROM t WHERE id IN `.
    ///
    /// The parenthesised placeholder list is appended per call. Relations
    /// whose key cannot be expressed as a single IN-list return `None` and
    /// are fetched key by key.
    fn select_by_keys_sql(&self) -> Option<&str> {
        None
    }

    fn new_entity(&self) -> Self::Entity;

    fn bind_insert(&self, stmt: &mut dyn Statement, entity: &Self::Entity) -> DriverResult<()>;

    fn bind_update(&self, stmt: &mut dyn Statement, entity: &Self::Entity) -> DriverResult<()>;

    fn bind_delete(&self, stmt: &mut dyn Statement, entity: &Self::Entity) -> DriverResult<()>;

    /// Copies one fetched row into a blank entity.
    fn bind_fetch(&self, row: &Row, entity: &mut Self::Entity) -> DriverResult<()>;
}

/// Binds the values of `key` starting at parameter `first`.
///
/// Returns the index of the next free parameter.
pub fn bind_key<K: Key>(stmt: &mut dyn Statement, first: usize, key: &K) -> DriverResult<usize> {
    let mut index = first;
    for value in key.to_values() {
        stmt.set(index, value)?;
        index += 1;
    }
    Ok(index)
}
