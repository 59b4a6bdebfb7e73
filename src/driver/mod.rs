//! Prepared-statement driver contract.
//!
//! The access layer talks to a database only through these three traits.
//! Parameter indexes are 1-based, as in most SQL drivers.

pub mod memory;

use crate::core::{DriverResult, Row, Value};
use log::warn;
use std::ops::{Deref, DerefMut};

/// Per-row batch code: the row was executed but its affected count is unknown.
pub const SUCCESS_NO_INFO: i64 = -2;

/// Per-row batch code: the row failed to execute.
pub const EXECUTE_FAILED: i64 = -3;

pub trait DriverConnection: Send + Sync {
    /// Connection URL, used to pick a dialect.
    fn url(&self) -> &str;

    fn prepare(&self, sql: &str) -> DriverResult<Box<dyn Statement>>;
}

pub trait Statement: Send {
    fn sql(&self) -> &str;

    fn set(&mut self, index: usize, value: Value) -> DriverResult<()>;

    fn clear_parameters(&mut self);

    /// Copies the current parameter set into the pending batch.
    fn add_batch(&mut self) -> DriverResult<()>;

    fn clear_batch(&mut self);

    fn execute_update(&mut self) -> DriverResult<i64>;

    /// Submits the pending batch.
    ///
    /// Returns one code per parameter set: an affected-row count,
    /// [`SUCCESS_NO_INFO`] or [`EXECUTE_FAILED`]. `None` means the driver
    /// reported nothing at all. The batch stays bound afterwards, so calling
    /// this again resubmits the same parameter sets.
    fn execute_batch(&mut self) -> DriverResult<Option<Vec<i64>>>;

    /// Aggregate affected-row count of the last execution, if known.
    fn update_count(&self) -> Option<i64>;

    fn execute_query(&mut self) -> DriverResult<Box<dyn Cursor>>;

    fn close(&mut self) -> DriverResult<()>;
}

pub trait Cursor: Send {
    fn next_row(&mut self) -> DriverResult<Option<Row>>;

    fn close(&mut self) -> DriverResult<()>;
}

/// Something that holds a driver resource.
pub trait Release {
    fn release(&mut self) -> DriverResult<()>;
}

impl Release for Box<dyn Statement> {
    fn release(&mut self) -> DriverResult<()> {
        self.close()
    }
}

impl Release for Box<dyn Cursor> {
    fn release(&mut self) -> DriverResult<()> {
        self.close()
    }
}

/// Owns a driver resource and releases it exactly once.
///
/// `close` releases explicitly and reports the driver's answer; dropping an
/// unreleased guard releases it and only logs a failure.
pub struct Scoped<T: Release> {
    inner: T,
    released: bool,
}

impl<T: Release> Scoped<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            released: false,
        }
    }

    pub fn close(mut self) -> DriverResult<()> {
        self.released = true;
        self.inner.release()
    }
}

impl<T: Release> Deref for Scoped<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: Release> DerefMut for Scoped<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: Release> Drop for Scoped<T> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = self.inner.release() {
            warn!("failed to release driver resource: {}", err);
        }
    }
}
