// ============================================================================
// RustMemORM Library
// ============================================================================

//! Batch mutation engine for prepared-statement SQL drivers.
//!
//! An [`Access`] executes inserts, updates, deletes and upserts of one entity
//! type, choosing batched or row-by-row execution from what the active
//! [`SqlDialect`] says the driver can report. Wrong affected-row counts
//! surface as concurrency violations and are retried with a linear backoff.
//!
//! # Examples
//!
//! ```
//! use rustmemorm::{Database, MemoryDatabase, OrmConfig};
//! use std::sync::Arc;
//!
//! # fn main() -> rustmemorm::Result<()> {
//! let driver = MemoryDatabase::new();
//! let config = OrmConfig::new("rustmemorm:memory").max_retries(3);
//! let db = Database::open(Arc::new(driver), config)?;
//!
//! assert_eq!(db.dialect().name(), "memory");
//! assert!(db.capabilities().individual_counts_known);
//! # Ok(())
//! # }
//! ```

pub mod access;
pub mod connection;
pub mod core;
pub mod dialect;
pub mod driver;
pub mod result;

// Re-export main types for convenience
pub use access::{Access, Interrupter, Relation, RetryPolicy, Sleeper, ThreadSleeper};
pub use core::{DriverError, ErrorKind, Key, OrmError, Result, Row, Value};
pub use result::{ListResult, ResultSet, StreamingResult};

pub use connection::{Database, config::OrmConfig};
pub use dialect::{Capabilities, CapabilityOverride, DialectSet, SqlDialect};
pub use driver::{DriverConnection, Statement, memory::MemoryDatabase};
