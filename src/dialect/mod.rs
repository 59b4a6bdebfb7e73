//! Database dialects.
//!
//! A dialect answers two questions for the access layer: how precisely the
//! driver reports batch outcomes, and which raw driver errors mean a
//! duplicate key. Everything else about a vendor stays out of this contract.

pub mod db2;
pub mod derby;
pub mod h2;
pub mod hana;
pub mod maxdb;
pub mod memory;
pub mod mysql;
pub mod oracle;
pub mod postgres;

use crate::core::{DriverError, DriverResult, OrmError, Result};
use crate::driver::Statement;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub use db2::Db2Dialect;
pub use derby::DerbyDialect;
pub use h2::H2Dialect;
pub use hana::HanaDialect;
pub use maxdb::MaxDbDialect;
pub use memory::MemoryDialect;
pub use mysql::MySqlDialect;
pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;

lazy_static::lazy_static! {
    static ref URL_SCHEME: Option<Regex> = Regex::new(r"^(?:jdbc:)?([A-Za-z][A-Za-z0-9]*):").ok();
}

/// Scheme of a connection URL, lowercased, ignoring a leading `jdbc:`.
///
/// `jdbc:postgresql://db/app` and `postgresql://db/app` both give
/// `postgresql`.
pub fn url_scheme(url: &str) -> Option<String> {
    let regex = URL_SCHEME.as_ref()?;
    regex
        .captures(url.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
}

pub(crate) fn scheme_is(url: &str, schemes: &[&str]) -> bool {
    url_scheme(url).is_some_and(|scheme| schemes.contains(&scheme.as_str()))
}

/// What a driver can tell about the outcome of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// The aggregate affected-row count of a batch is exact.
    pub total_count_known: bool,
    /// Every row of a batch reports its own exact affected-row count.
    pub individual_counts_known: bool,
}

impl Capabilities {
    pub const FULL: Capabilities = Capabilities {
        total_count_known: true,
        individual_counts_known: true,
    };

    pub const TOTAL_ONLY: Capabilities = Capabilities {
        total_count_known: true,
        individual_counts_known: false,
    };

    pub const NONE: Capabilities = Capabilities {
        total_count_known: false,
        individual_counts_known: false,
    };
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} individual={}",
            self.total_count_known, self.individual_counts_known
        )
    }
}

/// Sum of the positive per-row counts of a batch.
///
/// Fails when the driver reports no per-row counts at all.
pub fn sum_batch_counts(stmt: &mut dyn Statement) -> DriverResult<i64> {
    match stmt.execute_batch()? {
        Some(counts) => Ok(counts.into_iter().filter(|c| *c > 0).sum()),
        None => Err(DriverError::new("No rows affected")),
    }
}

pub trait SqlDialect: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Whether this dialect drives connections with the given URL.
    fn handles(&self, url: &str) -> bool;

    fn capabilities(&self) -> Capabilities;

    fn can_determine_total_batch_update_count(&self) -> bool {
        self.capabilities().total_count_known
    }

    fn can_determine_individual_batch_update_counts(&self) -> bool {
        self.capabilities().individual_counts_known
    }

    /// Submits the statement's pending batch and returns the aggregate
    /// number of affected rows.
    fn execute_batch(&self, stmt: &mut dyn Statement) -> DriverResult<i64> {
        sum_batch_counts(stmt)
    }

    /// Collapses a linked next error so codes can be matched on one error.
    fn flatten_error(&self, err: DriverError) -> DriverError {
        err.flatten()
    }

    fn is_duplicate_key(&self, _err: &DriverError) -> bool {
        false
    }

    /// Turns a raw driver failure of `operation` on `entity` into a
    /// semantic error.
    fn convert_error(&self, operation: &str, entity: &str, err: DriverError) -> OrmError {
        let err = self.flatten_error(err);
        if self.is_duplicate_key(&err) {
            OrmError::DuplicateKey {
                entity: entity.to_string(),
                source: err,
            }
        } else {
            OrmError::failure(operation, entity, err)
        }
    }
}

/// A dialect with its capability flags replaced.
///
/// Used when a driver is known to report batch outcomes differently from
/// what its vendor usually does.
#[derive(Debug, Clone)]
pub struct CapabilityOverride {
    inner: Arc<dyn SqlDialect>,
    capabilities: Capabilities,
}

impl CapabilityOverride {
    pub fn new(inner: Arc<dyn SqlDialect>, capabilities: Capabilities) -> Self {
        Self {
            inner,
            capabilities,
        }
    }
}

impl SqlDialect for CapabilityOverride {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn handles(&self, url: &str) -> bool {
        self.inner.handles(url)
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn execute_batch(&self, stmt: &mut dyn Statement) -> DriverResult<i64> {
        self.inner.execute_batch(stmt)
    }

    fn flatten_error(&self, err: DriverError) -> DriverError {
        self.inner.flatten_error(err)
    }

    fn is_duplicate_key(&self, err: &DriverError) -> bool {
        self.inner.is_duplicate_key(err)
    }

    fn convert_error(&self, operation: &str, entity: &str, err: DriverError) -> OrmError {
        self.inner.convert_error(operation, entity, err)
    }
}

/// An ordered list of dialects; the first one handling a URL wins.
#[derive(Debug, Clone)]
pub struct DialectSet {
    dialects: Vec<Arc<dyn SqlDialect>>,
}

impl DialectSet {
    pub fn empty() -> Self {
        Self {
            dialects: Vec::new(),
        }
    }

    /// All dialects shipped with the crate.
    pub fn builtin() -> Self {
        Self {
            dialects: vec![
                Arc::new(PostgresDialect),
                Arc::new(MySqlDialect),
                Arc::new(H2Dialect),
                Arc::new(DerbyDialect),
                Arc::new(Db2Dialect),
                Arc::new(OracleDialect),
                Arc::new(HanaDialect),
                Arc::new(MaxDbDialect),
                Arc::new(MemoryDialect),
            ],
        }
    }

    /// Adds a dialect ahead of all existing ones.
    pub fn register(&mut self, dialect: Arc<dyn SqlDialect>) {
        log::debug!("registered dialect {}", dialect.name());
        self.dialects.insert(0, dialect);
    }

    pub fn resolve(&self, url: &str) -> Result<Arc<dyn SqlDialect>> {
        self.dialects
            .iter()
            .find(|d| d.handles(url))
            .cloned()
            .ok_or_else(|| OrmError::UnknownDialect(url.to_string()))
    }

    pub fn by_name(&self, name: &str) -> Result<Arc<dyn SqlDialect>> {
        self.dialects
            .iter()
            .find(|d| d.name().eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| OrmError::UnknownDialect(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SqlDialect>> {
        self.dialects.iter()
    }

    pub fn len(&self) -> usize {
        self.dialects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dialects.is_empty()
    }
}

impl Default for DialectSet {
    fn default() -> Self {
        Self::builtin()
    }
}
