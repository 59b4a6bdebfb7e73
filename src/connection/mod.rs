pub mod config;

use crate::access::{Access, Relation, Sleeper, ThreadSleeper};
use crate::core::Result;
use crate::dialect::{Capabilities, CapabilityOverride, DialectSet, SqlDialect};
use crate::driver::DriverConnection;
use config::OrmConfig;
use std::sync::Arc;

/// A driver connection paired with the dialect that speaks for it
///
/// The dialect and retry policy are resolved once, when the database is
/// opened, and shared by every [`Access`] it hands out.
#[derive(Clone)]
pub struct Database {
    connection: Arc<dyn DriverConnection>,
    dialect: Arc<dyn SqlDialect>,
    config: OrmConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl Database {
    /// Open with the built-in dialects
    pub fn open(connection: Arc<dyn DriverConnection>, config: OrmConfig) -> Result<Self> {
        Self::with_dialects(connection, config, &DialectSet::builtin())
    }

    /// Open, resolving the dialect from `dialects`
    ///
    /// An explicit dialect name in `config` wins over the URL.
    pub fn with_dialects(
        connection: Arc<dyn DriverConnection>,
        config: OrmConfig,
        dialects: &DialectSet,
    ) -> Result<Self> {
        config.validate()?;
        let dialect = match &config.dialect {
            Some(name) => dialects.by_name(name)?,
            None => dialects.resolve(&config.url)?,
        };
        Ok(Self::with_dialect(connection, config, dialect))
    }

    /// Open with a dialect chosen by the caller
    pub fn with_dialect(
        connection: Arc<dyn DriverConnection>,
        config: OrmConfig,
        dialect: Arc<dyn SqlDialect>,
    ) -> Self {
        let dialect: Arc<dyn SqlDialect> = match config.capabilities {
            Some(capabilities) => Arc::new(CapabilityOverride::new(dialect, capabilities)),
            None => dialect,
        };
        log::debug!(
            "opened {} with dialect {} ({})",
            config.url,
            dialect.name(),
            dialect.capabilities()
        );
        Self {
            connection,
            dialect,
            config,
            sleeper: Arc::new(ThreadSleeper::new()),
        }
    }

    /// Replace how retries pause
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn dialect(&self) -> &Arc<dyn SqlDialect> {
        &self.dialect
    }

    pub fn capabilities(&self) -> Capabilities {
        self.dialect.capabilities()
    }

    pub fn config(&self) -> &OrmConfig {
        &self.config
    }

    pub fn connection(&self) -> &Arc<dyn DriverConnection> {
        &self.connection
    }

    /// Build the engine for one relation
    pub fn access<R: Relation>(&self, relation: R) -> Access<R> {
        Access::new(
            relation,
            Arc::clone(&self.connection),
            Arc::clone(&self.dialect),
        )
        .with_retry(self.config.retry_policy())
        .with_sleeper(Arc::clone(&self.sleeper))
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("url", &self.connection.url())
            .field("dialect", &self.dialect)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
