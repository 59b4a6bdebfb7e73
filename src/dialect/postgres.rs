use super::{Capabilities, SqlDialect, scheme_is};
use crate::core::DriverError;

/// `unique_violation`.
const UNIQUE_VIOLATION: i32 = 23505;

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgresql"
    }

    fn handles(&self, url: &str) -> bool {
        scheme_is(url, &["postgresql", "postgres"])
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FULL
    }

    fn is_duplicate_key(&self, err: &DriverError) -> bool {
        err.sql_state_int() == UNIQUE_VIOLATION
    }
}
