use super::{Capabilities, SqlDialect, scheme_is};
use crate::core::DriverError;
use crate::driver::memory::UNIQUE_VIOLATION_STATE;

/// Dialect of the in-memory reference driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryDialect;

impl SqlDialect for MemoryDialect {
    fn name(&self) -> &str {
        "memory"
    }

    fn handles(&self, url: &str) -> bool {
        scheme_is(url, &["rustmemorm", "memory"])
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FULL
    }

    fn is_duplicate_key(&self, err: &DriverError) -> bool {
        err.sql_state() == Some(UNIQUE_VIOLATION_STATE)
    }
}
