use super::{Capabilities, SqlDialect, scheme_is};
use crate::core::{DriverError, DriverResult};
use crate::driver::Statement;

/// `ORA-00001: unique constraint violated`.
const UNIQUE_CONSTRAINT_VIOLATED: i32 = 1;

/// Oracle reports `SUCCESS_NO_INFO` for every batched row but keeps an exact
/// aggregate update count on the statement.
#[derive(Debug, Clone, Copy, Default)]
pub struct OracleDialect;

impl SqlDialect for OracleDialect {
    fn name(&self) -> &str {
        "oracle"
    }

    fn handles(&self, url: &str) -> bool {
        scheme_is(url, &["oracle"])
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::TOTAL_ONLY
    }

    fn execute_batch(&self, stmt: &mut dyn Statement) -> DriverResult<i64> {
        stmt.execute_batch()?;
        stmt
            .update_count()
            .ok_or_else(|| DriverError::new("No rows affected"))
    }

    fn is_duplicate_key(&self, err: &DriverError) -> bool {
        err.chain().any(|e| e.vendor_code() == UNIQUE_CONSTRAINT_VIOLATED)
    }
}
