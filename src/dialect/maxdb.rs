use super::{Capabilities, SqlDialect, scheme_is};
use crate::core::{DriverError, DriverResult};
use crate::driver::Statement;

/// `Duplicate key`.
const DUPLICATE_KEY: i32 = -200;

/// MaxDB reports nothing usable for batches, so every mutation runs row by
/// row.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxDbDialect;

impl SqlDialect for MaxDbDialect {
    fn name(&self) -> &str {
        "maxdb"
    }

    fn handles(&self, url: &str) -> bool {
        scheme_is(url, &["sapdb", "maxdb"])
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    fn execute_batch(&self, _stmt: &mut dyn Statement) -> DriverResult<i64> {
        Err(
            DriverError::new("Batch update counts are not supported by MaxDB")
                .with_sql_state("0A000"),
        )
    }

    fn is_duplicate_key(&self, err: &DriverError) -> bool {
        err.chain().any(|e| e.vendor_code() == DUPLICATE_KEY)
    }
}
