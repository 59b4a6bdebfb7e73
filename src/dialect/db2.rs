use super::{Capabilities, SqlDialect, scheme_is};
use crate::core::DriverError;

const DUPLICATE_KEY_STATE: i32 = 23505;

/// `SQL0803N`.
const DUPLICATE_KEY_CODE: i32 = -803;

#[derive(Debug, Clone, Copy, Default)]
pub struct Db2Dialect;

impl SqlDialect for Db2Dialect {
    fn name(&self) -> &str {
        "db2"
    }

    fn handles(&self, url: &str) -> bool {
        scheme_is(url, &["db2"])
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FULL
    }

    /// The DB2 driver reports the real failure only as the next error and
    /// leaves the cause empty, so the next error replaces the outer one.
    fn flatten_error(&self, err: DriverError) -> DriverError {
        err.into_next_if_uncaused()
    }

    fn is_duplicate_key(&self, err: &DriverError) -> bool {
        err.sql_state_int() == DUPLICATE_KEY_STATE
            || err.chain().any(|e| e.vendor_code() == DUPLICATE_KEY_CODE)
    }
}
