use super::{Capabilities, SqlDialect, scheme_is};
use crate::core::DriverError;

const INTEGRITY_CONSTRAINT_VIOLATION: i32 = 23000;

/// `ER_DUP_ENTRY`.
const DUP_ENTRY: i32 = 1062;

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl SqlDialect for MySqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn handles(&self, url: &str) -> bool {
        scheme_is(url, &["mysql", "mariadb"])
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FULL
    }

    fn is_duplicate_key(&self, err: &DriverError) -> bool {
        err.chain().any(|e| {
            e.vendor_code() == DUP_ENTRY && e.sql_state_int() == INTEGRITY_CONSTRAINT_VIOLATION
        })
    }
}
