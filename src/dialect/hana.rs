use super::{Capabilities, SqlDialect, scheme_is};
use crate::core::DriverError;

const UNIQUE_CONSTRAINT_VIOLATION: i32 = 23000;

/// Vendor codes HANA uses for a duplicate key.
const DUPLICATE_KEY_CODES: [i32; 2] = [144, 301];

#[derive(Debug, Clone, Copy, Default)]
pub struct HanaDialect;

impl SqlDialect for HanaDialect {
    fn name(&self) -> &str {
        "hana"
    }

    fn handles(&self, url: &str) -> bool {
        scheme_is(url, &["sap", "hana"])
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FULL
    }

    fn is_duplicate_key(&self, err: &DriverError) -> bool {
        err.chain().any(|e| {
            DUPLICATE_KEY_CODES.contains(&e.vendor_code())
                && e.sql_state_int() == UNIQUE_CONSTRAINT_VIOLATION
        })
    }
}
