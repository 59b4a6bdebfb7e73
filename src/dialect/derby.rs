use super::{Capabilities, SqlDialect, scheme_is};
use crate::core::DriverError;

const DUPLICATE_KEY: i32 = 23505;

#[derive(Debug, Clone, Copy, Default)]
pub struct DerbyDialect;

impl SqlDialect for DerbyDialect {
    fn name(&self) -> &str {
        "derby"
    }

    fn handles(&self, url: &str) -> bool {
        scheme_is(url, &["derby"])
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FULL
    }

    fn is_duplicate_key(&self, err: &DriverError) -> bool {
        err.sql_state_int() == DUPLICATE_KEY
    }
}
