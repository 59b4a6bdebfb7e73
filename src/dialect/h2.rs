use super::{Capabilities, SqlDialect, scheme_is};
use crate::core::DriverError;

const DUPLICATE_KEY_STATES: [i32; 2] = [23505, 23001];

#[derive(Debug, Clone, Copy, Default)]
pub struct H2Dialect;

impl SqlDialect for H2Dialect {
    fn name(&self) -> &str {
        "h2"
    }

    fn handles(&self, url: &str) -> bool {
        scheme_is(url, &["h2"])
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FULL
    }

    fn is_duplicate_key(&self, err: &DriverError) -> bool {
        DUPLICATE_KEY_STATES.contains(&err.sql_state_int())
    }
}
