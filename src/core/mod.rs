pub mod error;
pub mod types;
pub mod value;

pub use error::{DriverError, DriverResult, ErrorKind, OrmError, Result};
pub use types::{Key, Row, column};
pub use value::{FromValue, Value};
