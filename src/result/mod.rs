//! Query results.
//!
//! Every result is single use: it can be iterated or collected once, after
//! which it is spent.

mod list;
mod streaming;

pub use list::ListResult;
pub use streaming::StreamingResult;

use crate::core::{OrmError, Result};

pub trait ResultSet<T>: Send {
    /// Iterates the remaining entities.
    ///
    /// A second call fails with [`OrmError::InvalidState`].
    fn iter(&mut self) -> Result<Box<dyn Iterator<Item = Result<T>> + '_>>;

    /// Collects all entities; spends the result like [`ResultSet::iter`].
    fn to_list(&mut self) -> Result<Vec<T>> {
        self.iter()?.collect()
    }

    /// Releases whatever the result still holds. Closing twice is a no-op.
    fn close(&mut self) -> Result<()>;
}

pub(crate) fn already_obtained() -> OrmError {
    OrmError::InvalidState("Results already obtained".to_string())
}
