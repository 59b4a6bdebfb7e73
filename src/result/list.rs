use super::{ResultSet, already_obtained};
use crate::core::Result;

/// A result whose entities are already in memory.
#[derive(Debug)]
pub struct ListResult<T> {
    items: Option<Vec<T>>,
}

impl<T> ListResult<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items: Some(items) }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Number of entities not yet consumed; zero once spent.
    pub fn len(&self) -> usize {
        self.items.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Send + 'static> ResultSet<T> for ListResult<T> {
    fn iter(&mut self) -> Result<Box<dyn Iterator<Item = Result<T>> + '_>> {
        let items = self.items.take().ok_or_else(already_obtained)?;
        Ok(Box::new(items.into_iter().map(Ok)))
    }

    fn to_list(&mut self) -> Result<Vec<T>> {
        self.items.take().ok_or_else(already_obtained)
    }

    fn close(&mut self) -> Result<()> {
        self.items = None;
        Ok(())
    }
}
