use std::collections::VecDeque;

use chronicle_query::{Row, Statement};

use crate::error::Result;

/// Rows of one result set, consumed in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    rows: VecDeque<Row>,
}

impl Rows {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows: rows.into() }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn peek(&self) -> Option<&Row> {
        self.rows.front()
    }
}

impl Iterator for Rows {
    type Item = Row;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.pop_front()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.rows.len(), Some(self.rows.len()))
    }
}

impl ExactSizeIterator for Rows {}

impl From<Vec<Row>> for Rows {
    fn from(value: Vec<Row>) -> Self {
        Rows::new(value)
    }
}

/// Maps one row to a value.
pub trait Selector<T>: Send + Sync {
    fn resolve(&self, row: &Row) -> Result<T>;
}

impl<T, F> Selector<T> for F
where
    F: Fn(&Row) -> Result<T> + Send + Sync,
{
    fn resolve(&self, row: &Row) -> Result<T> {
        self(row)
    }
}

/// A statement that also knows how to turn its own result set into a value.
pub trait QueryHandler: Statement + Send + Sync {
    type Output: Send;

    fn handle(&self, rows: Rows) -> Result<Self::Output>;
}
