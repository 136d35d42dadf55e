use crate::{
    error::QueryError,
    value::{FromValue, Value},
};

/// One decoded result row, columns in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.push(column.into());
        self.values.push(value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    pub fn value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|index| self.values.get(index))
    }

    pub fn value_at(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get<T: FromValue>(&self, column: &str) -> Result<T, QueryError> {
        let value = self
            .value(column)
            .ok_or_else(|| QueryError::MissingField(column.to_owned()))?;

        T::from_value(column, value)
    }

    pub fn get_at<T: FromValue>(&self, index: usize) -> Result<T, QueryError> {
        let column = self
            .columns
            .get(index)
            .ok_or_else(|| QueryError::MissingField(format!("#{index}")))?;

        T::from_value(column, &self.values[index])
    }
}
