use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::QueryError;

/// A parameter or column value as it crosses the driver boundary.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
    TextArray(Vec<String>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Uuid(_) => "uuid",
            Value::Timestamp(_) => "timestamp",
            Value::Json(_) => "json",
            Value::TextArray(_) => "text[]",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Value::Uuid(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Timestamp(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::Json(value)
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Value::TextArray(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Conversion from a column [`Value`] into a Rust type.
pub trait FromValue: Sized {
    fn from_value(column: &str, value: &Value) -> Result<Self, QueryError>;
}

fn unexpected<T>(column: &str, expected: &'static str, value: &Value) -> Result<T, QueryError> {
    Err(QueryError::UnexpectedType {
        column: column.to_owned(),
        expected,
        found: value.type_name(),
    })
}

impl FromValue for bool {
    fn from_value(column: &str, value: &Value) -> Result<Self, QueryError> {
        match value {
            Value::Bool(v) => Ok(*v),
            other => unexpected(column, "bool", other),
        }
    }
}

impl FromValue for i64 {
    fn from_value(column: &str, value: &Value) -> Result<Self, QueryError> {
        match value {
            Value::Int(v) => Ok(*v),
            other => unexpected(column, "int", other),
        }
    }
}

impl FromValue for i32 {
    fn from_value(column: &str, value: &Value) -> Result<Self, QueryError> {
        let v = i64::from_value(column, value)?;

        i32::try_from(v).map_err(|_| {
            QueryError::Invalid {
                field: column.to_owned(),
                value: v.to_string(),
                reason: "out of range for i32",
            }
        })
    }
}

impl FromValue for f64 {
    fn from_value(column: &str, value: &Value) -> Result<Self, QueryError> {
        match value {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            other => unexpected(column, "float", other),
        }
    }
}

impl FromValue for String {
    fn from_value(column: &str, value: &Value) -> Result<Self, QueryError> {
        match value {
            Value::Text(v) => Ok(v.to_owned()),
            Value::Uuid(v) => Ok(v.to_string()),
            other => unexpected(column, "text", other),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(column: &str, value: &Value) -> Result<Self, QueryError> {
        match value {
            Value::Uuid(v) => Ok(*v),
            Value::Text(v) => v.parse().map_err(|_| {
                QueryError::Invalid {
                    field: column.to_owned(),
                    value: v.to_owned(),
                    reason: "invalid uuid",
                }
            }),
            other => unexpected(column, "uuid", other),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(column: &str, value: &Value) -> Result<Self, QueryError> {
        match value {
            Value::Timestamp(v) => Ok(*v),
            other => unexpected(column, "timestamp", other),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(column: &str, value: &Value) -> Result<Self, QueryError> {
        match value {
            Value::Json(v) => Ok(v.clone()),
            Value::Null => Ok(serde_json::Value::Null),
            other => unexpected(column, "json", other),
        }
    }
}

impl FromValue for Vec<String> {
    fn from_value(column: &str, value: &Value) -> Result<Self, QueryError> {
        match value {
            Value::TextArray(v) => Ok(v.clone()),
            other => unexpected(column, "text[]", other),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(column: &str, value: &Value) -> Result<Self, QueryError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(column, other).map(Some),
        }
    }
}
