use std::{fmt, str::FromStr};

use base64::{engine::general_purpose::URL_SAFE, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{builder::CommandBuilder, error::QueryError, value::Value};

const FIELD_SEPARATOR: char = '|';

/// Opaque position handed out with every page edge.
///
/// The serialized key fields joined by `|`, base64 (URL safe) encoded.
#[derive(Debug, PartialEq, Deserialize, Serialize, Clone)]
pub struct CursorType(pub String);

impl CursorType {
    pub fn encode<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = fields
            .into_iter()
            .map(|field| field.as_ref().to_owned())
            .collect::<Vec<_>>()
            .join(&FIELD_SEPARATOR.to_string());

        CursorType(URL_SAFE.encode(joined))
    }

    pub fn fields(&self) -> Result<CursorFields, QueryError> {
        let bytes = URL_SAFE.decode(&self.0)?;
        let joined = std::str::from_utf8(&bytes)?;

        Ok(CursorFields {
            fields: joined
                .split(FIELD_SEPARATOR)
                .map(str::to_owned)
                .collect::<Vec<_>>()
                .into_iter(),
        })
    }
}

impl From<String> for CursorType {
    fn from(val: String) -> Self {
        CursorType(val)
    }
}

impl fmt::Display for CursorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decoded cursor fields, read back in the order they were serialized.
#[derive(Debug)]
pub struct CursorFields {
    fields: std::vec::IntoIter<String>,
}

impl CursorFields {
    pub fn next<T: FromStr>(&mut self, name: &str) -> Result<T, QueryError> {
        let raw = self
            .fields
            .next()
            .ok_or_else(|| QueryError::MissingField(name.to_owned()))?;

        raw.parse().map_err(|_| QueryError::Invalid {
            field: name.to_owned(),
            value: raw,
            reason: "unparsable cursor field",
        })
    }

    /// Reads a timestamp written with [`utc_field`].
    pub fn next_utc(&mut self, name: &str) -> Result<DateTime<Utc>, QueryError> {
        let micros: i64 = self.next(name)?;

        DateTime::from_timestamp_micros(micros).ok_or_else(|| QueryError::Invalid {
            field: name.to_owned(),
            value: micros.to_string(),
            reason: "timestamp out of range",
        })
    }
}

/// Cursor field for a timestamp, microsecond precision.
pub fn utc_field(value: DateTime<Utc>) -> String {
    value.timestamp_micros().to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CursorOrder {
    #[default]
    Asc,
    Desc,
}

impl CursorOrder {
    /// Comparison operator and sort keyword for walking in this order.
    fn walk(&self, backward: bool) -> (&'static str, &'static str) {
        match (self, backward) {
            (CursorOrder::Asc, false) | (CursorOrder::Desc, true) => (">", "ASC"),
            (CursorOrder::Asc, true) | (CursorOrder::Desc, false) => ("<", "DESC"),
        }
    }
}

/// Keyset pagination over a row type.
///
/// `keys` are the ordering columns. `values` and `serialize` return that
/// row's values for the same columns, in the same order.
pub trait Cursor: Sized {
    fn keys() -> Vec<&'static str>;
    fn values(&self) -> Vec<Value>;
    fn serialize(&self) -> Vec<String>;
    fn deserialize(fields: &mut CursorFields) -> Result<Self, QueryError>;

    fn to_cursor(&self) -> CursorType {
        CursorType::encode(self.serialize())
    }

    fn from_cursor(cursor: &CursorType) -> Result<Self, QueryError> {
        Self::deserialize(&mut cursor.fields()?)
    }

    fn order_clause(order: &CursorOrder, backward: bool) -> String {
        let (_, keyword) = order.walk(backward);

        Self::keys()
            .iter()
            .map(|key| format!("{key} {keyword}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Writes the predicate selecting rows strictly after this one and binds
    /// its key values.
    ///
    /// A single key compares directly; several keys compare as a row
    /// constructor, which matches the lexicographic order of `order_clause`.
    fn push_filter(&self, builder: &mut CommandBuilder, order: &CursorOrder, backward: bool) {
        let (operator, _) = order.walk(backward);
        let keys = Self::keys();
        let placeholders = self
            .values()
            .into_iter()
            .map(|value| builder.add_parameter(value))
            .collect::<Vec<_>>();

        if keys.len() == 1 {
            builder.append(format!("{} {operator} {}", keys[0], placeholders.join(", ")));
        } else {
            builder.append(format!(
                "({}) {operator} ({})",
                keys.join(", "),
                placeholders.join(", ")
            ));
        }
    }
}
