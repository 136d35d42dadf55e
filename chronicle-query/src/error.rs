/// Errors raised while compiling commands, decoding rows or cursors.
///
/// # Example
///
/// ```rust
/// use chronicle_query::{QueryError, Row, Value};
///
/// let row = Row::new().with("version", Value::Text("one".to_owned()));
///
/// match row.get::<i64>("version") {
///     Err(QueryError::UnexpectedType { column, expected, found }) => {
///         assert_eq!(column, "version");
///         assert_eq!(expected, "int");
///         assert_eq!(found, "text");
///     }
///     other => panic!("unexpected {other:?}"),
/// }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum QueryError {
    /// A column or cursor field was not present.
    #[error("missing field `{0}`")]
    MissingField(String),

    /// A value could not be converted to the requested Rust type.
    #[error("column `{column}`: expected {expected}, found {found}")]
    UnexpectedType {
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A field held a value that does not parse as the expected type.
    #[error("field `{field}`: {reason} ({value})")]
    Invalid {
        field: String,
        value: String,
        reason: &'static str,
    },

    #[error("cursor base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("cursor utf8: {0}")]
    StrUtf8(#[from] std::str::Utf8Error),
}
