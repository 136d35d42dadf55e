use std::fmt;

use chronicle_query::{Batch, Command};

use crate::options::StreamIdentity;

/// The command or batch that was running when a failure happened.
#[derive(Debug, Clone, PartialEq)]
pub enum FailedStatement {
    Command(Command),
    Batch(Batch),
}

impl FailedStatement {
    pub fn text(&self) -> String {
        match self {
            FailedStatement::Command(command) => command.text.to_owned(),
            FailedStatement::Batch(batch) => batch.text(),
        }
    }
}

impl fmt::Display for FailedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    /// The database aborted the transaction with a serialization failure.
    Serialization,
    /// Another writer already stored an event at the same stream version.
    StreamVersion,
    /// The caller's expected stream version did not match the stored one.
    UnexpectedVersion {
        stream: String,
        expected: i64,
        actual: i64,
    },
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::Serialization => f.write_str("concurrent update detected"),
            ConflictReason::StreamVersion => {
                f.write_str("unexpected maximum event version for stream")
            }
            ConflictReason::UnexpectedVersion {
                stream,
                expected,
                actual,
            } => write!(
                f,
                "stream `{stream}` expected at version {expected} but is at {actual}"
            ),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChronicleError {
    #[error("write conflict: {reason}")]
    WriteConflict {
        reason: ConflictReason,
        statement: Option<FailedStatement>,
        #[source]
        source: Option<sqlx::Error>,
    },

    #[error("command failed for tenant `{tenant_id}`: {source}\n{command}")]
    CommandExecution {
        command: String,
        tenant_id: String,
        statement: Option<FailedStatement>,
        #[source]
        source: sqlx::Error,
    },

    #[error("command not supported by this database: {source}")]
    CommandNotSupported {
        statement: Option<FailedStatement>,
        #[source]
        source: sqlx::Error,
    },

    #[error("sqlx `{source}`")]
    Driver {
        statement: Option<FailedStatement>,
        #[source]
        source: sqlx::Error,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("session is closed")]
    SessionClosed,

    #[error("stream id `{0}` does not match the {1:?} stream identity")]
    StreamIdentityMismatch(String, StreamIdentity),

    #[error("unexpected empty events when appending to stream `{0}`")]
    EmptyAppend(String),

    #[error("serde_json `{0}`")]
    SerdeJson(#[from] serde_json::Error),

    #[error("chronicle_query `{0}`")]
    Query(#[from] chronicle_query::QueryError),

    #[error("io `{0}`")]
    Io(#[from] std::io::Error),
}

impl ChronicleError {
    pub fn is_write_conflict(&self) -> bool {
        matches!(self, ChronicleError::WriteConflict { .. })
    }

    /// The statement that failed, when the error came from execution.
    pub fn statement(&self) -> Option<&FailedStatement> {
        match self {
            ChronicleError::WriteConflict { statement, .. }
            | ChronicleError::CommandExecution { statement, .. }
            | ChronicleError::CommandNotSupported { statement, .. }
            | ChronicleError::Driver { statement, .. } => statement.as_ref(),
            _ => None,
        }
    }

    /// The driver failure this error was built from, if any.
    pub fn driver_error(&self) -> Option<&sqlx::Error> {
        match self {
            ChronicleError::WriteConflict { source, .. } => source.as_ref(),
            ChronicleError::CommandExecution { source, .. }
            | ChronicleError::CommandNotSupported { source, .. }
            | ChronicleError::Driver { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ChronicleError>;
