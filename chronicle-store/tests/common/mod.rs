#![allow(dead_code)]

use std::{borrow::Cow, collections::VecDeque, fmt, io, sync::Arc};

use async_trait::async_trait;
use chronicle_store::{
    Command, ConnectionLifetime, Event, EventStore, Row, Session, StoreOptions,
};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::error::{DatabaseError, ErrorKind};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestStarted {
    pub name: String,
}

impl Event for QuestStarted {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembersJoined {
    pub day: i32,
    pub location: String,
    pub members: Vec<String>,
}

impl Event for MembersJoined {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembersDeparted {
    pub day: i32,
    pub location: String,
    pub members: Vec<String>,
}

impl Event for MembersDeparted {}

pub fn joined(day: i32, members: &[&str]) -> MembersJoined {
    MembersJoined {
        day,
        location: "Emond's Field".to_owned(),
        members: members.iter().map(|m| m.to_string()).collect(),
    }
}

pub fn departed(day: i32, members: &[&str]) -> MembersDeparted {
    MembersDeparted {
        day,
        location: "Baerlon".to_owned(),
        members: members.iter().map(|m| m.to_string()).collect(),
    }
}

/// What the scripted connection answers to the next command.
pub enum Reply {
    Rows(Vec<Row>),
    Affected(u64),
    Fail(sqlx::Error),
    Hang,
}

/// In memory [`ConnectionLifetime`] answering commands from a script and
/// recording everything it is asked to do.
#[derive(Default)]
pub struct ScriptedLifetime {
    replies: VecDeque<Reply>,
    apply_errors: VecDeque<sqlx::Error>,
    pub executed: Vec<Command>,
    pub applied: usize,
    pub connected: bool,
    pub in_transaction: bool,
    pub commits: usize,
    pub rollbacks: usize,
    pub disposed: bool,
    pub commit_error: Option<sqlx::Error>,
}

impl ScriptedLifetime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(mut self, rows: Vec<Row>) -> Self {
        self.replies.push_back(Reply::Rows(rows));
        self
    }

    pub fn affected(mut self, count: u64) -> Self {
        self.replies.push_back(Reply::Affected(count));
        self
    }

    pub fn fail(mut self, error: sqlx::Error) -> Self {
        self.replies.push_back(Reply::Fail(error));
        self
    }

    /// Fails the next attach of the connection, before any command runs.
    pub fn fail_apply(mut self, error: sqlx::Error) -> Self {
        self.apply_errors.push_back(error);
        self
    }

    pub fn hang(mut self) -> Self {
        self.replies.push_back(Reply::Hang);
        self
    }

    pub fn fail_commit(mut self, error: sqlx::Error) -> Self {
        self.commit_error = Some(error);
        self
    }

    pub fn texts(&self) -> Vec<&str> {
        self.executed.iter().map(|c| c.text.as_str()).collect()
    }

    fn next_reply(&mut self, command: &Command) -> Reply {
        self.executed.push(command.clone());
        self.replies.pop_front().unwrap_or(Reply::Rows(Vec::new()))
    }
}

#[async_trait]
impl ConnectionLifetime for ScriptedLifetime {
    async fn ensure_connected(&mut self) -> Result<(), sqlx::Error> {
        self.connected = true;
        Ok(())
    }

    async fn begin_transaction(&mut self) -> Result<(), sqlx::Error> {
        self.connected = true;
        self.in_transaction = true;
        Ok(())
    }

    async fn apply(&mut self, _command: &Command) -> Result<(), sqlx::Error> {
        self.applied += 1;

        if let Some(error) = self.apply_errors.pop_front() {
            return Err(error);
        }

        self.connected = true;
        Ok(())
    }

    async fn execute(&mut self, command: &Command) -> Result<u64, sqlx::Error> {
        match self.next_reply(command) {
            Reply::Rows(rows) => Ok(rows.len() as u64),
            Reply::Affected(count) => Ok(count),
            Reply::Fail(error) => Err(error),
            Reply::Hang => std::future::pending().await,
        }
    }

    async fn fetch(&mut self, command: &Command) -> Result<Vec<Row>, sqlx::Error> {
        match self.next_reply(command) {
            Reply::Rows(rows) => Ok(rows),
            Reply::Affected(_) => Ok(Vec::new()),
            Reply::Fail(error) => Err(error),
            Reply::Hang => std::future::pending().await,
        }
    }

    async fn commit(&mut self) -> Result<(), sqlx::Error> {
        if let Some(error) = self.commit_error.take() {
            return Err(error);
        }

        self.commits += 1;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), sqlx::Error> {
        self.rollbacks += 1;
        self.in_transaction = false;
        Ok(())
    }

    async fn dispose(&mut self) {
        self.disposed = true;
        self.connected = false;
        self.in_transaction = false;
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}

/// Database failure carrying only a SQLSTATE and optional constraint name.
#[derive(Debug)]
pub struct FakeDbError {
    pub code: &'static str,
    pub constraint: Option<&'static str>,
}

impl fmt::Display for FakeDbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fake database error {}", self.code)
    }
}

impl std::error::Error for FakeDbError {}

impl DatabaseError for FakeDbError {
    fn message(&self) -> &str {
        "fake database error"
    }

    fn code(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(self.code))
    }

    fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self
    }

    fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
        self
    }

    fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
        self
    }

    fn constraint(&self) -> Option<&str> {
        self.constraint
    }

    fn kind(&self) -> ErrorKind {
        match self.code {
            "23505" => ErrorKind::UniqueViolation,
            _ => ErrorKind::Other,
        }
    }
}

pub fn db_error(code: &'static str) -> sqlx::Error {
    sqlx::Error::Database(Box::new(FakeDbError {
        code,
        constraint: None,
    }))
}

pub fn constraint_error(code: &'static str, constraint: &'static str) -> sqlx::Error {
    sqlx::Error::Database(Box::new(FakeDbError {
        code,
        constraint: Some(constraint),
    }))
}

pub fn io_error(kind: io::ErrorKind) -> sqlx::Error {
    sqlx::Error::Io(io::Error::new(kind, "scripted io failure"))
}

pub fn options() -> StoreOptions {
    StoreOptions::builder()
        .register::<QuestStarted>()
        .register::<MembersJoined>()
        .register::<MembersDeparted>()
        .build()
}

pub fn event_store(options: StoreOptions) -> EventStore {
    EventStore::new(Arc::new(options))
}

pub fn session(lifetime: ScriptedLifetime, options: &StoreOptions) -> Session<ScriptedLifetime> {
    Session::from_options(lifetime, "red", options)
}

pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
}

/// Reply to the warm-up table check.
pub fn table_exists(table: &str) -> Vec<Row> {
    vec![Row::new().with("table_name", table)]
}

pub fn table_missing() -> Vec<Row> {
    vec![Row::new().with("table_name", Option::<String>::None)]
}

pub fn event_row(
    sequence: i64,
    stream_id: Uuid,
    version: i64,
    type_name: &str,
    data: serde_json::Value,
) -> Row {
    Row::new()
        .with("seq_id", sequence)
        .with("stream_id", stream_id)
        .with("version", version)
        .with("type_name", type_name)
        .with("qualified_type_name", Option::<String>::None)
        .with("timestamp", at(sequence))
        .with("tenant_id", "red")
        .with("data", data)
}
