use chronicle_query::{Batch, Command};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::{
    error::{ChronicleError, FailedStatement},
    event::StreamHandle,
};

/// Borrowed view of the statement a session is running.
#[derive(Debug, Clone, Copy)]
pub enum StatementRef<'a> {
    Command(&'a Command),
    Batch(&'a Batch),
}

impl StatementRef<'_> {
    pub fn text(&self) -> String {
        match self {
            StatementRef::Command(command) => command.text.to_owned(),
            StatementRef::Batch(batch) => batch.text(),
        }
    }

    pub fn to_failed(self) -> FailedStatement {
        match self {
            StatementRef::Command(command) => FailedStatement::Command(command.clone()),
            StatementRef::Batch(batch) => FailedStatement::Batch(batch.clone()),
        }
    }
}

impl<'a> From<&'a Command> for StatementRef<'a> {
    fn from(value: &'a Command) -> Self {
        StatementRef::Command(value)
    }
}

impl<'a> From<&'a Batch> for StatementRef<'a> {
    fn from(value: &'a Batch) -> Self {
        StatementRef::Batch(value)
    }
}

/// Streams touched by one unit of work.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub tenant_id: String,
    pub streams: Vec<StreamHandle>,
}

impl ChangeSet {
    pub fn event_count(&self) -> usize {
        self.streams.iter().map(|s| s.events.len()).sum()
    }
}

/// Observes a session's executions. Every hook defaults to doing nothing.
///
/// `on_before_execute` runs once per call, before the first attempt. Exactly
/// one of `log_success` or `log_failure` follows, including for calls that
/// were cancelled, which fail with [`ChronicleError::Cancelled`].
pub trait SessionLogger: Send + Sync {
    fn on_before_execute(&self, _statement: StatementRef<'_>) {}

    fn log_success(&self, _statement: StatementRef<'_>) {}

    fn log_failure(&self, _statement: StatementRef<'_>, _error: &ChronicleError) {}

    fn record_saved_changes(&self, _session_id: Uuid, _changes: &ChangeSet) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl SessionLogger for NullLogger {}

/// Writes every hook as a `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl SessionLogger for TracingLogger {
    fn on_before_execute(&self, statement: StatementRef<'_>) {
        tracing::trace!(sql = %statement.text(), "executing");
    }

    fn log_success(&self, statement: StatementRef<'_>) {
        tracing::debug!(sql = %statement.text(), "executed");
    }

    fn log_failure(&self, statement: StatementRef<'_>, error: &ChronicleError) {
        tracing::error!(sql = %statement.text(), error = %error, "execution failed");
    }

    fn record_saved_changes(&self, session_id: Uuid, changes: &ChangeSet) {
        tracing::info!(
            session = %session_id,
            tenant = %changes.tenant_id,
            streams = changes.streams.len(),
            events = changes.event_count(),
            "saved changes"
        );
    }
}

/// Keeps the text of every command that went through the hooks, mostly for
/// tests and diagnostics.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    before: Mutex<Vec<String>>,
    commands: Mutex<Vec<String>>,
    failures: Mutex<Vec<(String, String)>>,
    changes: Mutex<Vec<ChangeSet>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statements announced by `on_before_execute`.
    pub fn before_execute(&self) -> Vec<String> {
        self.before.lock().clone()
    }

    /// Statements that succeeded.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn last_command(&self) -> Option<String> {
        self.commands.lock().last().cloned()
    }

    /// Failed statements with the error they failed with.
    pub fn failures(&self) -> Vec<(String, String)> {
        self.failures.lock().clone()
    }

    pub fn changes(&self) -> Vec<ChangeSet> {
        self.changes.lock().clone()
    }

    pub fn clear(&self) {
        self.before.lock().clear();
        self.commands.lock().clear();
        self.failures.lock().clear();
        self.changes.lock().clear();
    }
}

impl SessionLogger for RecordingLogger {
    fn on_before_execute(&self, statement: StatementRef<'_>) {
        self.before.lock().push(statement.text());
    }

    fn log_success(&self, statement: StatementRef<'_>) {
        self.commands.lock().push(statement.text());
    }

    fn log_failure(&self, statement: StatementRef<'_>, error: &ChronicleError) {
        self.failures
            .lock()
            .push((statement.text(), error.to_string()));
    }

    fn record_saved_changes(&self, _session_id: Uuid, changes: &ChangeSet) {
        self.changes.lock().push(changes.clone());
    }
}
