use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use chronicle_query::{CommandBuilder, Row, Statement};

use crate::{
    error::{ChronicleError, Result},
    event::{Envelope, Event, EventRegistry, StreamId, WriteEvent},
    handler::Selector,
    lifetime::ConnectionLifetime,
    options::{StoreOptions, StreamIdentity},
    session::Session,
};

mod append;
mod query;

pub use query::*;

/// Appends to and reads from the event table.
///
/// Cheap to clone; clones share the warm-up state, so the table existence
/// check runs until it first succeeds and never again.
#[derive(Clone)]
pub struct EventStore {
    options: Arc<StoreOptions>,
    warmed: Arc<AtomicBool>,
}

impl EventStore {
    pub fn new(options: Arc<StoreOptions>) -> Self {
        Self {
            options,
            warmed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn registry(&self) -> &EventRegistry {
        self.options.registry()
    }

    pub fn table(&self) -> String {
        self.options.events_table()
    }

    /// Serializes `event` into what [`EventStore::append`] stores.
    pub fn event<E: Event>(&self, event: &E) -> Result<WriteEvent> {
        self.registry().write_event(event)
    }

    pub fn is_warmed(&self) -> bool {
        self.warmed.load(Ordering::Acquire)
    }

    /// Whether the event table exists, checking the database until it does.
    pub async fn ensure_warmed<L: ConnectionLifetime>(
        &self,
        session: &mut Session<L>,
    ) -> Result<bool> {
        if self.is_warmed() {
            return Ok(true);
        }

        let command = session.compile(&TableExists(self.table()));
        let exists = session
            .load_one(&command, &|row: &Row| -> Result<bool> {
                Ok(row.get::<Option<String>>("table_name")?.is_some())
            })
            .await?
            .unwrap_or(false);

        if exists {
            self.warmed.store(true, Ordering::Release);
        } else {
            tracing::debug!(table = %self.table(), "event table missing, reads return nothing");
        }

        Ok(exists)
    }

    pub(crate) fn check_identity(&self, id: &StreamId) -> Result<()> {
        if id.identity() == self.options.stream_identity {
            return Ok(());
        }

        Err(ChronicleError::StreamIdentityMismatch(
            id.to_string(),
            self.options.stream_identity,
        ))
    }

    pub(crate) fn envelope_selector(&self) -> EnvelopeSelector<'_> {
        EnvelopeSelector {
            registry: self.registry(),
            identity: self.options.stream_identity,
        }
    }
}

struct TableExists(String);

impl Statement for TableExists {
    fn configure(&self, builder: &mut CommandBuilder) {
        builder
            .append("SELECT to_regclass(")
            .append_parameter(self.0.as_str())
            .append(")::text AS table_name");
    }
}

/// Column list every event read selects, in [`EnvelopeSelector`] order.
pub(crate) const EVENT_COLUMNS: &str =
    "seq_id, stream_id, version, type_name, qualified_type_name, timestamp, tenant_id, data";

pub(crate) struct EnvelopeSelector<'a> {
    registry: &'a EventRegistry,
    identity: StreamIdentity,
}

impl Selector<Envelope> for EnvelopeSelector<'_> {
    fn resolve(&self, row: &Row) -> Result<Envelope> {
        let event_type_name: String = row.get("type_name")?;
        let data: serde_json::Value = row.get("data")?;
        let stream_id = match self.identity {
            StreamIdentity::AsUuid => StreamId::Uuid(row.get("stream_id")?),
            StreamIdentity::AsString => StreamId::Key(row.get("stream_id")?),
        };
        let decoded = self.registry.decode(&event_type_name, &data)?;

        Ok(Envelope {
            sequence: row.get("seq_id")?,
            stream_id,
            version: row.get("version")?,
            timestamp: row.get("timestamp")?,
            tenant_id: row.get("tenant_id")?,
            event_type_name,
            qualified_type_name: row.get("qualified_type_name")?,
            data,
            decoded,
        })
    }
}
